//! `ledgersync --target-date` and `ledgersync validate`.

use std::path::{Path, PathBuf};

use ledgersync_io::{load_config, reconcile_month, RunOptions};
use ledgersync_recon::{AccountOutcome, AccountStatus, ReconError, RunReport, TargetMonth};
use serde::Serialize;

use crate::exit_codes::{exit_code_for, EXIT_ACCOUNTS_FAILED, EXIT_ERROR};
use crate::util::{pad_left, pad_right};
use crate::CliError;

pub struct RunArgs {
    pub config: PathBuf,
    pub month: TargetMonth,
    pub output_folder: Option<PathBuf>,
    pub json: bool,
    pub dry_run: bool,
}

/// `--json` document: the run report plus where it was written.
#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    report: &'a RunReport,
    output: Option<String>,
    dry_run: bool,
}

fn recon_err(err: ReconError) -> CliError {
    let hint = match &err {
        ReconError::OutputLocked { .. } => Some("close the file in Excel (or whatever holds it) and rerun".to_string()),
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => {
            Some("check the file with `ledgersync validate <config>`".to_string())
        }
        ReconError::LedgerUnreadable(_) => Some("the `ledger` path in the config must point to an .xlsx workbook".to_string()),
        ReconError::Io(_) => Some("check that the output folder exists or can be created and is writable".to_string()),
        _ => None,
    };
    CliError { code: exit_code_for(&err), message: err.to_string(), hint }
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let options = RunOptions {
        config_path: args.config,
        month: args.month,
        output_dir: args.output_folder,
        dry_run: args.dry_run,
        now: chrono::Local::now().naive_local(),
    };
    let outcome = reconcile_month(&options).map_err(recon_err)?;
    let report = &outcome.report;

    if args.json {
        let doc = JsonReport {
            report,
            output: outcome.output.as_ref().map(|p| p.display().to_string()),
            dry_run: args.dry_run,
        };
        let json_str = serde_json::to_string_pretty(&doc).map_err(|e| CliError {
            code: EXIT_ERROR,
            message: format!("JSON serialization error: {e}"),
            hint: None,
        })?;
        println!("{json_str}");
    }

    // Human summary to stderr
    eprint!("{}", render_summary(report));
    match &outcome.output {
        Some(path) => eprintln!("wrote {}", path.display()),
        None => eprintln!("dry run: no workbook written"),
    }

    let failed = report.failed_accounts();
    if !failed.is_empty() {
        return Err(CliError {
            code: EXIT_ACCOUNTS_FAILED,
            message: format!("{} account(s) failed: {}", failed.len(), failed.join(", ")),
            hint: outcome
                .output
                .as_ref()
                .map(|p| format!("rows for the other accounts were saved to {}", p.display())),
        });
    }
    Ok(())
}

pub fn cmd_validate(config: &Path) -> Result<(), CliError> {
    let config = load_config(config).map_err(recon_err)?;
    eprintln!(
        "valid: '{}' with {} account(s), {} rule(s)",
        if config.name.is_empty() { "unnamed" } else { config.name.as_str() },
        config.accounts.len(),
        config.rules.len(),
    );
    for account in &config.accounts {
        eprintln!(
            "  {} ({}): {} <- {}",
            account.sheet,
            account.code(),
            account.layout.brand(),
            account.source
        );
    }
    Ok(())
}

// ============================================================================
// Summary table
// ============================================================================

const COLUMNS: &[(&str, usize)] = &[
    ("SHEET", 14),
    ("CODE", 10),
    ("PARSED", 6),
    ("NEW", 5),
    ("DUP", 5),
    ("STALE", 5),
    ("SKIP", 5),
    ("REVIEW", 6),
];

pub(crate) fn render_summary(report: &RunReport) -> String {
    let mut out = String::new();
    let title = if report.name.is_empty() { String::new() } else { format!(" '{}'", report.name) };
    out.push_str(&format!("reconciled {}{}\n", report.month, title));

    let header: Vec<String> = COLUMNS
        .iter()
        .enumerate()
        .map(|(i, (name, width))| if i < 2 { pad_right(name, *width) } else { pad_left(name, *width) })
        .collect();
    out.push_str(&format!("  {}  LAST DATE\n", header.join("  ")));

    for account in &report.accounts {
        out.push_str(&format!("  {}\n", summary_row(account)));
    }

    for account in &report.accounts {
        if let Some(merge) = account.merge() {
            for warning in &merge.warnings {
                out.push_str(&format!("warning: {}: {}\n", account.sheet, warning));
            }
            for skipped in &merge.skipped {
                out.push_str(&format!(
                    "skipped: {} row {}: {}\n",
                    account.sheet, skipped.row, skipped.reason
                ));
            }
        }
    }
    out
}

fn summary_row(account: &AccountOutcome) -> String {
    let mut cells = vec![
        pad_right(&account.sheet, COLUMNS[0].1),
        pad_right(&account.code, COLUMNS[1].1),
    ];
    match &account.status {
        AccountStatus::Succeeded(m) => {
            let counts = [
                m.parsed,
                m.accepted,
                m.rejected_duplicate,
                m.rejected_stale,
                m.skipped.len(),
                m.flagged_for_review,
            ];
            for (value, (_, width)) in counts.iter().zip(&COLUMNS[2..]) {
                cells.push(pad_left(&value.to_string(), *width));
            }
            let last = m.last_date_after.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
            format!("{}  {}", cells.join("  "), last)
        }
        AccountStatus::Failed { error } => format!("{}  FAILED: {}", cells.join("  "), error),
    }
}
