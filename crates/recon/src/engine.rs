use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::canon::classify;
use crate::config::{AccountConfig, ReconConfig};
use crate::error::ReconError;
use crate::ledger::{append, read_state, LedgerDocument};
use crate::model::{AccountOutcome, AccountStatus, Decision, MergeResult, RunReport, TransactionRecord};
use crate::parser::SourceGrid;
use crate::rules::RuleSet;
use crate::window::TargetMonth;

/// Where statement grids come from.
pub trait StatementSource {
    /// Resolve the statement file for an account.
    fn locate(&self, account: &AccountConfig) -> Result<PathBuf, ReconError>;

    fn load(&self, path: &Path) -> Result<SourceGrid, ReconError>;
}

/// Reconcile every configured account for `month` into `ledger`.
///
/// Account failures are recorded in the report and never stop the run. The
/// caller decides whether to save the mutated ledger.
pub fn run(
    config: &ReconConfig,
    month: TargetMonth,
    ledger: &mut dyn LedgerDocument,
    sources: &dyn StatementSource,
) -> Result<RunReport, ReconError> {
    let rules = RuleSet::compile(&config.rules)?;
    let mut grids: HashMap<PathBuf, Result<SourceGrid, ReconError>> = HashMap::new();
    let mut accounts = Vec::with_capacity(config.accounts.len());

    for account in &config.accounts {
        let mut source = None;
        let status = match reconcile_account(
            config, &rules, month, account, ledger, sources, &mut grids, &mut source,
        ) {
            Ok(merge) => AccountStatus::Succeeded(merge),
            Err(e) => {
                log::error!("{}: {e}", account.sheet);
                AccountStatus::Failed { error: e.to_string() }
            }
        };
        accounts.push(AccountOutcome {
            sheet: account.sheet.clone(),
            code: account.code().to_string(),
            unit: account.unit.clone(),
            source: source.map(|p: PathBuf| p.display().to_string()),
            status,
        });
    }

    Ok(RunReport { name: config.name.clone(), month: month.to_string(), accounts })
}

#[allow(clippy::too_many_arguments)]
fn reconcile_account(
    config: &ReconConfig,
    rules: &RuleSet,
    month: TargetMonth,
    account: &AccountConfig,
    ledger: &mut dyn LedgerDocument,
    sources: &dyn StatementSource,
    grids: &mut HashMap<PathBuf, Result<SourceGrid, ReconError>>,
    source: &mut Option<PathBuf>,
) -> Result<MergeResult, ReconError> {
    let Some(sheet) = ledger.sheet_mut(&account.sheet) else {
        log::warn!("{}: ledger sheets are [{}]", account.sheet, ledger.sheet_names().join(", "));
        return Err(ReconError::SheetNotFound(account.sheet.clone()));
    };
    let columns = account.sheet_columns();
    let state = read_state(sheet, &columns);

    let path = sources.locate(account)?;
    *source = Some(path.clone());
    let grid = grids
        .entry(path.clone())
        .or_insert_with(|| {
            log::info!("loading statement {}", path.display());
            sources.load(&path)
        })
        .as_ref()
        .map_err(Clone::clone)?;

    let mut window = month.window();
    if config.forward_only {
        window = window.starting_no_earlier_than(state.last_date);
    }
    let parsed = account.layout.parse(grid, &account.sheet, window)?;

    let mut merge = MergeResult {
        parsed: parsed.records.len(),
        skipped: parsed.skipped,
        outside_window: parsed.outside_window,
        warnings: parsed.warnings,
        last_date_before: state.last_date,
        last_date_after: state.last_date,
        ..MergeResult::default()
    };

    let mut accepted: Vec<TransactionRecord> = Vec::new();
    for record in parsed.records {
        match classify(&record, &state) {
            Decision::AcceptNew => accepted.push(record),
            Decision::RejectStale => {
                log::info!(
                    "{}: stale {} '{}' (ledger runs to {})",
                    account.sheet,
                    record.date,
                    record.description,
                    state.last_date.map(|d| d.to_string()).unwrap_or_default()
                );
                merge.rejected_stale += 1;
            }
            Decision::RejectDuplicate => {
                log::info!(
                    "{}: duplicate {} '{}' already in ledger",
                    account.sheet,
                    record.date,
                    record.description
                );
                merge.rejected_duplicate += 1;
            }
        }
    }

    merge.accepted = accepted.len();
    merge.last_date_after = accepted.iter().map(|r| r.date).chain(state.last_date).max();

    let outcome = append(sheet, &accepted, &columns, rules, &config.review_marker)?;
    merge.appended_rows = outcome.rows;
    merge.flagged_for_review = outcome.flagged;

    log::info!(
        "{}: {} parsed, {} accepted, {} duplicate, {} stale, {} skipped",
        account.sheet,
        merge.parsed,
        merge.accepted,
        merge.rejected_duplicate,
        merge.rejected_stale,
        merge.skipped.len()
    );
    Ok(merge)
}
