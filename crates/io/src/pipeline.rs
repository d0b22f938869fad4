//! One month's reconciliation, end to end: config on disk, statement files,
//! ledger template in, timestamped workbook out.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use ledgersync_recon::{run, ReconConfig, ReconError, RunReport, TargetMonth};

use crate::source::FileStatementSource;
use crate::xlsx_ledger::XlsxLedger;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config_path: PathBuf,
    pub month: TargetMonth,
    /// Replaces the configured `output_dir`.
    pub output_dir: Option<PathBuf>,
    pub dry_run: bool,
    /// Timestamp for the output file name.
    pub now: NaiveDateTime,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    /// `None` on a dry run.
    pub output: Option<PathBuf>,
}

pub fn load_config(path: &Path) -> Result<ReconConfig, ReconError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ReconError::ConfigParse(format!("{}: {e}", path.display())))?;
    ReconConfig::from_toml(&text)
}

pub fn reconcile_month(options: &RunOptions) -> Result<RunOutcome, ReconError> {
    let config = load_config(&options.config_path)?;
    let base = options
        .config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let template = relative_to(&base, &config.ledger);
    let source_dir = relative_to(&base, &config.source_dir_for(&options.month));
    let output_dir = match &options.output_dir {
        Some(dir) => dir.clone(),
        None => relative_to(&base, &config.output_dir_for(&options.month)),
    };

    log::info!(
        "{} {}: ledger {}, statements in {}",
        if config.name.is_empty() { "run" } else { config.name.as_str() },
        options.month,
        template.display(),
        source_dir.display()
    );

    let mut ledger = XlsxLedger::open(&template)?;
    let sources = FileStatementSource::new(source_dir);
    let report = run(&config, options.month, &mut ledger, &sources)?;

    if options.dry_run {
        log::info!("dry run, nothing written");
        return Ok(RunOutcome { report, output: None });
    }

    let output = output_dir.join(output_file_name(&template, options.month, options.now));
    ledger.save_as(&output)?;
    Ok(RunOutcome { report, output: Some(output) })
}

/// `<template stem>_<YYYY-MM>_<YYYYMMDD-HHMMSS>.xlsx`
pub fn output_file_name(template: &Path, month: TargetMonth, now: NaiveDateTime) -> String {
    let stem = template
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("ledger");
    format!("{stem}_{month}_{}.xlsx", now.format("%Y%m%d-%H%M%S"))
}

fn relative_to(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
