use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use ledgersync_recon::cells::Cell;
use ledgersync_recon::config::AccountConfig;
use ledgersync_recon::ledger::{read_state, LedgerSheet};
use ledgersync_recon::memory::{MemoryLedger, MemorySheet};
use ledgersync_recon::{
    run, AccountStatus, ReconConfig, ReconError, RunReport, SourceGrid, StatementSource, TargetMonth,
};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn config() -> ReconConfig {
    let toml = std::fs::read_to_string(fixtures_dir().join("two-accounts.toml")).unwrap();
    ReconConfig::from_toml(&toml).unwrap()
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn july() -> TargetMonth {
    TargetMonth::new(2025, 7).unwrap()
}

/// Statement files keyed by the account's source pattern.
#[derive(Default)]
struct Files {
    by_pattern: HashMap<String, (PathBuf, SourceGrid)>,
}

impl Files {
    fn with(mut self, pattern: &str, file: &str, grid: SourceGrid) -> Self {
        self.by_pattern.insert(pattern.into(), (PathBuf::from(file), grid));
        self
    }
}

impl StatementSource for Files {
    fn locate(&self, account: &AccountConfig) -> Result<PathBuf, ReconError> {
        self.by_pattern
            .get(&account.source)
            .map(|(p, _)| p.clone())
            .ok_or_else(|| ReconError::SourceMissing {
                account: account.sheet.clone(),
                pattern: account.source.clone(),
            })
    }

    fn load(&self, path: &Path) -> Result<SourceGrid, ReconError> {
        self.by_pattern
            .values()
            .find(|(p, _)| p == path)
            .map(|(_, g)| g.clone())
            .ok_or_else(|| ReconError::SourceUnreadable {
                path: path.display().to_string(),
                reason: "gone".into(),
            })
    }
}

fn cibc(rows: &[[&str; 3]]) -> SourceGrid {
    let mut all = vec![vec!["Ledger date".to_string(), "Description".into(), "Amount".into()]];
    all.extend(rows.iter().map(|r| r.iter().map(|s| s.to_string()).collect()));
    SourceGrid::from_text_rows(all)
}

fn rbc(rows: &[[&str; 4]]) -> SourceGrid {
    let mut all = vec![vec![
        "Date".to_string(),
        "Description 1".into(),
        "Withdrawals".into(),
        "Deposits".into(),
        "Balance".into(),
    ]];
    all.extend(rows.iter().map(|r| {
        let mut row: Vec<String> = r.iter().map(|s| s.to_string()).collect();
        row.push("1000".into());
        row
    }));
    SourceGrid::from_text_rows(all)
}

/// ACCT-1 runs through 2025-07-31 with a single FEE of 25 on that day.
fn acct1_sheet() -> MemorySheet {
    let mut sheet = MemorySheet::new("ACCT-1");
    sheet.set_row(0, vec![Cell::text("Date"), Cell::text("Description"), Cell::text("Debit"), Cell::text("Credit")]);
    sheet.set_row(1, vec![Cell::Number(45860.0), Cell::text("RENT"), Cell::Number(1800.0)]);
    sheet.set_row(2, vec![Cell::Date(d(2025, 7, 31)), Cell::text("FEE"), Cell::Number(25.0)]);
    sheet
}

fn acct2_sheet() -> MemorySheet {
    let mut sheet = MemorySheet::new("ACCT-2");
    sheet.set_row(0, vec![Cell::text("Description"), Cell::text("Effective Date")]);
    sheet
}

fn ledger() -> MemoryLedger {
    let mut ledger = MemoryLedger::new();
    ledger.add_sheet(acct1_sheet());
    ledger.add_sheet(acct2_sheet());
    ledger
}

fn merge<'a>(report: &'a RunReport, sheet: &str) -> &'a ledgersync_recon::MergeResult {
    match &report.account(sheet).unwrap().status {
        AccountStatus::Succeeded(m) => m,
        AccountStatus::Failed { error } => panic!("{sheet} failed: {error}"),
    }
}

// -------------------------------------------------------------------------
// Boundary-day duplicates
// -------------------------------------------------------------------------

#[test]
fn same_day_fee_scenario() {
    let files = Files::default()
        .with("acct1*.csv", "acct1.csv", cibc(&[["7/31/2025", "FEE", "-25"], ["7/31/2025", "FEE", "-30"]]))
        .with("rbc*.csv", "rbc.csv", rbc(&[]));
    let mut ledger = ledger();
    let report = run(&config(), july(), &mut ledger, &files).unwrap();

    let m = merge(&report, "ACCT-1");
    assert_eq!(m.parsed, 2);
    assert_eq!(m.accepted, 1);
    assert_eq!(m.rejected_duplicate, 1);
    assert_eq!(m.rejected_stale, 0);
    assert_eq!(m.appended_rows.map(|r| (r.first, r.last)), Some((4, 4)));

    let sheet = ledger.sheet("ACCT-1").unwrap();
    assert_eq!(sheet.row_count(), 4);
    assert_eq!(sheet.cell(3, 1), Cell::text("FEE"));
    assert_eq!(sheet.cell(3, 2), Cell::Number(30.0));
    assert_eq!(sheet.cell(3, 4), Cell::text("PENDING REVIEW"));
}

#[test]
fn earlier_days_in_the_month_are_stale() {
    let files = Files::default()
        .with(
            "acct1*.csv",
            "acct1.csv",
            cibc(&[["7/21/2025", "RENT", "-1800"], ["7/30/2025", "NEW BUT LATE", "-5"], ["8/1/2025", "NEXT MONTH", "-1"]]),
        )
        .with("rbc*.csv", "rbc.csv", rbc(&[]));
    let mut ledger = ledger();
    let report = run(&config(), july(), &mut ledger, &files).unwrap();

    let m = merge(&report, "ACCT-1");
    assert_eq!(m.rejected_stale, 2);
    assert_eq!(m.outside_window, 1);
    assert_eq!(m.accepted, 0);
    assert_eq!(m.appended_rows, None);
}

// -------------------------------------------------------------------------
// Whole-run properties
// -------------------------------------------------------------------------

#[test]
fn second_run_accepts_nothing() {
    let files = Files::default()
        .with(
            "acct1*.csv",
            "acct1.csv",
            cibc(&[["7/31/2025", "FEE", "-25"], ["7/31/2025", "WIRE IN", "500"], ["7/31/2025", "SERVICE CHARGE", "-12.50"]]),
        )
        .with(
            "rbc*.csv",
            "rbc.csv",
            rbc(&[["20250702", "DEPOSIT", "", "300"], ["20250709", "PAYROLL", "1,250.00", ""]]),
        );
    let mut ledger = ledger();

    let first = run(&config(), july(), &mut ledger, &files).unwrap();
    assert_eq!(first.total_accepted(), 4);

    let second = run(&config(), july(), &mut ledger, &files).unwrap();
    assert_eq!(second.total_accepted(), 0);
    let m1 = merge(&second, "ACCT-1");
    assert_eq!(m1.rejected_duplicate, 3);
    let m2 = merge(&second, "ACCT-2");
    assert_eq!(m2.rejected_stale + m2.rejected_duplicate, 2);
    assert_eq!(ledger.sheet("ACCT-2").unwrap().row_count(), 3);
}

#[test]
fn empty_sheet_bootstraps_from_statement() {
    let files = Files::default()
        .with("acct1*.csv", "acct1.csv", cibc(&[]))
        .with(
            "rbc*.csv",
            "rbc.csv",
            rbc(&[["20250715", "B", "5", ""], ["20250703", "A", "", "7"]]),
        );
    let mut ledger = ledger();
    let report = run(&config(), july(), &mut ledger, &files).unwrap();

    let m = merge(&report, "ACCT-2");
    assert_eq!(m.last_date_before, None);
    assert_eq!(m.accepted, 2);
    assert_eq!(m.last_date_after, Some(d(2025, 7, 15)));

    let sheet = ledger.sheet("ACCT-2").unwrap();
    // written date-ascending, dates as text in column B
    assert_eq!(sheet.cell(1, 0), Cell::text("A"));
    assert_eq!(sheet.cell(1, 1), Cell::text("07/03/2025"));
    assert_eq!(sheet.cell(2, 0), Cell::text("B"));

    let cols = config().accounts[1].sheet_columns();
    assert_eq!(read_state(sheet, &cols).last_date, Some(d(2025, 7, 15)));
}

#[test]
fn missing_source_only_fails_its_account() {
    let files = Files::default().with("rbc*.csv", "rbc.csv", rbc(&[["20250702", "DEPOSIT", "", "300"]]));
    let mut ledger = ledger();
    let report = run(&config(), july(), &mut ledger, &files).unwrap();

    assert_eq!(report.failed_accounts(), vec!["ACCT-1"]);
    match &report.account("ACCT-1").unwrap().status {
        AccountStatus::Failed { error } => assert!(error.contains("acct1*.csv")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(merge(&report, "ACCT-2").accepted, 1);
    assert_eq!(ledger.sheet("ACCT-1").unwrap().row_count(), 3);
}

#[test]
fn matching_rule_replaces_the_review_marker() {
    let files = Files::default()
        .with("acct1*.csv", "acct1.csv", cibc(&[["7/31/2025", "SERVICE CHARGE", "-12.50"]]))
        .with("rbc*.csv", "rbc.csv", rbc(&[]));
    let mut ledger = ledger();
    let report = run(&config(), july(), &mut ledger, &files).unwrap();

    assert_eq!(merge(&report, "ACCT-1").flagged_for_review, 0);
    let sheet = ledger.sheet("ACCT-1").unwrap();
    assert_eq!(sheet.cell(3, 4), Cell::text("Bank fees"));
}

#[test]
fn forward_only_skips_days_before_the_boundary() {
    let mut cfg = config();
    cfg.forward_only = true;
    let files = Files::default()
        .with(
            "acct1*.csv",
            "acct1.csv",
            cibc(&[["7/21/2025", "RENT", "-1800"], ["7/31/2025", "FEE", "-25"]]),
        )
        .with("rbc*.csv", "rbc.csv", rbc(&[]));
    let mut ledger = ledger();
    let report = run(&cfg, july(), &mut ledger, &files).unwrap();

    let m = merge(&report, "ACCT-1");
    assert_eq!(m.outside_window, 1);
    assert_eq!(m.rejected_stale, 0);
    assert_eq!(m.rejected_duplicate, 1);
}
