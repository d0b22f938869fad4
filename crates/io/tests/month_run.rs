use std::io::Read;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use ledgersync_io::{reconcile_month, RunOptions, XlsxLedger};
use ledgersync_recon::cells::{date_to_excel_serial, Cell};
use ledgersync_recon::{AccountStatus, LedgerSheet, MergeResult, ReconError, RunReport};
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

const CONFIG: &str = r#"
name = "test stores"
ledger = "ledger.xlsx"
source_dir = "in/{month}"
output_dir = "out/{month}"

[[accounts]]
sheet = "ACCT-1"
source = "acct1*.csv"
[accounts.layout]
kind = "cibc"
[accounts.ledger]
header_rows = 1
date = "A"
description = "B"
debit = "C"
credit = "D"
flag = "E"
"#;

const STATEMENT: &str = "Ledger date,Description,Amount
7/31/2025,FEE,-25
7/31/2025,FEE,-30
8/1/2025,NEXT MONTH,-1
";

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn at(hour: u32) -> NaiveDateTime {
    d(2025, 8, 2).and_hms_opt(hour, 0, 0).unwrap()
}

fn write_template(path: &Path) {
    let date_fmt = Format::new().set_num_format("yyyy-mm-dd");
    let money = Format::new().set_num_format("#,##0.00");

    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.set_name("ACCT-1").unwrap();
    for (col, header) in ["Date", "Description", "Debit", "Credit", "Review"].iter().enumerate() {
        ws.write_string(0, col as u16, *header).unwrap();
    }
    ws.write_datetime_with_format(1, 0, &ExcelDateTime::from_ymd(2025, 7, 21).unwrap(), &date_fmt)
        .unwrap();
    ws.write_string(1, 1, "RENT").unwrap();
    ws.write_number_with_format(1, 2, 1800.0, &money).unwrap();
    ws.write_datetime_with_format(2, 0, &ExcelDateTime::from_ymd(2025, 7, 31).unwrap(), &date_fmt)
        .unwrap();
    ws.write_string(2, 1, "FEE").unwrap();
    ws.write_number_with_format(2, 2, 25.0, &money).unwrap();

    let notes = wb.add_worksheet();
    notes.set_name("Notes").unwrap();
    notes.write_string(0, 0, "Month-end checklist & sign-off").unwrap();

    wb.save(path).unwrap();
}

/// Scratch workspace: config, template and July's statement.
fn workspace() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("ledgersync.toml"), CONFIG).unwrap();
    write_template(&dir.path().join("ledger.xlsx"));
    let month_dir = dir.path().join("in/2025-07");
    std::fs::create_dir_all(&month_dir).unwrap();
    std::fs::write(month_dir.join("acct1 (1).csv"), STATEMENT).unwrap();
    dir
}

fn options(dir: &Path, now: NaiveDateTime) -> RunOptions {
    RunOptions {
        config_path: dir.join("ledgersync.toml"),
        month: "2025-07".parse().unwrap(),
        output_dir: None,
        dry_run: false,
        now,
    }
}

fn merge<'a>(report: &'a RunReport, sheet: &str) -> &'a MergeResult {
    match &report.account(sheet).unwrap().status {
        AccountStatus::Succeeded(m) => m,
        AccountStatus::Failed { error } => panic!("{sheet} failed: {error}"),
    }
}

fn zip_entry(path: &Path, name: &str) -> Vec<u8> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).unwrap();
    bytes
}

fn run_once(dir: &Path, now: NaiveDateTime) -> (RunReport, PathBuf) {
    let outcome = reconcile_month(&options(dir, now)).unwrap();
    (outcome.report, outcome.output.unwrap())
}

#[test]
fn appends_new_rows_to_a_timestamped_copy() {
    let dir = workspace();
    let (report, output) = run_once(dir.path(), at(9));

    assert_eq!(output, dir.path().join("out/2025-07/ledger_2025-07_20250802-090000.xlsx"));
    assert!(output.exists());

    let m = merge(&report, "ACCT-1");
    assert_eq!(m.parsed, 2);
    assert_eq!(m.outside_window, 1);
    assert_eq!(m.accepted, 1);
    assert_eq!(m.rejected_duplicate, 1);
    assert_eq!(m.flagged_for_review, 1);

    let mut wb = open_workbook_auto(&output).unwrap();
    let range = wb.worksheet_range("ACCT-1").unwrap();
    match range.get_value((3, 0)) {
        Some(Data::DateTime(dt)) => assert_eq!(dt.as_f64(), date_to_excel_serial(d(2025, 7, 31))),
        other => panic!("expected a formatted date, got {other:?}"),
    }
    assert_eq!(range.get_value((3, 1)), Some(&Data::String("FEE".into())));
    assert_eq!(range.get_value((3, 2)), Some(&Data::Float(30.0)));
    assert_eq!(range.get_value((3, 4)), Some(&Data::String("PENDING REVIEW".into())));
    assert_eq!(range.get_value((2, 2)), Some(&Data::Float(25.0)));

    let notes = wb.worksheet_range("Notes").unwrap();
    assert_eq!(notes.get_value((0, 0)), Some(&Data::String("Month-end checklist & sign-off".into())));
}

#[test]
fn template_is_untouched_and_other_parts_copied_verbatim() {
    let dir = workspace();
    let template = dir.path().join("ledger.xlsx");
    let before = std::fs::read(&template).unwrap();

    let (_, output) = run_once(dir.path(), at(9));

    assert_eq!(std::fs::read(&template).unwrap(), before);
    for part in ["xl/styles.xml", "xl/workbook.xml", "xl/sharedStrings.xml", "xl/worksheets/sheet2.xml"] {
        assert_eq!(zip_entry(&output, part), zip_entry(&template, part), "{part} changed");
    }
    assert_ne!(
        zip_entry(&output, "xl/worksheets/sheet1.xml"),
        zip_entry(&template, "xl/worksheets/sheet1.xml")
    );
}

#[test]
fn rerun_on_the_output_accepts_nothing() {
    let dir = workspace();
    let (_, output) = run_once(dir.path(), at(9));
    std::fs::copy(&output, dir.path().join("ledger.xlsx")).unwrap();

    let (report, _) = run_once(dir.path(), at(10));
    let m = merge(&report, "ACCT-1");
    assert_eq!(report.total_accepted(), 0);
    assert_eq!(m.rejected_duplicate, 2);
    assert_eq!(m.last_date_before, Some(d(2025, 7, 31)));
}

#[test]
fn appended_rows_read_back_through_the_ledger() {
    let dir = workspace();
    let (_, output) = run_once(dir.path(), at(9));

    let mut ledger = XlsxLedger::open(&output).unwrap();
    assert!(!ledger.is_modified());
    let sheet = ledger.sheet("ACCT-1").unwrap();
    assert_eq!(sheet.row_count(), 4);
    assert_eq!(sheet.cell(3, 1), Cell::text("FEE"));
    assert_eq!(sheet.cell(3, 2), Cell::Number(30.0));

    use ledgersync_recon::LedgerDocument;
    assert_eq!(ledger.sheet_names(), vec!["ACCT-1", "Notes"]);
    assert!(ledger.sheet_mut("Missing").is_none());
}

#[test]
fn dry_run_writes_nothing() {
    let dir = workspace();
    let mut opts = options(dir.path(), at(9));
    opts.dry_run = true;
    let outcome = reconcile_month(&opts).unwrap();

    assert!(outcome.output.is_none());
    assert_eq!(outcome.report.total_accepted(), 1);
    assert!(!dir.path().join("out").exists());
}

#[test]
fn output_folder_override() {
    let dir = workspace();
    let mut opts = options(dir.path(), at(9));
    opts.output_dir = Some(dir.path().join("elsewhere"));
    let outcome = reconcile_month(&opts).unwrap();
    assert_eq!(outcome.output.unwrap().parent().unwrap(), dir.path().join("elsewhere"));
}

#[test]
fn missing_template_is_ledger_unreadable() {
    let dir = workspace();
    std::fs::remove_file(dir.path().join("ledger.xlsx")).unwrap();
    let err = reconcile_month(&options(dir.path(), at(9))).unwrap_err();
    assert!(matches!(err, ReconError::LedgerUnreadable(_)));
}

#[test]
fn missing_statement_fails_the_account_but_still_saves() {
    let dir = workspace();
    std::fs::remove_dir_all(dir.path().join("in/2025-07")).unwrap();
    let (report, output) = run_once(dir.path(), at(9));

    assert_eq!(report.failed_accounts(), vec!["ACCT-1"]);
    assert!(output.exists());
}

fn listing(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = walk(dir);
    entries.sort();
    entries
}

fn walk(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            found.extend(walk(&path));
        }
        found.push(path);
    }
    found
}

#[test]
fn output_folder_under_a_file_fails_without_leftovers() {
    let dir = workspace();
    std::fs::write(dir.path().join("blocker"), "not a folder").unwrap();
    let before = listing(dir.path());

    let mut opts = options(dir.path(), at(9));
    opts.output_dir = Some(dir.path().join("blocker/desk"));
    let err = reconcile_month(&opts).unwrap_err();

    assert!(matches!(err, ReconError::Io(_)), "{err:?}");
    assert!(err.to_string().contains("blocker"), "{err}");
    assert_eq!(listing(dir.path()), before);
}

#[test]
fn failed_rename_removes_the_temporary_workbook() {
    let dir = workspace();
    let out = dir.path().join("out/2025-07");
    // a folder squatting on the output name makes the final rename fail
    let squatter = out.join("ledger_2025-07_20250802-090000.xlsx");
    std::fs::create_dir_all(&squatter).unwrap();

    let err = reconcile_month(&options(dir.path(), at(9))).unwrap_err();

    assert!(matches!(err, ReconError::Io(_) | ReconError::OutputLocked { .. }), "{err:?}");
    let left: Vec<PathBuf> = std::fs::read_dir(&out).unwrap().map(|e| e.unwrap().path()).collect();
    assert_eq!(left, vec![squatter]);
}
