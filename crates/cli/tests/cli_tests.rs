// Integration tests for the `ledgersync` binary.
// Run with: cargo test -p ledgersync-cli --test cli_tests -- --nocapture

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

const CONFIG: &str = r#"
name = "test stores"
ledger = "templates/ledger.xlsx"
source_dir = "bank/{month}"
output_dir = "out/{month}"

[[accounts]]
sheet = "ACCT-1"
code = "CIBC1"
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

[[accounts]]
sheet = "ACCT-2"
source = "rbc*.csv"
[accounts.layout]
kind = "rbc"
"#;

fn ledgersync(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ledgersync"));
    cmd.current_dir(dir);
    cmd.env_remove("LEDGERSYNC_CONFIG");
    cmd.env_remove("RUST_LOG");
    cmd
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn write_template(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let date_fmt = Format::new().set_num_format("yyyy-mm-dd");

    let mut wb = Workbook::new();
    let acct1 = wb.add_worksheet();
    acct1.set_name("ACCT-1").unwrap();
    for (col, header) in ["Date", "Description", "Debit", "Credit", "Review"].iter().enumerate() {
        acct1.write_string(0, col as u16, *header).unwrap();
    }
    acct1
        .write_datetime_with_format(1, 0, &ExcelDateTime::from_ymd(2025, 7, 31).unwrap(), &date_fmt)
        .unwrap();
    acct1.write_string(1, 1, "FEE").unwrap();
    acct1.write_number(1, 2, 25.0).unwrap();

    let acct2 = wb.add_worksheet();
    acct2.set_name("ACCT-2").unwrap();
    acct2.write_string(0, 0, "Description").unwrap();
    acct2.write_string(0, 1, "Effective Date").unwrap();

    wb.save(path).unwrap();
}

/// Config, template and July's exports in a scratch directory.
fn workspace() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("ledgersync.toml"), CONFIG).unwrap();
    write_template(&dir.path().join("templates/ledger.xlsx"));

    let bank = dir.path().join("bank/2025-07");
    std::fs::create_dir_all(&bank).unwrap();
    std::fs::write(
        bank.join("acct1-export.csv"),
        "Ledger date,Description,Amount\n7/31/2025,FEE,-25\n7/31/2025,FEE,-30\n",
    )
    .unwrap();
    std::fs::write(
        bank.join("rbc-export.csv"),
        "Date,Description 1,Withdrawals,Deposits,Balance\n20250702,DEPOSIT,,300,1300\n",
    )
    .unwrap();
    dir
}

fn outputs(dir: &Path) -> Vec<PathBuf> {
    let out = dir.join("out/2025-07");
    let Ok(entries) = std::fs::read_dir(&out) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries.map(|e| e.unwrap().path()).collect();
    files.sort();
    files
}

// ---------------------------------------------------------------------------
// Usage
// ---------------------------------------------------------------------------

#[test]
fn target_date_is_required() {
    let dir = workspace();
    let output = ledgersync(dir.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("--target-date is required"));
}

#[test]
fn bad_target_date_is_a_usage_error() {
    let dir = workspace();
    let output = ledgersync(dir.path()).args(["--target-date", "July"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

#[test]
fn validate_accepts_good_config() {
    let dir = workspace();
    let output = ledgersync(dir.path()).args(["validate", "ledgersync.toml"]).output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    let err = stderr(&output);
    assert!(err.contains("valid: 'test stores' with 2 account(s)"));
    assert!(err.contains("ACCT-1 (CIBC1): CIBC <- acct1*.csv"));
}

#[test]
fn validate_rejects_bad_config() {
    let dir = workspace();
    std::fs::write(dir.path().join("broken.toml"), "ledger = \"l.xlsx\"\naccounts = []\n").unwrap();
    let output = ledgersync(dir.path()).args(["validate", "broken.toml"]).output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).starts_with("error: "));
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[test]
fn run_writes_workbook_and_json_report() {
    let dir = workspace();
    let output = ledgersync(dir.path()).args(["--target-date", "2025-07-31", "--json"]).output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["month"], "2025-07");
    assert_eq!(report["dry_run"], false);
    assert_eq!(report["accounts"][0]["sheet"], "ACCT-1");
    assert_eq!(report["accounts"][0]["accepted"], 1);
    assert_eq!(report["accounts"][0]["rejected_duplicate"], 1);
    assert_eq!(report["accounts"][1]["accepted"], 1);

    let written = outputs(dir.path());
    assert_eq!(written.len(), 1);
    let name = written[0].file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("ledger_2025-07_") && name.ends_with(".xlsx"), "{name}");
    assert!(report["output"].as_str().unwrap().ends_with(name));

    assert!(stderr(&output).contains("reconciled 2025-07 'test stores'"));
}

#[test]
fn one_failing_account_exits_4_and_still_saves() {
    let dir = workspace();
    std::fs::remove_file(dir.path().join("bank/2025-07/rbc-export.csv")).unwrap();
    let output = ledgersync(dir.path()).args(["--target-date", "2025-07"]).output().unwrap();

    assert_eq!(output.status.code(), Some(4));
    let err = stderr(&output);
    assert!(err.contains("error: 1 account(s) failed: ACCT-2"), "{err}");
    assert!(err.contains("FAILED"));
    assert_eq!(outputs(dir.path()).len(), 1);
}

#[test]
fn missing_template_exits_5() {
    let dir = workspace();
    std::fs::remove_file(dir.path().join("templates/ledger.xlsx")).unwrap();
    let output = ledgersync(dir.path()).args(["--target-date", "2025-07"]).output().unwrap();
    assert_eq!(output.status.code(), Some(5));
    assert!(stderr(&output).contains("hint:  "));
}

#[test]
fn unwritable_output_folder_exits_6() {
    let dir = workspace();
    std::fs::write(dir.path().join("desk"), "a file, not a folder").unwrap();
    let output = ledgersync(dir.path())
        .args(["--target-date", "2025-07", "--output-folder", "desk/recon"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(6));
    let err = stderr(&output);
    assert!(err.contains("error: IO error: "), "{err}");
    assert!(err.contains("hint:  "), "{err}");
    assert!(outputs(dir.path()).is_empty());
}

#[test]
fn dry_run_leaves_no_workbook() {
    let dir = workspace();
    let output = ledgersync(dir.path()).args(["--target-date", "2025-07", "--dry-run"]).output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stderr(&output).contains("dry run"));
    assert!(outputs(dir.path()).is_empty());
}

#[test]
fn output_folder_overrides_config() {
    let dir = workspace();
    let target = dir.path().join("desk");
    let output = ledgersync(dir.path())
        .args(["--target-date", "2025-07", "--output-folder"])
        .arg(&target)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(std::fs::read_dir(&target).unwrap().count(), 1);
    assert!(outputs(dir.path()).is_empty());
}

#[test]
fn config_from_environment() {
    let dir = workspace();
    std::fs::rename(dir.path().join("ledgersync.toml"), dir.path().join("stores.toml")).unwrap();
    let output = ledgersync(dir.path())
        .env("LEDGERSYNC_CONFIG", dir.path().join("stores.toml"))
        .args(["--target-date", "2025-07", "--dry-run"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
}

#[test]
fn missing_config_exits_3() {
    let dir = tempfile::tempdir().unwrap();
    let output = ledgersync(dir.path()).args(["--target-date", "2025-07"]).output().unwrap();
    assert_eq!(output.status.code(), Some(3));
}
