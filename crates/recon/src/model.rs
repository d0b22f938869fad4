use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::canon::CanonicalKey;

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// One normalized bank transaction, bound for a single ledger sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub date: NaiveDate,
    pub description: String,
    /// Money out, in cents. `None` when the source row carries no debit.
    pub debit: Option<i64>,
    /// Money in, in cents.
    pub credit: Option<i64>,
    pub details: Option<String>,
    pub customer_reference: Option<String>,
    pub bank_reference: Option<String>,
    /// Ledger sheet this record belongs to.
    pub source_account_key: String,
    /// 0-based row in the source grid.
    pub source_row: usize,
}

impl TransactionRecord {
    /// Both sides populated with non-zero values.
    pub fn has_conflicting_amounts(&self) -> bool {
        matches!((self.debit, self.credit), (Some(d), Some(c)) if d != 0 && c != 0)
    }

    /// Net movement in cents, credits positive.
    pub fn net_cents(&self) -> i64 {
        self.credit.unwrap_or(0).abs() - self.debit.unwrap_or(0).abs()
    }

    pub fn direction(&self) -> Option<Direction> {
        match (self.debit.filter(|v| *v != 0), self.credit.filter(|v| *v != 0)) {
            (Some(_), None) => Some(Direction::Debit),
            (None, Some(_)) => Some(Direction::Credit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Debit,
    Credit,
}

/// A source row the parser could not turn into a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRow {
    pub row: usize,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Ledger state + decisions
// ---------------------------------------------------------------------------

/// What the ledger already holds for one sheet, computed fresh every run.
#[derive(Debug, Clone, Default)]
pub struct LedgerSheetState {
    pub last_date: Option<NaiveDate>,
    /// Canonical keys of every row dated `last_date`.
    pub boundary_set: HashSet<CanonicalKey>,
    /// Rows with a readable date.
    pub data_rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    AcceptNew,
    RejectStale,
    RejectDuplicate,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// 1-based, inclusive sheet rows written by the appender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowRange {
    pub first: u32,
    pub last: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeResult {
    pub parsed: usize,
    pub skipped: Vec<SkippedRow>,
    pub outside_window: usize,
    pub accepted: usize,
    pub rejected_duplicate: usize,
    pub rejected_stale: usize,
    pub flagged_for_review: usize,
    pub warnings: Vec<String>,
    pub last_date_before: Option<NaiveDate>,
    pub last_date_after: Option<NaiveDate>,
    pub appended_rows: Option<RowRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AccountStatus {
    Succeeded(MergeResult),
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountOutcome {
    pub sheet: String,
    pub code: String,
    pub unit: Option<String>,
    pub source: Option<String>,
    #[serde(flatten)]
    pub status: AccountStatus,
}

impl AccountOutcome {
    pub fn merge(&self) -> Option<&MergeResult> {
        match &self.status {
            AccountStatus::Succeeded(m) => Some(m),
            AccountStatus::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub name: String,
    pub month: String,
    pub accounts: Vec<AccountOutcome>,
}

impl RunReport {
    pub fn failed_accounts(&self) -> Vec<&str> {
        self.accounts
            .iter()
            .filter(|a| matches!(a.status, AccountStatus::Failed { .. }))
            .map(|a| a.sheet.as_str())
            .collect()
    }

    pub fn total_accepted(&self) -> usize {
        self.accounts.iter().filter_map(|a| a.merge()).map(|m| m.accepted).sum()
    }

    pub fn account(&self, sheet: &str) -> Option<&AccountOutcome> {
        self.accounts.iter().find(|a| a.sheet == sheet)
    }
}
