//! Canonical comparison keys and the boundary-day duplicate decision.
//!
//! Only rows dated exactly on the ledger's last date are compared. Anything
//! earlier is stale, anything later is new. A correction inserted into the
//! ledger before its last date is therefore invisible here.

use chrono::NaiveDate;

use crate::cells::{parse_amount, Cell};
use crate::model::{Decision, LedgerSheetState, TransactionRecord};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalKey {
    /// ISO calendar date.
    pub date: String,
    /// Trimmed, case preserved.
    pub description: String,
    /// Magnitude in cents; absent, blank and zero all collapse to `None`.
    pub debit: Option<u64>,
    pub credit: Option<u64>,
}

impl CanonicalKey {
    pub fn new(date: NaiveDate, description: &str, debit: Option<i64>, credit: Option<i64>) -> Self {
        Self {
            date: date.format("%Y-%m-%d").to_string(),
            description: description.trim().to_string(),
            debit: canonical_amount(debit),
            credit: canonical_amount(credit),
        }
    }

    pub fn of_record(record: &TransactionRecord) -> Self {
        Self::new(record.date, &record.description, record.debit, record.credit)
    }

    /// Key for a ledger row read back from sheet cells.
    ///
    /// Amount cells that are not numbers are treated as blank; they can never
    /// have been written by the appender.
    pub fn from_cells(date: NaiveDate, description: &Cell, debit: &Cell, credit: &Cell) -> Self {
        let debit = parse_amount(debit).unwrap_or(None);
        let credit = parse_amount(credit).unwrap_or(None);
        Self::new(date, &description.as_text(), debit, credit)
    }
}

pub fn canonical_amount(cents: Option<i64>) -> Option<u64> {
    cents.map(i64::unsigned_abs).filter(|c| *c != 0)
}

pub fn classify(record: &TransactionRecord, state: &LedgerSheetState) -> Decision {
    let Some(last) = state.last_date else {
        return Decision::AcceptNew;
    };
    if record.date < last {
        Decision::RejectStale
    } else if record.date > last {
        Decision::AcceptNew
    } else if state.boundary_set.contains(&CanonicalKey::of_record(record)) {
        Decision::RejectDuplicate
    } else {
        Decision::AcceptNew
    }
}
