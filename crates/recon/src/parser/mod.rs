//! Statement parsers.
//!
//! Each bank export is loaded into a [`SourceGrid`] by the IO layer and handed
//! to the [`BankLayout`] variant configured for the account. Every variant
//! honours the same contract: records inside the date window come back in
//! `records`, unreadable rows in `skipped`, and nothing short of a missing
//! header aborts the parse.

pub mod bmo;
pub mod cibc;
pub mod rbc;

use std::collections::HashMap;

use serde::Deserialize;

use crate::cells::Cell;
use crate::error::ReconError;
use crate::ledger::SheetColumns;
use crate::model::{SkippedRow, TransactionRecord};
use crate::window::DateWindow;

pub use bmo::BmoLayout;
pub use cibc::CibcLayout;
pub use rbc::RbcLayout;

// ---------------------------------------------------------------------------
// Layout dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BankLayout {
    Bmo(BmoLayout),
    Cibc(CibcLayout),
    Rbc(RbcLayout),
}

impl BankLayout {
    /// Parse `grid` for the ledger sheet `account`, keeping dates inside `window`.
    pub fn parse(
        &self,
        grid: &SourceGrid,
        account: &str,
        window: DateWindow,
    ) -> Result<ParseOutput, ReconError> {
        let mut out = Collector::new(account, window);
        match self {
            Self::Bmo(layout) => layout.parse(grid, &mut out)?,
            Self::Cibc(layout) => layout.parse(grid, &mut out)?,
            Self::Rbc(layout) => layout.parse(grid, &mut out)?,
        }
        Ok(out.finish())
    }

    pub fn brand(&self) -> &'static str {
        match self {
            Self::Bmo(_) => "BMO",
            Self::Cibc(_) => "CIBC",
            Self::Rbc(_) => "RBC",
        }
    }

    /// Ledger column layout used when the account does not override it.
    pub fn default_sheet_columns(&self) -> SheetColumns {
        match self {
            Self::Bmo(_) => bmo::ledger_columns(),
            Self::Cibc(_) => cibc::ledger_columns(),
            Self::Rbc(_) => rbc::ledger_columns(),
        }
    }

    /// Secondary key that selects this account inside a shared export.
    pub fn split_key(&self) -> Option<&str> {
        match self {
            Self::Bmo(layout) => Some(layout.account.as_str()),
            Self::Cibc(layout) => layout.account.as_deref(),
            Self::Rbc(layout) => layout.account.as_deref(),
        }
    }
}

// ---------------------------------------------------------------------------
// Source grid
// ---------------------------------------------------------------------------

static EMPTY: Cell = Cell::Empty;

/// A loaded source sheet: rows of typed cells, ragged rows allowed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceGrid {
    rows: Vec<Vec<Cell>>,
}

impl SourceGrid {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// Grid of text cells, blanks as `Cell::Empty`. Handy for CSV input.
    pub fn from_text_rows<R, S>(rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|s| Cell::text(s.as_ref())).collect())
            .collect();
        Self { rows }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, row: usize) -> &[Cell] {
        self.rows.get(row).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.row(row).get(col).unwrap_or(&EMPTY)
    }

    /// Trimmed text of a cell, `None` when blank.
    pub(crate) fn text(&self, row: usize, col: usize) -> Option<String> {
        let cell = self.cell(row, col);
        if cell.is_blank() {
            None
        } else {
            Some(cell.as_text().trim().to_string())
        }
    }

    pub(crate) fn row_is_blank(&self, row: usize) -> bool {
        self.row(row).iter().all(Cell::is_blank)
    }
}

// ---------------------------------------------------------------------------
// Parse output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutput {
    pub records: Vec<TransactionRecord>,
    pub skipped: Vec<SkippedRow>,
    pub outside_window: usize,
    pub warnings: Vec<String>,
}

/// Accumulates parser output and applies the checks every layout shares.
pub(crate) struct Collector<'a> {
    pub(crate) account: &'a str,
    window: DateWindow,
    out: ParseOutput,
}

impl<'a> Collector<'a> {
    fn new(account: &'a str, window: DateWindow) -> Self {
        Self { account, window, out: ParseOutput::default() }
    }

    pub(crate) fn skip(&mut self, row: usize, reason: impl Into<String>) {
        let reason = reason.into();
        log::warn!("{}: skipping source row {}: {}", self.account, row + 1, reason);
        self.out.skipped.push(SkippedRow { row, reason });
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}: {}", self.account, message);
        self.out.warnings.push(message);
    }

    pub(crate) fn push(&mut self, record: TransactionRecord) {
        if !self.window.contains(record.date) {
            log::debug!(
                "{}: row {} dated {} is outside {}..{}",
                self.account,
                record.source_row + 1,
                record.date,
                self.window.start,
                self.window.end
            );
            self.out.outside_window += 1;
            return;
        }
        if record.debit.is_none() && record.credit.is_none() {
            self.skip(record.source_row, "no amount");
            return;
        }
        if record.has_conflicting_amounts() {
            self.warn(format!(
                "row {} has both a debit and a credit",
                record.source_row + 1
            ));
        }
        self.out.records.push(record);
    }

    pub(crate) fn record(&self, row: usize, date: chrono::NaiveDate, description: String) -> TransactionRecord {
        TransactionRecord {
            date,
            description,
            debit: None,
            credit: None,
            details: None,
            customer_reference: None,
            bank_reference: None,
            source_account_key: self.account.to_string(),
            source_row: row,
        }
    }

    fn finish(self) -> ParseOutput {
        self.out
    }
}

/// Magnitude of a non-zero amount.
pub(crate) fn nonzero(cents: Option<i64>) -> Option<i64> {
    cents.filter(|c| *c != 0).map(i64::abs)
}

// ---------------------------------------------------------------------------
// Header rows
// ---------------------------------------------------------------------------

/// Column positions of a header row, looked up case-insensitively.
#[derive(Debug, Clone, Default)]
pub(crate) struct HeaderMap {
    columns: HashMap<String, usize>,
}

impl HeaderMap {
    pub(crate) fn from_row(cells: &[Cell]) -> Self {
        let mut columns = HashMap::new();
        for (i, cell) in cells.iter().enumerate() {
            let key = normalize_header(&cell.as_text());
            if !key.is_empty() {
                columns.entry(key).or_insert(i);
            }
        }
        Self { columns }
    }

    pub(crate) fn get(&self, name: &str) -> Option<usize> {
        self.columns.get(&normalize_header(name)).copied()
    }

    pub(crate) fn require(&self, name: &str, account: &str) -> Result<usize, ReconError> {
        self.get(name).ok_or_else(|| ReconError::MissingColumn {
            account: account.to_string(),
            column: name.to_string(),
        })
    }
}

pub(crate) fn normalize_header(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub(crate) fn row_has_header(cells: &[Cell], name: &str) -> bool {
    let wanted = normalize_header(name);
    cells.iter().any(|c| normalize_header(&c.as_text()) == wanted)
}
