//! Ledger sheet access: the backend boundary, the state reader and the
//! appender.
//!
//! The orchestrator owns the whole document. Reader and appender only ever
//! see one [`LedgerSheet`] at a time.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::canon::CanonicalKey;
use crate::cells::{date_to_excel_serial, parse_date, Cell, ColumnRef};
use crate::error::ReconError;
use crate::model::{LedgerSheetState, RowRange, TransactionRecord};
use crate::rules::RuleSet;

// ---------------------------------------------------------------------------
// Backend traits
// ---------------------------------------------------------------------------

/// One worksheet of the ledger. Rows and columns are 0-based.
pub trait LedgerSheet {
    fn name(&self) -> &str;

    /// One past the highest row that holds any cell.
    fn row_count(&self) -> u32;

    fn cell(&self, row: u32, col: u16) -> Cell;

    /// Write a new row. `style_from` names an existing row whose row and cell
    /// formatting the new row copies. Cells already present at `row` win over
    /// the incoming ones.
    fn append_row(
        &mut self,
        row: u32,
        cells: &[(u16, Cell)],
        style_from: Option<u32>,
    ) -> Result<(), ReconError>;
}

pub trait LedgerDocument {
    fn sheet_names(&self) -> Vec<String>;

    fn sheet_mut(&mut self, name: &str) -> Option<&mut dyn LedgerSheet>;
}

// ---------------------------------------------------------------------------
// Column layout
// ---------------------------------------------------------------------------

/// Where a ledger sheet keeps each field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SheetColumns {
    #[serde(default = "default_header_rows")]
    pub header_rows: u32,
    pub date: ColumnRef,
    pub description: ColumnRef,
    pub debit: ColumnRef,
    pub credit: ColumnRef,
    #[serde(default)]
    pub details: Option<ColumnRef>,
    #[serde(default)]
    pub customer_reference: Option<ColumnRef>,
    #[serde(default)]
    pub bank_reference: Option<ColumnRef>,
    /// Receives the review marker on rows no rule classified.
    #[serde(default)]
    pub flag: Option<ColumnRef>,
    /// chrono format for text dates; dates are written as serials when unset.
    #[serde(default)]
    pub date_format: Option<String>,
}

fn default_header_rows() -> u32 {
    1
}

impl SheetColumns {
    fn data_columns(&self) -> [u16; 4] {
        [self.date.0, self.description.0, self.debit.0, self.credit.0]
    }

    fn date_cell(&self, date: NaiveDate) -> Cell {
        match &self.date_format {
            Some(fmt) => Cell::Text(date.format(fmt).to_string()),
            None => Cell::Number(date_to_excel_serial(date)),
        }
    }

    /// Date in the date column, trying `date_format` on text before the
    /// general parser so the sheet reads back what the appender wrote.
    fn read_date(&self, cell: &Cell) -> Option<NaiveDate> {
        if let (Some(fmt), Cell::Text(text)) = (&self.date_format, cell) {
            if let Ok(date) = NaiveDate::parse_from_str(text.trim(), fmt) {
                return Some(date);
            }
        }
        parse_date(cell)
    }
}

// ---------------------------------------------------------------------------
// State reader
// ---------------------------------------------------------------------------

/// Scan every data row and collect the last date and its boundary keys.
///
/// Physical order is not trusted; the whole sheet is read.
pub fn read_state(sheet: &dyn LedgerSheet, columns: &SheetColumns) -> LedgerSheetState {
    let mut state = LedgerSheetState::default();
    let mut boundary_rows: Vec<u32> = Vec::new();

    for row in columns.header_rows..sheet.row_count() {
        let Some(date) = columns.read_date(&sheet.cell(row, columns.date.0)) else {
            continue;
        };
        state.data_rows += 1;
        match state.last_date {
            Some(last) if date < last => {}
            Some(last) if date == last => boundary_rows.push(row),
            _ => {
                state.last_date = Some(date);
                boundary_rows.clear();
                boundary_rows.push(row);
            }
        }
    }

    if let Some(last) = state.last_date {
        state.boundary_set = boundary_rows
            .into_iter()
            .map(|row| {
                CanonicalKey::from_cells(
                    last,
                    &sheet.cell(row, columns.description.0),
                    &sheet.cell(row, columns.debit.0),
                    &sheet.cell(row, columns.credit.0),
                )
            })
            .collect::<HashSet<_>>();
    }

    log::debug!(
        "{}: {} dated rows, last date {:?}, {} boundary keys",
        sheet.name(),
        state.data_rows,
        state.last_date,
        state.boundary_set.len()
    );
    state
}

/// Last row holding anything in the date, description, debit or credit columns.
pub fn last_used_row(sheet: &dyn LedgerSheet, columns: &SheetColumns) -> Option<u32> {
    let data_cols = columns.data_columns();
    (columns.header_rows..sheet.row_count())
        .rev()
        .find(|&row| data_cols.iter().any(|&c| !sheet.cell(row, c).is_blank()))
}

// ---------------------------------------------------------------------------
// Appender
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppendOutcome {
    pub rows: Option<RowRange>,
    pub flagged: usize,
}

/// Write `records` date-ascending below the last used row.
///
/// Existing cells are never touched. Columns outside the layout stay blank;
/// rows no rule classified get `review_marker` in the flag column.
pub fn append(
    sheet: &mut dyn LedgerSheet,
    records: &[TransactionRecord],
    columns: &SheetColumns,
    rules: &RuleSet,
    review_marker: &str,
) -> Result<AppendOutcome, ReconError> {
    if records.is_empty() {
        return Ok(AppendOutcome::default());
    }

    let mut sorted: Vec<&TransactionRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.date);

    let start = match last_used_row(sheet, columns) {
        Some(row) => row + 1,
        None => columns.header_rows,
    };
    let style_from = start.checked_sub(1);

    let mut flagged = 0;
    for (i, record) in sorted.iter().enumerate() {
        let row = start + i as u32;
        let mut cells = row_cells(record, columns);

        match rules.classify(record) {
            Some(assignments) => {
                for (col, value) in assignments {
                    // parsed data wins over a rule aimed at the wrong column
                    if !cells.iter().any(|(c, _)| *c == col.0) {
                        cells.push((col.0, Cell::text(value.as_str())));
                    }
                }
                cells.sort_by_key(|(c, _)| *c);
            }
            None => {
                if let Some(flag) = columns.flag {
                    put(&mut cells, flag.0, Cell::text(review_marker));
                    cells.sort_by_key(|(c, _)| *c);
                }
                flagged += 1;
            }
        }

        sheet.append_row(row, &cells, style_from)?;
    }

    let rows = RowRange { first: start + 1, last: start + sorted.len() as u32 };
    log::info!(
        "{}: appended {} row(s) at {}..{}, {} flagged for review",
        sheet.name(),
        sorted.len(),
        rows.first,
        rows.last,
        flagged
    );
    Ok(AppendOutcome { rows: Some(rows), flagged })
}

fn row_cells(record: &TransactionRecord, columns: &SheetColumns) -> Vec<(u16, Cell)> {
    let amount = |cents: Option<i64>| match cents {
        Some(c) if c != 0 => Cell::Number(c.abs() as f64 / 100.0),
        _ => Cell::Empty,
    };
    let mut cells = vec![
        (columns.date.0, columns.date_cell(record.date)),
        (columns.description.0, Cell::text(record.description.as_str())),
        (columns.debit.0, amount(record.debit)),
        (columns.credit.0, amount(record.credit)),
    ];
    let optional = [
        (columns.details, &record.details),
        (columns.customer_reference, &record.customer_reference),
        (columns.bank_reference, &record.bank_reference),
    ];
    for (col, value) in optional {
        if let (Some(col), Some(value)) = (col, value) {
            put(&mut cells, col.0, Cell::text(value.as_str()));
        }
    }
    cells.retain(|(_, c)| *c != Cell::Empty);
    cells.sort_by_key(|(c, _)| *c);
    cells
}

fn put(cells: &mut Vec<(u16, Cell)>, col: u16, value: Cell) {
    match cells.iter_mut().find(|(c, _)| *c == col) {
        Some(slot) => slot.1 = value,
        None => cells.push((col, value)),
    }
}
