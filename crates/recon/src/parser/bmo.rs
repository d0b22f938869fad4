//! BMO reconciliation report (`.xls`).
//!
//! One workbook lists every account. Each account starts with a section line
//! such as `HAI DI LAO CANADA RESTURANTS GROUP USD - 00044660798 USD (BMO - DDA)`,
//! followed within a few rows by a `Date` header and then the transactions.

use serde::Deserialize;

use crate::cells::{parse_amount, parse_date, ColumnRef};
use crate::error::ReconError;
use crate::ledger::SheetColumns;

use super::{nonzero, Collector, SourceGrid};

const HEADER_SEARCH_ROWS: usize = 10;

const TERMINATORS: &[&str] = &[
    "Generated",
    "End of transactions",
    "Last Balance received",
    "Total Debits:",
    "Total Credits:",
    "No Data Available",
];

#[derive(Debug, Clone, Deserialize)]
pub struct BmoLayout {
    /// Trailing digits of the account number that select the section.
    pub account: String,
    #[serde(default = "default_section_marker")]
    pub section_marker: String,
    #[serde(default)]
    pub columns: BmoColumns,
}

fn default_section_marker() -> String {
    "(BMO - DDA)".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BmoColumns {
    pub date: ColumnRef,
    pub description: ColumnRef,
    pub customer_reference: ColumnRef,
    pub bank_reference: ColumnRef,
    pub debit: ColumnRef,
    pub credit: ColumnRef,
    pub details: ColumnRef,
}

impl Default for BmoColumns {
    fn default() -> Self {
        Self {
            date: ColumnRef(0),
            description: ColumnRef(2),
            customer_reference: ColumnRef(3),
            bank_reference: ColumnRef(4),
            debit: ColumnRef(5),
            credit: ColumnRef(6),
            details: ColumnRef(8),
        }
    }
}

pub(super) fn ledger_columns() -> SheetColumns {
    SheetColumns {
        header_rows: 2,
        date: ColumnRef(0),
        description: ColumnRef(2),
        debit: ColumnRef(5),
        credit: ColumnRef(6),
        details: Some(ColumnRef(7)),
        customer_reference: Some(ColumnRef(3)),
        bank_reference: Some(ColumnRef(4)),
        flag: Some(ColumnRef(8)),
        date_format: None,
    }
}

/// An amount cell either holds money, nothing, or a bank reference that the
/// export shifted one column right.
enum AmountCell {
    Amount(Option<i64>),
    Reference(String),
    Invalid(String),
}

fn read_amount(grid: &SourceGrid, row: usize, col: ColumnRef) -> AmountCell {
    match parse_amount(grid.cell(row, col.index())) {
        Ok(cents) => AmountCell::Amount(nonzero(cents)),
        Err(raw) if raw.contains('-') => AmountCell::Reference(raw),
        Err(raw) => AmountCell::Invalid(raw),
    }
}

/// Account number on a section line: the first word after the name's ` - `,
/// once the marker (which has its own ` - `) is cut out.
fn section_account<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let at = line.find(marker)?;
    let head = &line[..at];
    let (_, rest) = head.split_once(" - ")?;
    rest.split_whitespace().next()
}

impl BmoLayout {
    pub(super) fn parse(&self, grid: &SourceGrid, out: &mut Collector<'_>) -> Result<(), ReconError> {
        let Some(section) = self.find_section(grid) else {
            out.warn(format!(
                "no '{}' section for account {} in statement",
                self.section_marker, self.account
            ));
            return Ok(());
        };

        let date_col = self.columns.date.index();
        let header = (section + 1..grid.height().min(section + 1 + HEADER_SEARCH_ROWS))
            .find(|&r| grid.text(r, date_col).is_some_and(|t| t.eq_ignore_ascii_case("date")))
            .ok_or_else(|| ReconError::MissingColumn {
                account: out.account.to_string(),
                column: "Date".into(),
            })?;

        for row in header + 1..grid.height() {
            let Some(first) = grid.text(row, date_col) else {
                break;
            };
            if TERMINATORS.iter().any(|t| first.starts_with(t))
                || first.contains(&self.section_marker)
            {
                break;
            }
            self.parse_row(grid, row, out);
        }
        Ok(())
    }

    fn find_section(&self, grid: &SourceGrid) -> Option<usize> {
        (0..grid.height()).find(|&r| {
            grid.row(r).iter().any(|cell| {
                section_account(&cell.as_text(), &self.section_marker)
                    .is_some_and(|number| number.ends_with(self.account.as_str()))
            })
        })
    }

    fn parse_row(&self, grid: &SourceGrid, row: usize, out: &mut Collector<'_>) {
        let cols = &self.columns;
        let date_cell = grid.cell(row, cols.date.index());
        let Some(date) = parse_date(date_cell) else {
            out.skip(row, format!("unparseable date '{}'", date_cell.as_text()));
            return;
        };

        let mut record = out.record(
            row,
            date,
            grid.text(row, cols.description.index()).unwrap_or_default(),
        );
        record.customer_reference = grid.text(row, cols.customer_reference.index());
        record.bank_reference = grid.text(row, cols.bank_reference.index());
        record.details = grid.text(row, cols.details.index());

        for (col, is_debit) in [(cols.debit, true), (cols.credit, false)] {
            let cents = match read_amount(grid, row, col) {
                AmountCell::Amount(cents) => cents,
                AmountCell::Reference(reference) => {
                    if record.bank_reference.is_none() {
                        record.bank_reference = Some(reference);
                    }
                    None
                }
                AmountCell::Invalid(raw) => {
                    out.skip(row, format!("unparseable amount '{raw}' in column {col}"));
                    return;
                }
            };
            if is_debit {
                record.debit = cents;
            } else {
                record.credit = cents;
            }
        }

        out.push(record);
    }
}
