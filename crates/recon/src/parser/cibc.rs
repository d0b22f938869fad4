//! CIBC transaction detail export (`.csv`).
//!
//! Dates are `M/D/YYYY` text. Direction comes from the `Transaction type`
//! column, or from a `Debit transactions` / `Credit transactions` section line
//! when the export groups rows instead. Several accounts can share one file,
//! told apart by the `Account number` column.

use serde::Deserialize;

use crate::cells::{parse_amount, parse_date, ColumnRef};
use crate::error::ReconError;
use crate::ledger::SheetColumns;
use crate::model::Direction;

use super::{nonzero, row_has_header, Collector, HeaderMap, SourceGrid};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CibcLayout {
    /// Trailing digits of `Account number` to keep; all rows when unset.
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub headers: CibcHeaders,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CibcHeaders {
    pub date: String,
    pub kind: String,
    pub description: String,
    pub details: String,
    pub amount: String,
    pub bank_reference: String,
    pub customer_reference: String,
    pub account: String,
}

impl Default for CibcHeaders {
    fn default() -> Self {
        Self {
            date: "Ledger date".into(),
            kind: "Transaction type".into(),
            description: "Description".into(),
            details: "ADDITIONAL DETAILS".into(),
            amount: "Amount".into(),
            bank_reference: "Bank reference".into(),
            customer_reference: "Client reference".into(),
            account: "Account number".into(),
        }
    }
}

pub(super) fn ledger_columns() -> SheetColumns {
    SheetColumns {
        header_rows: 1,
        date: ColumnRef(0),
        description: ColumnRef(1),
        debit: ColumnRef(2),
        credit: ColumnRef(3),
        details: None,
        customer_reference: None,
        bank_reference: None,
        flag: Some(ColumnRef(5)),
        date_format: None,
    }
}

/// Resolved column positions for the current header row.
struct Columns {
    date: usize,
    kind: Option<usize>,
    description: usize,
    details: Option<usize>,
    amount: usize,
    bank_reference: Option<usize>,
    customer_reference: Option<usize>,
    account: Option<usize>,
}

fn section_direction(grid: &SourceGrid, row: usize) -> Option<Direction> {
    let mut texts = grid.row(row).iter().filter(|c| !c.is_blank()).map(|c| c.as_text());
    let only = texts.next()?;
    if texts.next().is_some() {
        return None;
    }
    direction_of(&only)
}

fn direction_of(text: &str) -> Option<Direction> {
    let t = text.trim().to_lowercase();
    if t == "d" || t == "dr" || t.starts_with("debit") {
        Some(Direction::Debit)
    } else if t == "c" || t == "cr" || t.starts_with("credit") {
        Some(Direction::Credit)
    } else {
        None
    }
}

impl CibcLayout {
    pub(super) fn parse(&self, grid: &SourceGrid, out: &mut Collector<'_>) -> Result<(), ReconError> {
        let mut columns: Option<Columns> = None;
        let mut section: Option<Direction> = None;

        for row in 0..grid.height() {
            if grid.row_is_blank(row) {
                continue;
            }
            if row_has_header(grid.row(row), &self.headers.date) {
                columns = Some(self.resolve(grid, row, out.account)?);
                continue;
            }
            if let Some(dir) = section_direction(grid, row) {
                section = Some(dir);
                continue;
            }
            let Some(cols) = &columns else {
                continue;
            };
            self.parse_row(grid, row, cols, section, out);
        }

        if columns.is_none() {
            return Err(ReconError::MissingColumn {
                account: out.account.to_string(),
                column: self.headers.date.clone(),
            });
        }
        Ok(())
    }

    fn resolve(&self, grid: &SourceGrid, row: usize, account: &str) -> Result<Columns, ReconError> {
        let h = HeaderMap::from_row(grid.row(row));
        let names = &self.headers;
        let account_col = match &self.account {
            Some(_) => Some(h.require(&names.account, account)?),
            None => None,
        };
        Ok(Columns {
            date: h.require(&names.date, account)?,
            kind: h.get(&names.kind),
            description: h.require(&names.description, account)?,
            details: h.get(&names.details),
            amount: h.require(&names.amount, account)?,
            bank_reference: h.get(&names.bank_reference),
            customer_reference: h.get(&names.customer_reference),
            account: account_col,
        })
    }

    fn parse_row(
        &self,
        grid: &SourceGrid,
        row: usize,
        cols: &Columns,
        section: Option<Direction>,
        out: &mut Collector<'_>,
    ) {
        if let (Some(key), Some(col)) = (&self.account, cols.account) {
            let number = grid.text(row, col).unwrap_or_default();
            if !number.ends_with(key.as_str()) {
                return;
            }
        }

        let date_cell = grid.cell(row, cols.date);
        let Some(date) = parse_date(date_cell) else {
            out.skip(row, format!("unparseable date '{}'", date_cell.as_text()));
            return;
        };

        let amount = match parse_amount(grid.cell(row, cols.amount)) {
            Ok(cents) => cents,
            Err(raw) => {
                out.skip(row, format!("unparseable amount '{raw}'"));
                return;
            }
        };

        let declared = cols
            .kind
            .and_then(|c| grid.text(row, c))
            .and_then(|t| direction_of(&t))
            .or(section);
        let direction = match (declared, amount) {
            (Some(dir), _) => dir,
            (None, Some(cents)) if cents < 0 => Direction::Debit,
            (None, _) => Direction::Credit,
        };

        let description = [Some(cols.description), cols.details]
            .into_iter()
            .flatten()
            .filter_map(|c| grid.text(row, c))
            .collect::<Vec<_>>()
            .join(" ");
        let description = description.split_whitespace().collect::<Vec<_>>().join(" ");

        let mut record = out.record(row, date, description);
        record.bank_reference = cols.bank_reference.and_then(|c| grid.text(row, c));
        record.customer_reference = cols.customer_reference.and_then(|c| grid.text(row, c));
        match direction {
            Direction::Debit => record.debit = nonzero(amount),
            Direction::Credit => record.credit = nonzero(amount),
        }
        out.push(record);
    }
}
