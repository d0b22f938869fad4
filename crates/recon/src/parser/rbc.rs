//! RBC business account export (`.csv`, sometimes re-saved as `.xlsx`).
//!
//! Dates are `YYYYMMDD`. Withdrawals and deposits have their own columns and
//! the narrative is spread over `Description 1` .. `Description 5`. Rows above
//! the first one carrying a `Balance` are still pending at the bank.

use serde::Deserialize;

use crate::cells::{parse_amount, parse_date, ColumnRef};
use crate::error::ReconError;
use crate::ledger::SheetColumns;

use super::{nonzero, row_has_header, Collector, HeaderMap, SourceGrid};

#[derive(Debug, Clone, Deserialize)]
pub struct RbcLayout {
    /// Trailing digits of `Account Number` to keep; all rows when unset.
    #[serde(default)]
    pub account: Option<String>,
    /// Joins the non-empty description columns.
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default)]
    pub headers: RbcHeaders,
}

impl Default for RbcLayout {
    fn default() -> Self {
        Self { account: None, separator: default_separator(), headers: RbcHeaders::default() }
    }
}

fn default_separator() -> String {
    " | ".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RbcHeaders {
    pub date: String,
    pub descriptions: Vec<String>,
    pub withdrawals: String,
    pub deposits: String,
    pub balance: String,
    pub account: String,
}

impl Default for RbcHeaders {
    fn default() -> Self {
        Self {
            date: "Date".into(),
            descriptions: (1..=5).map(|i| format!("Description {i}")).collect(),
            withdrawals: "Withdrawals".into(),
            deposits: "Deposits".into(),
            balance: "Balance".into(),
            account: "Account Number".into(),
        }
    }
}

pub(super) fn ledger_columns() -> SheetColumns {
    SheetColumns {
        header_rows: 1,
        date: ColumnRef(1),
        description: ColumnRef(0),
        debit: ColumnRef(3),
        credit: ColumnRef(4),
        details: None,
        customer_reference: Some(ColumnRef(2)),
        bank_reference: None,
        flag: Some(ColumnRef(6)),
        date_format: Some("%m/%d/%Y".into()),
    }
}

impl RbcLayout {
    pub(super) fn parse(&self, grid: &SourceGrid, out: &mut Collector<'_>) -> Result<(), ReconError> {
        let names = &self.headers;
        let header = (0..grid.height())
            .find(|&r| {
                row_has_header(grid.row(r), &names.date) && row_has_header(grid.row(r), &names.balance)
            })
            .ok_or_else(|| ReconError::MissingColumn {
                account: out.account.to_string(),
                column: names.balance.clone(),
            })?;

        let h = HeaderMap::from_row(grid.row(header));
        let date_col = h.require(&names.date, out.account)?;
        let withdrawals = h.require(&names.withdrawals, out.account)?;
        let deposits = h.require(&names.deposits, out.account)?;
        let balance = h.require(&names.balance, out.account)?;
        let descriptions: Vec<usize> = names.descriptions.iter().filter_map(|n| h.get(n)).collect();
        let account_col = match &self.account {
            Some(_) => Some(h.require(&names.account, out.account)?),
            None => None,
        };

        let mut settled = false;
        for row in header + 1..grid.height() {
            if grid.row_is_blank(row) {
                continue;
            }
            if let (Some(key), Some(col)) = (&self.account, account_col) {
                if !grid.text(row, col).unwrap_or_default().ends_with(key.as_str()) {
                    continue;
                }
            }
            if !settled {
                if grid.text(row, balance).is_none() {
                    log::debug!("{}: row {} is pending, ignored", out.account, row + 1);
                    continue;
                }
                settled = true;
            }

            let date_cell = grid.cell(row, date_col);
            let Some(date) = parse_date(date_cell) else {
                out.skip(row, format!("unparseable date '{}'", date_cell.as_text()));
                continue;
            };

            let parts: Vec<String> = descriptions.iter().filter_map(|&c| grid.text(row, c)).collect();
            let mut record = out.record(row, date, parts.join(&self.separator));
            record.customer_reference = descriptions
                .get(1)
                .and_then(|&c| grid.text(row, c))
                .filter(|s| s.chars().any(|ch| ch.is_ascii_digit() || ch == '-'));

            match (
                parse_amount(grid.cell(row, withdrawals)),
                parse_amount(grid.cell(row, deposits)),
            ) {
                (Ok(debit), Ok(credit)) => {
                    record.debit = nonzero(debit);
                    record.credit = nonzero(credit);
                }
                (Err(raw), _) | (_, Err(raw)) => {
                    out.skip(row, format!("unparseable amount '{raw}'"));
                    continue;
                }
            }
            out.push(record);
        }
        Ok(())
    }
}
