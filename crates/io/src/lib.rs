// File I/O: bank exports in, ledger workbook in and out

pub mod csv;
pub mod excel;
pub mod pipeline;
pub mod source;
pub mod xlsx_ledger;
pub mod xlsx_sheet;

pub use pipeline::{load_config, reconcile_month, RunOptions, RunOutcome};
pub use source::FileStatementSource;
pub use xlsx_ledger::XlsxLedger;
