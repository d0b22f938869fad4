//! `ledgersync-recon`: bank statement reconciliation and ledger merge engine.
//!
//! Pure engine crate: parses pre-loaded statement grids, decides which
//! transactions are new against a ledger sheet, and appends them through the
//! [`ledger::LedgerDocument`] trait. No file IO.

pub mod canon;
pub mod cells;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod model;
pub mod parser;
pub mod rules;
pub mod window;

pub use config::{AccountConfig, ReconConfig};
pub use engine::{run, StatementSource};
pub use error::ReconError;
pub use ledger::{LedgerDocument, LedgerSheet, SheetColumns};
pub use model::{AccountOutcome, AccountStatus, MergeResult, RunReport, TransactionRecord};
pub use parser::{BankLayout, SourceGrid};
pub use window::TargetMonth;
