//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: month-end scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Code | Domain    | Description                                    |
//! |------|-----------|------------------------------------------------|
//! | 0    | Universal | Success                                        |
//! | 1    | Universal | General error (unspecified)                    |
//! | 2    | Universal | CLI usage error (bad args, bad target date)    |
//! | 3    | config    | Configuration unreadable or invalid            |
//! | 4    | run       | One or more accounts failed                    |
//! | 5    | ledger    | Ledger template missing or unreadable          |
//! | 6    | output    | Output workbook locked or unwritable           |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant below
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `exit_code_for`

use ledgersync_recon::ReconError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - every account reconciled and the workbook was written.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Run (3-6)
// =============================================================================

/// Config file could not be read, parsed or validated.
pub const EXIT_CONFIG_INVALID: u8 = 3;

/// At least one account failed. The others were still merged and saved.
pub const EXIT_ACCOUNTS_FAILED: u8 = 4;

/// Ledger template missing or not a readable xlsx workbook.
pub const EXIT_LEDGER_UNREADABLE: u8 = 5;

/// Output workbook could not be written (locked by another program,
/// permission denied, disk error). Nothing partial is left behind.
pub const EXIT_OUTPUT_LOCKED: u8 = 6;

/// Exit code for a run-level error.
pub fn exit_code_for(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_CONFIG_INVALID,
        ReconError::LedgerUnreadable(_) => EXIT_LEDGER_UNREADABLE,
        ReconError::OutputLocked { .. } | ReconError::Io(_) => EXIT_OUTPUT_LOCKED,
        ReconError::SourceMissing { .. }
        | ReconError::SourceUnreadable { .. }
        | ReconError::MissingColumn { .. }
        | ReconError::SheetNotFound(_) => EXIT_ACCOUNTS_FAILED,
    }
}
