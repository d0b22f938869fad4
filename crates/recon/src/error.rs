use std::fmt;

#[derive(Debug, Clone)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (duplicate sheet, bad column, empty rule, etc.).
    ConfigValidation(String),
    /// No source file matched the account's pattern.
    SourceMissing { account: String, pattern: String },
    /// Source file exists but could not be read as a grid.
    SourceUnreadable { path: String, reason: String },
    /// Required header not found in a source file.
    MissingColumn { account: String, column: String },
    /// Ledger workbook has no sheet with this name.
    SheetNotFound(String),
    /// Ledger workbook could not be opened or its XML is malformed.
    LedgerUnreadable(String),
    /// Output path is locked or not writable.
    OutputLocked { path: String, reason: String },
    /// IO error (file read, etc.).
    Io(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::SourceMissing { account, pattern } => {
                write!(f, "account '{account}': no source file matches '{pattern}'")
            }
            Self::SourceUnreadable { path, reason } => {
                write!(f, "cannot read source '{path}': {reason}")
            }
            Self::MissingColumn { account, column } => {
                write!(f, "account '{account}': missing column '{column}'")
            }
            Self::SheetNotFound(sheet) => write!(f, "ledger has no sheet named '{sheet}'"),
            Self::LedgerUnreadable(msg) => write!(f, "cannot read ledger: {msg}"),
            Self::OutputLocked { path, reason } => {
                write!(f, "cannot write output '{path}': {reason}")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}
