//! Locating and loading statement files on disk.

use std::path::{Path, PathBuf};

use ledgersync_recon::{AccountConfig, ReconError, SourceGrid, StatementSource};

/// Statement files inside one month's source folder.
pub struct FileStatementSource {
    dir: PathBuf,
}

impl FileStatementSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl StatementSource for FileStatementSource {
    /// Last match in sorted order, ignoring Office lock files (`~$name`).
    fn locate(&self, account: &AccountConfig) -> Result<PathBuf, ReconError> {
        let missing = || ReconError::SourceMissing {
            account: account.sheet.clone(),
            pattern: self.dir.join(&account.source).display().to_string(),
        };

        let escaped = glob::Pattern::escape(&self.dir.to_string_lossy());
        let pattern = format!("{}/{}", escaped.trim_end_matches('/'), account.source);
        let entries = glob::glob(&pattern).map_err(|e| {
            ReconError::ConfigValidation(format!(
                "account '{}': bad source pattern '{}': {e}",
                account.sheet, account.source
            ))
        })?;

        let mut matches: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .filter(|p| {
                !p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("~$"))
            })
            .collect();
        matches.sort();

        if matches.len() > 1 {
            log::warn!(
                "{}: {} files match '{}', using the last",
                account.sheet,
                matches.len(),
                account.source
            );
        }
        matches.pop().ok_or_else(missing)
    }

    fn load(&self, path: &Path) -> Result<SourceGrid, ReconError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let loaded = match ext.as_str() {
            "csv" | "txt" => crate::csv::load_grid(path),
            "xls" | "xlsx" | "xlsm" | "xlsb" | "ods" => crate::excel::load_grid(path),
            other => Err(format!("unsupported statement format '.{other}'")),
        };
        loaded.map_err(|reason| ReconError::SourceUnreadable {
            path: path.display().to_string(),
            reason,
        })
    }
}
