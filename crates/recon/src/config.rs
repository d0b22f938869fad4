use std::collections::HashSet;

use serde::Deserialize;

use crate::error::ReconError;
use crate::ledger::SheetColumns;
use crate::parser::BankLayout;
use crate::rules::{RuleConfig, RuleSet};
use crate::window::TargetMonth;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    #[serde(default)]
    pub name: String,
    /// Ledger template workbook, relative to the config file.
    pub ledger: String,
    /// Folder holding the month's bank exports. `{month}` expands to `YYYY-MM`.
    pub source_dir: String,
    pub output_dir: String,
    #[serde(default = "default_review_marker")]
    pub review_marker: String,
    /// Start each account's window at its ledger's last date instead of the
    /// first of the month.
    #[serde(default)]
    pub forward_only: bool,
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

fn default_review_marker() -> String {
    "PENDING REVIEW".into()
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Ledger sheet name; also the account key records carry.
    pub sheet: String,
    /// Short code used in reports. Defaults to the sheet name.
    #[serde(default)]
    pub code: Option<String>,
    /// Organisational unit tag, reporting only.
    #[serde(default)]
    pub unit: Option<String>,
    /// Glob for the statement file inside the source folder.
    pub source: String,
    pub layout: BankLayout,
    /// Ledger columns; the bank's default layout when omitted.
    #[serde(default)]
    pub ledger: Option<SheetColumns>,
}

impl AccountConfig {
    pub fn code(&self) -> &str {
        self.code.as_deref().unwrap_or(&self.sheet)
    }

    pub fn sheet_columns(&self) -> SheetColumns {
        self.ledger
            .clone()
            .unwrap_or_else(|| self.layout.default_sheet_columns())
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.accounts.is_empty() {
            return Err(ReconError::ConfigValidation(
                "at least one [[accounts]] entry is required".into(),
            ));
        }
        if self.review_marker.trim().is_empty() {
            return Err(ReconError::ConfigValidation("review_marker must not be empty".into()));
        }

        let mut sheets = HashSet::new();
        let mut codes = HashSet::new();
        for account in &self.accounts {
            let sheet = account.sheet.as_str();
            if sheet.trim().is_empty() {
                return Err(ReconError::ConfigValidation("account with empty sheet name".into()));
            }
            if !sheets.insert(sheet) {
                return Err(ReconError::ConfigValidation(format!(
                    "sheet '{sheet}' is configured twice"
                )));
            }
            if !codes.insert(account.code()) {
                return Err(ReconError::ConfigValidation(format!(
                    "account '{sheet}': code '{}' is already used",
                    account.code()
                )));
            }
            if account.source.trim().is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "account '{sheet}': source pattern is empty"
                )));
            }
            if account.layout.split_key().is_some_and(|k| k.trim().is_empty()) {
                return Err(ReconError::ConfigValidation(format!(
                    "account '{sheet}': {} account key is empty",
                    account.layout.brand()
                )));
            }

            let cols = account.sheet_columns();
            let core = [cols.date, cols.description, cols.debit, cols.credit];
            let distinct: HashSet<_> = core.iter().collect();
            if distinct.len() != core.len() {
                return Err(ReconError::ConfigValidation(format!(
                    "account '{sheet}': date, description, debit and credit need distinct columns"
                )));
            }
            if let Some(flag) = cols.flag {
                if core.contains(&flag) {
                    return Err(ReconError::ConfigValidation(format!(
                        "account '{sheet}': flag column {flag} overlaps a data column"
                    )));
                }
            }
        }

        RuleSet::compile(&self.rules)?;
        Ok(())
    }

    pub fn source_dir_for(&self, month: &TargetMonth) -> String {
        expand_month(&self.source_dir, month)
    }

    pub fn output_dir_for(&self, month: &TargetMonth) -> String {
        expand_month(&self.output_dir, month)
    }
}

fn expand_month(template: &str, month: &TargetMonth) -> String {
    template.replace("{month}", &month.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
