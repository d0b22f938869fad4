//! Optional classification rules for appended rows.
//!
//! A rule that matches fills its columns and spares the row the review
//! marker. First match wins.

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::cells::ColumnRef;
use crate::error::ReconError;
use crate::model::{Direction, TransactionRecord};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    /// Case-insensitive substring of the description.
    #[serde(default)]
    pub contains: Option<String>,
    /// Regex over the description.
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub direction: Option<Direction>,
    /// Lower bound on the amount magnitude, in currency units.
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// Ledger sheets the rule applies to; every sheet when empty.
    #[serde(default)]
    pub sheets: Vec<String>,
    /// Column letter -> text written when the rule matches.
    #[serde(default)]
    pub set: BTreeMap<String, String>,
}

#[derive(Debug)]
struct Rule {
    sheets: Vec<String>,
    contains: Option<String>,
    pattern: Option<Regex>,
    direction: Option<Direction>,
    min_cents: Option<i64>,
    max_cents: Option<i64>,
    set: Vec<(ColumnRef, String)>,
}

impl Rule {
    fn matches(&self, record: &TransactionRecord) -> bool {
        if !self.sheets.is_empty() && !self.sheets.contains(&record.source_account_key) {
            return false;
        }
        if let Some(needle) = &self.contains {
            if !record.description.to_lowercase().contains(needle) {
                return false;
            }
        }
        if let Some(re) = &self.pattern {
            if !re.is_match(&record.description) {
                return false;
            }
        }
        if let Some(dir) = self.direction {
            if record.direction() != Some(dir) {
                return false;
            }
        }
        let magnitude = record.net_cents().abs();
        if self.min_cents.is_some_and(|min| magnitude < min) {
            return false;
        }
        if self.max_cents.is_some_and(|max| magnitude > max) {
            return false;
        }
        true
    }
}

#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn compile(configs: &[RuleConfig]) -> Result<Self, ReconError> {
        let mut rules = Vec::with_capacity(configs.len());
        for (i, cfg) in configs.iter().enumerate() {
            let n = i + 1;
            if cfg.contains.is_none() && cfg.pattern.is_none() {
                return Err(ReconError::ConfigValidation(format!(
                    "rule {n}: needs 'contains' or 'pattern'"
                )));
            }
            if cfg.set.is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "rule {n}: 'set' must name at least one column"
                )));
            }
            let pattern = match &cfg.pattern {
                Some(p) => Some(
                    RegexBuilder::new(p)
                        .case_insensitive(true)
                        .build()
                        .map_err(|e| ReconError::ConfigValidation(format!("rule {n}: {e}")))?,
                ),
                None => None,
            };
            let mut set = Vec::with_capacity(cfg.set.len());
            for (letter, value) in &cfg.set {
                let col = ColumnRef::parse(letter).ok_or_else(|| {
                    ReconError::ConfigValidation(format!("rule {n}: invalid column '{letter}'"))
                })?;
                set.push((col, value.clone()));
            }
            let cents = |v: Option<f64>| v.map(|x| (x.abs() * 100.0).round() as i64);
            rules.push(Rule {
                sheets: cfg.sheets.clone(),
                contains: cfg.contains.as_ref().map(|s| s.to_lowercase()),
                pattern,
                direction: cfg.direction,
                min_cents: cents(cfg.min),
                max_cents: cents(cfg.max),
                set,
            });
        }
        Ok(Self { rules })
    }

    /// Column assignments of the first matching rule.
    pub fn classify(&self, record: &TransactionRecord) -> Option<&[(ColumnRef, String)]> {
        self.rules.iter().find(|r| r.matches(record)).map(|r| r.set.as_slice())
    }
}
