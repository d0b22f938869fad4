use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};

/// The calendar month a run reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetMonth {
    first: NaiveDate,
}

impl TargetMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|first| Self { first })
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first
    }

    pub fn last_day(&self) -> NaiveDate {
        let (y, m) = if self.first.month() == 12 {
            (self.first.year() + 1, 1)
        } else {
            (self.first.year(), self.first.month() + 1)
        };
        NaiveDate::from_ymd_opt(y, m, 1)
            .and_then(|next| next.pred_opt())
            .unwrap_or(self.first)
    }

    pub fn window(&self) -> DateWindow {
        DateWindow { start: self.first_day(), end: self.last_day() }
    }
}

/// Accepts `YYYY-MM`, and `YYYY-MM-DD` (the day is ignored).
impl FromStr for TargetMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bad = || format!("invalid target month '{s}' (expected YYYY-MM)");
        let mut parts = s.split('-');
        let year: i32 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
        let month: u32 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
        if let Some(day) = parts.next() {
            let day: u32 = day.parse().map_err(|_| bad())?;
            NaiveDate::from_ymd_opt(year, month, day).ok_or_else(bad)?;
        }
        if parts.next().is_some() {
            return Err(bad());
        }
        TargetMonth::new(year, month).ok_or_else(bad)
    }
}

impl fmt::Display for TargetMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.first.year(), self.first.month())
    }
}

/// Inclusive date range a parser keeps records from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Move the start forward to `date` when it is later.
    pub fn starting_no_earlier_than(self, date: Option<NaiveDate>) -> Self {
        match date {
            Some(d) if d > self.start => Self { start: d, end: self.end },
            _ => self,
        }
    }
}
