//! Typed cell values and the lenient date / amount readers shared by the
//! statement parsers and the ledger state reader.
//!
//! Both sides of the duplicate check go through the same readers, so a ledger
//! cell holding `4000` and a CSV field holding `"4,000.00"` land on the same
//! cent value.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

/// Days from 0001-01-01 (CE day 1) to the Excel epoch 1899-12-30.
const EXCEL_EPOCH_CE_DAYS: i32 = 693_594;

// ---------------------------------------------------------------------------
// Cell
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Bool(bool),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s)
        }
    }

    /// True for empty cells and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Cell rendered as display text. Whole numbers print without a fraction.
    pub fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => format_number(*n),
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
            Cell::Bool(b) => if *b { "TRUE".into() } else { "FALSE".into() },
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

// ---------------------------------------------------------------------------
// Column references
// ---------------------------------------------------------------------------

/// Zero-based column index, written in config as a spreadsheet letter ("A", "AB").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub struct ColumnRef(pub u16);

impl ColumnRef {
    pub fn parse(letters: &str) -> Option<Self> {
        let letters = letters.trim();
        if letters.is_empty() || letters.len() > 3 {
            return None;
        }
        let mut n: u32 = 0;
        for ch in letters.chars() {
            if !ch.is_ascii_alphabetic() {
                return None;
            }
            n = n * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        }
        // XFD is the last column Excel allows
        if n == 0 || n > 16_384 {
            return None;
        }
        Some(ColumnRef((n - 1) as u16))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<String> for ColumnRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ColumnRef::parse(&value).ok_or_else(|| format!("invalid column letter '{value}'"))
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut n = self.0 as u32 + 1;
        let mut letters = Vec::new();
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push((b'A' + rem as u8) as char);
            n = (n - 1) / 26;
        }
        let s: String = letters.iter().rev().collect();
        f.write_str(&s)
    }
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let mut days = serial.floor() as i32;
    // Serials below 61 sit before Excel's phantom 1900-02-29
    if days < 61 {
        days += 1;
    }
    NaiveDate::from_num_days_from_ce_opt(EXCEL_EPOCH_CE_DAYS + days)
}

pub fn date_to_excel_serial(date: NaiveDate) -> f64 {
    let mut days = date.num_days_from_ce() - EXCEL_EPOCH_CE_DAYS;
    if days < 61 {
        days -= 1;
    }
    days as f64
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%d %b %Y",
    "%Y.%m.%d",
];

/// Read a calendar date from a cell: native dates, Excel serials,
/// `YYYYMMDD` integers and the common text forms banks export.
pub fn parse_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Date(d) => Some(*d),
        Cell::Number(n) => {
            if n.fract() == 0.0 && (19_000_101.0..=29_991_231.0).contains(n) {
                compact_ymd(&format!("{}", *n as i64))
            } else if *n < 2_958_466.0 {
                excel_serial_to_date(*n)
            } else {
                None
            }
        }
        Cell::Text(s) => parse_date_str(s),
        Cell::Empty | Cell::Bool(_) => None,
    }
}

pub fn parse_date_str(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(d) = compact_ymd(s) {
        return Some(d);
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    // "2025-07-31 00:00:00" / "2025-07-31T00:00:00"
    let head = s.split([' ', 'T']).next().unwrap_or(s);
    if head.len() < s.len() {
        return parse_date_str(head);
    }
    None
}

fn compact_ymd(s: &str) -> Option<NaiveDate> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = s[0..4].parse().ok()?;
    let month = s[4..6].parse().ok()?;
    let day = s[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

// ---------------------------------------------------------------------------
// Amounts
// ---------------------------------------------------------------------------

/// Read a monetary cell as signed cents.
///
/// `Ok(None)` means the cell carries no amount (empty, whitespace, a lone
/// dash). `Err` carries the raw text of a cell that is not a number.
pub fn parse_amount(cell: &Cell) -> Result<Option<i64>, String> {
    match cell {
        Cell::Empty => Ok(None),
        Cell::Number(n) => to_cents(*n).map(Some).ok_or_else(|| format!("{n}")),
        Cell::Text(s) => parse_amount_str(s),
        Cell::Date(d) => Err(d.to_string()),
        Cell::Bool(b) => Err(b.to_string()),
    }
}

pub fn parse_amount_str(raw: &str) -> Result<Option<i64>, String> {
    let mut s: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' ' | '\u{a0}'))
        .collect();
    if s.is_empty() || s == "-" {
        return Ok(None);
    }
    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') {
        negative = true;
        s = s[1..s.len() - 1].to_string();
    }
    if let Some(rest) = s.strip_suffix('-') {
        negative = !negative;
        s = rest.to_string();
    }
    let value: f64 = s.parse().map_err(|_| raw.trim().to_string())?;
    let cents = to_cents(value).ok_or_else(|| raw.trim().to_string())?;
    Ok(Some(if negative { -cents } else { cents }))
}

fn to_cents(value: f64) -> Option<i64> {
    if !value.is_finite() || value.abs() > 9.0e15 {
        return None;
    }
    Some((value * 100.0).round() as i64)
}

/// Render cents as a plain decimal string ("1234.50").
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
