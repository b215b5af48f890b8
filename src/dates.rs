//! Date normalization for spreadsheet cells
//!
//! Source sheets carry dates in whatever shape the user typed or exported:
//! real date cells, bare Excel serial numbers, or text in ISO, Brazilian
//! (`DD/MM/YYYY`) or US (`MM/DD/YYYY`) layouts. Everything is reduced here to
//! a `NaiveDate` inside the accepted range 1900..=2100.
//!
//! Also hosts the month arithmetic shared by the period detector and the
//! depreciation allocator: the report axis has monthly granularity, so dates
//! are compared after truncation to the first day of their month.

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;

use crate::workbook::CellValue;

/// Numeric cells above this many days are rejected before conversion
pub const MAX_SERIAL_DAYS: f64 = 1_000_000.0;

pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;

/// Text layouts accepted for date cells, tried in order; first match wins
const TEXT_FORMATS: &[TextFormat] = &[
    TextFormat::Date("%Y-%m-%d"),
    TextFormat::Date("%d/%m/%Y"),
    TextFormat::Date("%m/%d/%Y"),
    TextFormat::DateTime("%Y-%m-%d %H:%M:%S"),
    TextFormat::Date("%d-%m-%Y"),
    TextFormat::Date("%m-%d-%Y"),
];

#[derive(Debug, Clone, Copy)]
enum TextFormat {
    Date(&'static str),
    DateTime(&'static str),
}

impl TextFormat {
    fn parse(self, text: &str) -> Option<NaiveDate> {
        match self {
            TextFormat::Date(fmt) => NaiveDate::parse_from_str(text, fmt).ok(),
            TextFormat::DateTime(fmt) => NaiveDateTime::parse_from_str(text, fmt)
                .ok()
                .map(|dt| dt.date()),
        }
    }
}

/// A date cell as found in a source sheet, before normalization
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawDateValue {
    Native(NaiveDateTime),
    Number(f64),
    Text(String),
    /// Any other cell content (booleans, error literals)
    Unsupported(String),
    Absent,
}

impl RawDateValue {
    /// True when the cell should be skipped without being reported
    pub fn is_empty(&self) -> bool {
        match self {
            RawDateValue::Absent => true,
            RawDateValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }
}

impl From<Option<&CellValue>> for RawDateValue {
    fn from(value: Option<&CellValue>) -> Self {
        match value {
            None => RawDateValue::Absent,
            Some(CellValue::Date(dt)) => RawDateValue::Native(*dt),
            Some(CellValue::Number(n)) => RawDateValue::Number(*n),
            Some(CellValue::Text(s)) => RawDateValue::Text(s.clone()),
            // Unevaluated formulas reach the normalizer as their source text
            Some(CellValue::Formula(f)) => RawDateValue::Text(f.clone()),
            Some(CellValue::Bool(b)) => RawDateValue::Unsupported(b.to_string().to_uppercase()),
            Some(CellValue::Error(e)) => RawDateValue::Unsupported(e.clone()),
        }
    }
}

impl fmt::Display for RawDateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawDateValue::Native(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            RawDateValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            RawDateValue::Number(n) => write!(f, "{}", n),
            RawDateValue::Text(s) | RawDateValue::Unsupported(s) => write!(f, "{}", s),
            RawDateValue::Absent => write!(f, ""),
        }
    }
}

/// Normalize a raw cell into a valid calendar date
pub fn normalize(raw: &RawDateValue) -> Option<NaiveDate> {
    let date = match raw {
        RawDateValue::Native(dt) => dt.date(),
        RawDateValue::Number(n) => {
            if !n.is_finite() || *n < 0.0 || *n > MAX_SERIAL_DAYS {
                return None;
            }
            from_serial(*n)?
        }
        RawDateValue::Text(s) => parse_text(s)?,
        RawDateValue::Unsupported(_) | RawDateValue::Absent => return None,
    };

    is_valid_date(&date).then_some(date)
}

/// Try every accepted text layout on the trimmed string
pub fn parse_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    TEXT_FORMATS.iter().find_map(|fmt| fmt.parse(text))
}

/// Range check on top of chrono's calendar validity
///
/// Month bounds and leap-year day counts are already guaranteed by
/// `NaiveDate`; what remains is the accepted year window.
pub fn is_valid_date(date: &NaiveDate) -> bool {
    (MIN_YEAR..=MAX_YEAR).contains(&date.year())
}

/// Spreadsheet epoch: serial day 0 is 1899-12-30
pub fn excel_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or(NaiveDate::MIN)
}

/// Convert a day count since the epoch to a date (fractional part dropped)
pub fn from_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() {
        return None;
    }
    let days = serial.trunc();
    if days.abs() > i64::MAX as f64 {
        return None;
    }
    excel_epoch().checked_add_signed(Duration::try_days(days as i64)?)
}

/// Day count since the epoch
pub fn to_serial(date: NaiveDate) -> i64 {
    (date - excel_epoch()).num_days()
}

/// ISO 8601 date or date-time text as produced by some xlsx writers
pub fn parse_iso_datetime(text: &str) -> Option<NaiveDateTime> {
    text.parse::<NaiveDateTime>()
        .ok()
        .or_else(|| text.parse::<NaiveDate>().ok()?.and_hms_opt(0, 0, 0))
}

/// First day of the date's month
pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Add whole months to the first day of `date`'s month
///
/// Saturates at `NaiveDate::MAX` instead of overflowing.
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    first_of_month(date)
        .checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

/// Position of the date's month on a continuous monthly axis
pub fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

/// Inclusive month span between two dates (`Jan..=Mar` is 3)
pub fn months_between_inclusive(first: NaiveDate, last: NaiveDate) -> i64 {
    month_index(last) - month_index(first) + 1
}
