//! Report period detection
//!
//! The report's monthly axis spans every valid date found in the designated
//! date column of each source sheet. Cells that hold something but cannot be
//! read as a date are collected as [`InvalidDateRecord`]s in the same pass and
//! surfaced to the user at the end of the run.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use crate::dates::{self, RawDateValue};
use crate::error::DreError;
use crate::workbook::Workbook;

/// Default period used when no valid date exists anywhere
const FALLBACK_YEAR: i32 = 2024;
const FALLBACK_MONTH: u32 = 1;
const FALLBACK_MONTH_COUNT: u32 = 12;

/// A sheet column holding transaction dates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateSource {
    pub sheet: &'static str,
    /// 1-based column number
    pub column: u16,
}

/// Date columns scanned for period detection: `Vendas!F`, `Custo_Despesas!C`, `Folha!A`
pub const DATE_SOURCES: &[DateSource] = &[
    DateSource {
        sheet: "Vendas",
        column: 6,
    },
    DateSource {
        sheet: "Custo_Despesas",
        column: 3,
    },
    DateSource {
        sheet: "Folha",
        column: 1,
    },
];

/// Monthly window covered by the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportPeriod {
    start: NaiveDate,
    month_count: u32,
}

impl ReportPeriod {
    /// Period starting at the month of `start`; `month_count` is clamped to at least 1
    pub fn new(start: NaiveDate, month_count: u32) -> Self {
        Self {
            start: dates::first_of_month(start),
            month_count: month_count.max(1),
        }
    }

    /// Inclusive window from the month of `first` to the month of `last`
    pub fn from_bounds(first: NaiveDate, last: NaiveDate) -> Result<Self, DreError> {
        let span = dates::months_between_inclusive(first, last);
        if span < 1 {
            return Err(DreError::InvalidPeriod(format!(
                "end {} is before start {}",
                last.format("%m/%y"),
                first.format("%m/%y")
            )));
        }
        let month_count = u32::try_from(span)
            .map_err(|_| DreError::InvalidPeriod(format!("{} months is too long", span)))?;
        Ok(Self::new(first, month_count))
    }

    /// Explicit period from `MM/YY` start and end strings
    pub fn from_month_year(start: &str, end: &str) -> Result<Self, DreError> {
        let first = parse_month_year(start)?;
        let last = parse_month_year(end)?;
        Self::from_bounds(first, last)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn month_count(&self) -> u32 {
        self.month_count
    }

    /// First day of the `index`-th month (0-based)
    pub fn month(&self, index: u32) -> NaiveDate {
        dates::add_months(self.start, index)
    }

    pub fn months(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        (0..self.month_count).map(move |i| self.month(i))
    }

    /// First day of the last month covered
    pub fn end_month(&self) -> NaiveDate {
        self.month(self.month_count - 1)
    }
}

impl Default for ReportPeriod {
    fn default() -> Self {
        let start = NaiveDate::from_ymd_opt(FALLBACK_YEAR, FALLBACK_MONTH, 1)
            .unwrap_or(NaiveDate::MIN);
        Self::new(start, FALLBACK_MONTH_COUNT)
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {} ({} months)",
            self.start.format("%m/%Y"),
            self.end_month().format("%m/%Y"),
            self.month_count
        )
    }
}

/// Parse `MM/YY` into the first day of that month
///
/// Two-digit years `00..=68` map to 20xx and `69..=99` to 19xx.
pub fn parse_month_year(value: &str) -> Result<NaiveDate, DreError> {
    let format_error = || DreError::PeriodFormat {
        value: value.to_string(),
    };

    let (month, year) = value.trim().split_once('/').ok_or_else(format_error)?;
    if month.is_empty() || month.len() > 2 || year.len() != 2 {
        return Err(format_error());
    }
    let month: u32 = month.parse().map_err(|_| format_error())?;
    let year: i32 = year.parse().map_err(|_| format_error())?;
    let year = if year <= 68 { 2000 + year } else { 1900 + year };

    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(format_error)
}

/// How the report period was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodSource {
    Detected,
    Fallback,
    Explicit,
}

impl fmt::Display for PeriodSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PeriodSource::Detected => "detected",
            PeriodSource::Fallback => "fallback",
            PeriodSource::Explicit => "explicit",
        };
        f.write_str(text)
    }
}

/// A non-empty date cell that could not be normalized
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidDateRecord {
    pub sheet: String,
    /// 1-based row number
    pub row: u32,
    pub value: RawDateValue,
}

/// Outcome of one pass over the date columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DateScan {
    pub dates: Vec<NaiveDate>,
    pub invalid: Vec<InvalidDateRecord>,
}

impl DateScan {
    /// Derive the report period from the valid dates, falling back to the
    /// default period when there are none
    pub fn detect_period(&self) -> (ReportPeriod, PeriodSource) {
        let (Some(first), Some(last)) = (self.dates.iter().min(), self.dates.iter().max()) else {
            warn!(
                "No valid dates found in source sheets, using default period {}",
                ReportPeriod::default()
            );
            return (ReportPeriod::default(), PeriodSource::Fallback);
        };

        match ReportPeriod::from_bounds(*first, *last) {
            Ok(period) => {
                info!("Detected period: {}", period);
                (period, PeriodSource::Detected)
            }
            Err(e) => {
                warn!("{}, using default period", e);
                (ReportPeriod::default(), PeriodSource::Fallback)
            }
        }
    }
}

/// Scan every source column once, collecting valid dates and invalid cells
///
/// Sheets that do not exist are skipped; empty cells are ignored.
pub fn scan_dates(workbook: &Workbook, sources: &[DateSource]) -> DateScan {
    let mut scan = DateScan::default();

    for source in sources {
        let Some(sheet) = workbook.sheet(source.sheet) else {
            debug!("Date source '{}' not present, skipping", source.sheet);
            continue;
        };

        let mut found = 0usize;
        for row in 2..=sheet.max_row() {
            let raw = RawDateValue::from(sheet.value(row, source.column));
            if raw.is_empty() {
                continue;
            }

            match dates::normalize(&raw).filter(dates::is_valid_date) {
                Some(date) => {
                    scan.dates.push(date);
                    found += 1;
                }
                None => scan.invalid.push(InvalidDateRecord {
                    sheet: source.sheet.to_string(),
                    row,
                    value: raw,
                }),
            }
        }
        debug!("Sheet '{}': {} valid date(s)", source.sheet, found);
    }

    if !scan.invalid.is_empty() {
        warn!("{} invalid date cell(s) found", scan.invalid.len());
    }
    scan
}

/// Detect the report period over the standard date sources
pub fn detect(workbook: &Workbook) -> (ReportPeriod, Vec<InvalidDateRecord>) {
    let scan = scan_dates(workbook, DATE_SOURCES);
    let (period, _) = scan.detect_period();
    (period, scan.invalid)
}
