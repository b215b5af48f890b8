//! Straight-line depreciation of investments over the report period
//!
//! Each investment starts depreciating in the month after it was made and
//! keeps a constant monthly charge for `useful_life_years * 12` months. The
//! schedule is laid out on the report's monthly axis so that column `i` of
//! every asset lines up with column `i` of the `DRE` sheet.

pub mod waterfall;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::config::UsefulLifeTable;
use crate::dates::{self, RawDateValue};
use crate::period::ReportPeriod;
use crate::workbook::{CellValue, Sheet};

pub use waterfall::write_waterfall;

/// Name of the sheet holding investments
pub const INVESTMENTS_SHEET: &str = "Investimentos";

/// One investment line read from the `Investimentos` sheet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvestmentRecord {
    /// 1-based source row
    pub row: u32,
    pub date: NaiveDate,
    pub description: String,
    pub value: Decimal,
    pub useful_life_years: u32,
}

impl InvestmentRecord {
    pub fn window(&self) -> DepreciationWindow {
        DepreciationWindow::for_investment(self.date, self.useful_life_years)
    }

    /// Constant monthly charge: value / (years * 12)
    pub fn monthly_amount(&self) -> Decimal {
        monthly_amount(self.value, self.useful_life_years)
    }
}

/// Months during which an asset depreciates, closed-open on the monthly axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DepreciationWindow {
    /// First day of the first depreciating month
    pub start: NaiveDate,
    /// First day of the first month past the window
    pub end: NaiveDate,
}

impl DepreciationWindow {
    pub fn for_investment(date: NaiveDate, useful_life_years: u32) -> Self {
        let start = dates::add_months(date, 1);
        let end = dates::add_months(start, useful_life_years.saturating_mul(12));
        Self { start, end }
    }

    /// True when `month`'s month lies in `[start, end)`; the day is ignored
    pub fn contains(&self, month: NaiveDate) -> bool {
        let m = dates::month_index(month);
        dates::month_index(self.start) <= m && m < dates::month_index(self.end)
    }
}

pub fn monthly_amount(value: Decimal, useful_life_years: u32) -> Decimal {
    let months = Decimal::from(useful_life_years.max(1)) * Decimal::from(12);
    value / months
}

/// Per-month charges of one asset, one entry per report column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetSchedule {
    pub investment: InvestmentRecord,
    pub window: DepreciationWindow,
    pub monthly: Decimal,
    pub amounts: Vec<Decimal>,
}

/// Depreciation of every asset over the report period plus column totals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepreciationSchedule {
    pub period: ReportPeriod,
    pub assets: Vec<AssetSchedule>,
    pub totals: Vec<Decimal>,
}

impl DepreciationSchedule {
    /// Sum of every charge inside the report period
    pub fn grand_total(&self) -> Decimal {
        self.totals.iter().copied().sum()
    }
}

/// Lay out every investment's depreciation on the report's monthly axis
pub fn allocate(investments: &[InvestmentRecord], period: &ReportPeriod) -> DepreciationSchedule {
    let months: Vec<NaiveDate> = period.months().collect();
    let mut totals = vec![Decimal::ZERO; months.len()];

    let assets: Vec<AssetSchedule> = investments
        .iter()
        .map(|investment| {
            let window = investment.window();
            let monthly = investment.monthly_amount();
            let amounts: Vec<Decimal> = months
                .iter()
                .map(|m| {
                    if window.contains(*m) {
                        monthly
                    } else {
                        Decimal::ZERO
                    }
                })
                .collect();

            for (total, amount) in totals.iter_mut().zip(&amounts) {
                *total += *amount;
            }

            debug!(
                "{} (row {}): {} per month from {} until {}",
                investment.description,
                investment.row,
                monthly.round_dp(2),
                window.start.format("%m/%Y"),
                window.end.format("%m/%Y")
            );

            AssetSchedule {
                investment: investment.clone(),
                window,
                monthly,
                amounts,
            }
        })
        .collect();

    DepreciationSchedule {
        period: *period,
        assets,
        totals,
    }
}

/// Read investments from rows 2.. until the first empty date cell
///
/// A row is kept when column A holds a valid date, B a description and C a
/// non-zero value; anything else is skipped with a warning.
pub fn read_investments(sheet: &Sheet, lives: &UsefulLifeTable) -> Vec<InvestmentRecord> {
    let mut investments = Vec::new();

    let mut row = 2;
    while sheet.has_value(row, 1) {
        match parse_investment(sheet, row, lives) {
            Some(investment) => investments.push(investment),
            None => warn!("Investimentos row {} skipped: incomplete investment", row),
        }
        row += 1;
    }

    info!("{} investment(s) read", investments.len());
    investments
}

fn parse_investment(sheet: &Sheet, row: u32, lives: &UsefulLifeTable) -> Option<InvestmentRecord> {
    let date = dates::normalize(&RawDateValue::from(sheet.value(row, 1)))?;

    let description = match sheet.value(row, 2)? {
        CellValue::Text(s) if !s.trim().is_empty() => s.clone(),
        CellValue::Number(n) => n.to_string(),
        _ => return None,
    };

    let value = match sheet.value(row, 3)? {
        CellValue::Number(n) => Decimal::try_from(*n).ok()?,
        CellValue::Text(s) => Decimal::from_str(s.trim()).ok()?,
        _ => return None,
    };
    if value.is_zero() {
        return None;
    }

    let useful_life_years = lives.lookup(&description);
    Some(InvestmentRecord {
        row,
        date,
        description,
        value,
        useful_life_years,
    })
}
