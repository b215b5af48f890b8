//! End-to-end DRE generation: period, report sheet, depreciation waterfall.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::{Config, PeriodMode};
use crate::depreciation::{self, INVESTMENTS_SHEET};
use crate::error::DreError;
use crate::period::{self, DateScan, InvalidDateRecord, PeriodSource, ReportPeriod};
use crate::report::{self, DegradedLine, ReportBuilder, SourceAvailability, REPORT_SHEET};
use crate::utils::format_currency;
use crate::workbook::{self, Workbook};

/// Sheets without which no report can be built
pub const REQUIRED_SHEETS: &[&str] = &["Vendas", "Custo_Despesas", "Folha"];

/// What a run did, for display and for callers that need to react to
/// degraded output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub period: ReportPeriod,
    pub period_source: PeriodSource,
    pub invalid_dates: Vec<InvalidDateRecord>,
    pub degraded: Vec<DegradedLine>,
    pub investments: usize,
    /// D&A per report month; empty when there is no investments sheet
    pub depreciation_totals: Vec<Decimal>,
    /// True when an existing DRE sheet was replaced
    pub replaced_existing: bool,
    pub output: Option<PathBuf>,
}

/// Fail with every missing sheet name at once
pub fn verify_source_sheets(workbook: &Workbook, required: &[&str]) -> Result<(), DreError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|name| !workbook.has_sheet(name))
        .map(|name| name.to_string())
        .collect();

    if missing.is_empty() {
        info!("All source sheets found: {}", required.join(", "));
        Ok(())
    } else {
        Err(DreError::MissingSheets(missing))
    }
}

pub struct DreGenerator {
    config: Config,
}

impl DreGenerator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Period from the scan or from the configured `MM/YY` bounds
    pub fn resolve_period(&self, scan: &DateScan) -> Result<(ReportPeriod, PeriodSource), DreError> {
        match self.config.period_mode() {
            PeriodMode::Auto => Ok(scan.detect_period()),
            PeriodMode::Explicit { start, end } => {
                let period = ReportPeriod::from_month_year(&start, &end)?;
                info!("Using configured period: {}", period);
                Ok((period, PeriodSource::Explicit))
            }
        }
    }

    /// Rebuild the DRE sheet and the depreciation waterfall in `workbook`
    ///
    /// Nothing is modified when the period is invalid or a required sheet
    /// is missing.
    pub fn generate(&self, workbook: &mut Workbook) -> Result<RunSummary> {
        let scan = period::scan_dates(workbook, period::DATE_SOURCES);
        let (period, period_source) = self.resolve_period(&scan)?;
        verify_source_sheets(workbook, REQUIRED_SHEETS)?;

        let settings = self.config.report_settings();
        let sources = SourceAvailability::from_workbook(workbook);
        let report = ReportBuilder::new(&settings, &period, sources).build();

        let replaced_existing = workbook.remove_sheet(REPORT_SHEET).is_some();
        if replaced_existing {
            info!("Existing {} sheet will be rebuilt", REPORT_SHEET);
        }
        let sheet = workbook.insert_sheet(0, REPORT_SHEET);
        report.write(sheet);

        let (investments, depreciation_totals) = match workbook.sheet_mut(INVESTMENTS_SHEET) {
            Some(sheet) => {
                let lives = self.config.useful_life_table();
                let investments = depreciation::read_investments(sheet, &lives);
                let schedule = depreciation::allocate(&investments, &period);
                depreciation::write_waterfall(sheet, &schedule);
                info!(
                    "Depreciation for {} asset(s): {} over the period",
                    schedule.assets.len(),
                    format_currency(schedule.grand_total())
                );
                (investments.len(), schedule.totals)
            }
            None => {
                warn!(
                    "Sheet '{}' not found, depreciation waterfall skipped",
                    INVESTMENTS_SHEET
                );
                (0, Vec::new())
            }
        };

        let sheet = workbook
            .sheet_mut(REPORT_SHEET)
            .ok_or_else(|| DreError::Workbook(format!("sheet '{}' vanished", REPORT_SHEET)))?;
        report::apply_format(sheet, &report);

        info!("{} sheet built for {}", REPORT_SHEET, period);
        Ok(RunSummary {
            period,
            period_source,
            invalid_dates: scan.invalid,
            degraded: report.degraded,
            investments,
            depreciation_totals,
            replaced_existing,
            output: None,
        })
    }

    /// Load `input`, generate, and save to `output`
    pub fn run(&self, input: &Path, output: &Path) -> Result<RunSummary> {
        let mut workbook = workbook::load(input)?;
        let mut summary = self
            .generate(&mut workbook)
            .with_context(|| format!("Failed to build DRE for {}", input.display()))?;
        workbook::save(&workbook, output)?;
        summary.output = Some(output.to_path_buf());
        Ok(summary)
    }
}
