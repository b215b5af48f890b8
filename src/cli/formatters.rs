//! Output formatting module for CLI display
//!
//! Turns a [`RunSummary`] into terminal text or JSON; nothing here touches
//! the workbook.

use colored::Colorize;
use dre::pipeline::RunSummary;
use dre::period::InvalidDateRecord;
use dre::utils::format_currency;
use rust_decimal::Decimal;
use tabled::{settings::Style, Table, Tabled};

/// Format the run summary for JSON output
pub fn format_summary_json(summary: &RunSummary) -> String {
    serde_json::to_string_pretty(summary)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

/// Format the run summary for the terminal
pub fn format_summary(summary: &RunSummary) -> String {
    let mut output = String::new();

    output.push_str(&format!("\n{} DRE built successfully\n\n", "✓".green().bold()));
    output.push_str(&format!(
        "{:<16} {} ({})\n",
        "Period:".bold(),
        summary.period,
        summary.period_source
    ));
    output.push_str(&format!(
        "{:<16} {}\n",
        "Investments:".bold(),
        summary.investments
    ));

    if !summary.depreciation_totals.is_empty() {
        let total: Decimal = summary.depreciation_totals.iter().copied().sum();
        output.push_str(&format!(
            "{:<16} {}\n",
            "D&A in period:".bold(),
            format_currency(total)
        ));
    }

    if summary.replaced_existing {
        output.push_str(&format!(
            "{} Existing DRE sheet was rebuilt\n",
            "ℹ".blue().bold()
        ));
    }

    if let Some(path) = &summary.output {
        output.push_str(&format!("{:<16} {}\n", "Saved to:".bold(), path.display()));
    }

    for line in &summary.degraded {
        output.push_str(&format!("{} {}\n", "⚠".yellow().bold(), line));
    }

    output
}

/// Table of date cells that were ignored, or an empty string when there are none
pub fn format_invalid_dates(records: &[InvalidDateRecord]) -> String {
    if records.is_empty() {
        return String::new();
    }

    #[derive(Tabled)]
    struct InvalidDateRow {
        #[tabled(rename = "Sheet")]
        sheet: String,
        #[tabled(rename = "Row")]
        row: u32,
        #[tabled(rename = "Value")]
        value: String,
    }

    let rows: Vec<InvalidDateRow> = records
        .iter()
        .map(|r| InvalidDateRow {
            sheet: r.sheet.clone(),
            row: r.row,
            value: r.value.to_string(),
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::rounded());

    format!(
        "\n{} Invalid dates found:\n{}\n{} invalid date(s) were ignored.\n",
        "✗".red().bold(),
        table,
        records.len()
    )
}
