//! Error handling for the DRE generator
//!
//! Domain error types. Callers propagate them through `anyhow::Result`,
//! which adds context and still allows downcasting.

use thiserror::Error;

/// Core error types for report generation
#[derive(Error, Debug)]
pub enum DreError {
    #[error("source sheets not found: {}", .0.join(", "))]
    MissingSheets(Vec<String>),

    #[error("invalid period '{value}'. Expected format: MM/YY (ex: '01/24')")]
    PeriodFormat { value: String },

    #[error("invalid period: {0}")]
    InvalidPeriod(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("workbook error: {0}")]
    Workbook(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_sheets_lists_every_name() {
        let err = DreError::MissingSheets(vec!["Vendas".to_string(), "Folha".to_string()]);
        assert_eq!(err.to_string(), "source sheets not found: Vendas, Folha");
    }

    #[test]
    fn test_period_format_names_expected_format() {
        let err = DreError::PeriodFormat {
            value: "2024-01".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2024-01"));
        assert!(msg.contains("MM/YY"));
    }

    #[test]
    fn test_domain_errors_downcast_through_anyhow() {
        let err: anyhow::Error = DreError::InvalidPeriod("end before start".to_string()).into();
        assert!(matches!(
            err.downcast_ref::<DreError>(),
            Some(DreError::InvalidPeriod(_))
        ));
    }
}
