//! Run configuration
//!
//! Tax rate, period mode and the asset useful-life table live in a TOML file
//! and are handed explicitly to the period detector, the depreciation
//! allocator and the report builder.
//!
//! ```toml
//! tax_rate = 30
//! loss_offset_limit = 30
//! default_useful_life = 5
//!
//! [period]
//! auto_detect = true
//! start = "03/24"
//! end = "01/24"
//!
//! [useful_life]
//! "Expansão" = 3
//! "Equipamento" = 3
//! "Software" = 5
//! ```

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::DreError;

/// File looked up in the working directory when no path is given
pub const LOCAL_CONFIG_FILE: &str = "dre.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Income tax rate, in percent
    pub tax_rate: Decimal,
    /// Share of the period's taxable profit that accumulated losses may offset, in percent
    pub loss_offset_limit: Decimal,
    pub period: PeriodConfig,
    /// Useful life in years keyed by the exact `Investimentos` description
    pub useful_life: BTreeMap<String, u32>,
    pub default_useful_life: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodConfig {
    pub auto_detect: bool,
    /// `MM/YY`, used when `auto_detect` is false
    pub start: String,
    /// `MM/YY`, used when `auto_detect` is false
    pub end: String,
}

impl Default for PeriodConfig {
    fn default() -> Self {
        Self {
            auto_detect: true,
            start: "03/24".to_string(),
            end: "01/24".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let useful_life = [("Expansão", 3), ("Equipamento", 3), ("Software", 5)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        Self {
            tax_rate: Decimal::from(30),
            loss_offset_limit: Decimal::from(30),
            period: PeriodConfig::default(),
            useful_life,
            default_useful_life: 5,
        }
    }
}

/// How the report period is obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodMode {
    Auto,
    Explicit { start: String, end: String },
}

/// Description → useful life lookup with a default
#[derive(Debug, Clone, PartialEq)]
pub struct UsefulLifeTable {
    entries: BTreeMap<String, u32>,
    default: u32,
}

impl UsefulLifeTable {
    pub fn new(entries: BTreeMap<String, u32>, default: u32) -> Self {
        Self { entries, default }
    }

    /// Exact-match lookup; unknown descriptions get the default
    pub fn lookup(&self, description: &str) -> u32 {
        self.entries.get(description).copied().unwrap_or(self.default)
    }
}

/// Values the report formulas depend on
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSettings {
    pub tax_rate: Decimal,
    pub loss_offset_limit: Decimal,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Config::default().report_settings()
    }
}

impl Config {
    /// Load configuration: explicit path, then `./dre.toml`, then the user
    /// config directory, then built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        for candidate in Self::candidate_paths() {
            if candidate.is_file() {
                return Self::from_file(&candidate);
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(dir) = dir_spec::config_home() {
            paths.push(dir.join("dre").join("config.toml"));
        }
        paths
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        info!("Configuration loaded from {:?}", path);
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(text).map_err(|e| DreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DreError> {
        let hundred = Decimal::from(100);
        if self.tax_rate < Decimal::ZERO || self.tax_rate > hundred {
            return Err(DreError::Config(format!(
                "tax_rate must be between 0 and 100, got {}",
                self.tax_rate
            )));
        }
        if self.loss_offset_limit < Decimal::ZERO || self.loss_offset_limit > hundred {
            return Err(DreError::Config(format!(
                "loss_offset_limit must be between 0 and 100, got {}",
                self.loss_offset_limit
            )));
        }
        if self.default_useful_life == 0 {
            return Err(DreError::Config(
                "default_useful_life must be at least 1 year".to_string(),
            ));
        }
        if let Some((name, _)) = self.useful_life.iter().find(|(_, years)| **years == 0) {
            return Err(DreError::Config(format!(
                "useful life of '{}' must be at least 1 year",
                name
            )));
        }
        Ok(())
    }

    pub fn period_mode(&self) -> PeriodMode {
        if self.period.auto_detect {
            PeriodMode::Auto
        } else {
            PeriodMode::Explicit {
                start: self.period.start.clone(),
                end: self.period.end.clone(),
            }
        }
    }

    pub fn useful_life_table(&self) -> UsefulLifeTable {
        UsefulLifeTable::new(self.useful_life.clone(), self.default_useful_life)
    }

    pub fn report_settings(&self) -> ReportSettings {
        ReportSettings {
            tax_rate: self.tax_rate,
            loss_offset_limit: self.loss_offset_limit,
        }
    }
}
