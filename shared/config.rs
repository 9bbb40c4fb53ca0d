//! # Pipeline Configuration
//!
//! The run-time knobs of the backtest: which surveillance column is the target,
//! which search-interest columns are predictors, and which lag offsets are built.
//! Key columns (`region`, `week_start`, `state`, `epiweek`) are deliberately not
//! configurable; the input loaders enforce that strict schema.
//!
//! Configurations round-trip through a human-readable TOML file.

use crate::panel::data::predictor_key;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Predictor keywords tracked by the original surveillance project.
pub const DEFAULT_PREDICTORS: [&str; 5] = ["flu", "fever", "cough", "flu_symptoms", "sore_throat"];

/// Lag offsets, in weeks, used when none are configured.
pub const DEFAULT_LAGS: [u32; 4] = [1, 2, 3, 4];

/// Target column holding the state-level weighted ILI rate.
pub const DEFAULT_TARGET: &str = "wili";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("The configuration lists no predictors. At least one search-interest column is required.")]
    NoPredictors,
    #[error("Predictor '{0}' is listed more than once in the configuration.")]
    DuplicatePredictor(String),
    #[error("Predictor '{0}' is also configured as the target column.")]
    PredictorIsTarget(String),
    #[error("The target column name must not be empty.")]
    EmptyTarget,
    #[error("The configuration lists no lag offsets.")]
    NoLags,
    #[error("Lag offsets must be at least 1 week; found {0}.")]
    InvalidLag(u32),
    #[error("Lag offset {0} is listed more than once in the configuration.")]
    DuplicateLag(u32),
}

/// Everything a pipeline run needs besides the input table itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Name of the state-level surveillance column to average and forecast.
    pub target: String,
    /// Search-interest columns, in the order their features are laid out.
    pub predictors: Vec<String>,
    /// Lag offsets in weeks. Order does not matter; rules are built from the sorted set.
    pub lags: Vec<u32>,
    /// Fit the (cutoff, rule) matrix on the rayon thread pool.
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            predictors: DEFAULT_PREDICTORS.iter().map(|p| p.to_string()).collect(),
            lags: DEFAULT_LAGS.to_vec(),
            parallel: true,
        }
    }
}

impl PipelineConfig {
    /// Checks the configuration for values that would make every downstream stage meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.trim().is_empty() {
            return Err(ConfigError::EmptyTarget);
        }
        if self.predictors.is_empty() {
            return Err(ConfigError::NoPredictors);
        }

        // "flu symptoms" and "flu_symptoms" resolve to the same input column.
        let target_key = predictor_key(&self.target);
        let mut seen = HashSet::with_capacity(self.predictors.len());
        for predictor in &self.predictors {
            let key = predictor_key(predictor);
            if !seen.insert(key.clone()) {
                return Err(ConfigError::DuplicatePredictor(predictor.clone()));
            }
            if key == target_key {
                return Err(ConfigError::PredictorIsTarget(predictor.clone()));
            }
        }

        if self.lags.is_empty() {
            return Err(ConfigError::NoLags);
        }
        let mut seen_lags = HashSet::with_capacity(self.lags.len());
        for &lag in &self.lags {
            if lag == 0 {
                return Err(ConfigError::InvalidLag(lag));
            }
            if !seen_lags.insert(lag) {
                return Err(ConfigError::DuplicateLag(lag));
            }
        }
        Ok(())
    }

    /// The configured lag offsets, ascending.
    pub fn sorted_lags(&self) -> Vec<u32> {
        let mut lags = self.lags.clone();
        lags.sort_unstable();
        lags
    }

    /// Renders the configuration as pretty-printed TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Saves the configuration to a file in a human-readable TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = self.to_toml_string()?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Loads and validates a configuration from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }
}
