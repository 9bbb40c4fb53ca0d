//! The end-to-end forecasting pipeline, run explicitly by the boundary layer.
//!
//! `build_panel` turns a validated source table into the lag-aligned panel, and
//! `run_backtest` sweeps the (cutoff x rule) matrix over it. Upstream failures abort
//! the run and name the stage that failed; failures inside a single backtest fit are
//! recorded in the report instead.

use crate::backtest::{self, BacktestError, BacktestReport};
use crate::config::{ConfigError, PipelineConfig};
use crate::panel::aggregate::{AggregateError, broadcast_region_averages};
use crate::panel::build_region_panel;
use crate::panel::data::{DataError, load_source_table};
use crate::panel::lags::{LagError, build_lag_features};
use crate::panel::types::{LaggedPanel, SourceTable};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Loading the source table failed: {0}")]
    Data(#[from] DataError),
    #[error("Region aggregation failed: {0}")]
    Aggregate(#[from] AggregateError),
    #[error("Lag feature construction failed: {0}")]
    Lag(#[from] LagError),
    #[error("Backtest failed: {0}")]
    Backtest(#[from] BacktestError),
}

/// Everything one pipeline run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub panel: LaggedPanel,
    pub report: BacktestReport,
}

/// Region-averages the source, collapses it to one row per region-week with seasons,
/// and builds the configured lag features.
pub fn build_panel(
    source: &SourceTable,
    config: &PipelineConfig,
) -> Result<LaggedPanel, PipelineError> {
    let averaged = broadcast_region_averages(source)?;
    let panel = build_region_panel(&averaged);
    let lagged = build_lag_features(&panel, &config.lags)?;
    if let Some((first, last)) = lagged.season_range() {
        log::info!(
            "Panel ready: {} rows across seasons {}..={}, {} lag features",
            lagged.len(),
            first,
            last,
            lagged.features.len()
        );
    }
    Ok(lagged)
}

/// Runs the backtest sweep over a built panel.
pub fn run_backtest(
    panel: &LaggedPanel,
    config: &PipelineConfig,
) -> Result<BacktestReport, PipelineError> {
    Ok(backtest::run_backtest(
        panel,
        &config.sorted_lags(),
        config.parallel,
    )?)
}

/// Validates the configuration, then builds the panel and backtests it.
pub fn run(source: &SourceTable, config: &PipelineConfig) -> Result<PipelineOutput, PipelineError> {
    config.validate()?;
    run_validated(source, config)
}

/// Validates the configuration, loads the combined source table from `path`, and runs
/// the pipeline on it. The file is not opened when the configuration is invalid.
pub fn run_file(path: &Path, config: &PipelineConfig) -> Result<PipelineOutput, PipelineError> {
    config.validate()?;
    let source = load_source_table(path, config)?;
    run_validated(&source, config)
}

fn run_validated(
    source: &SourceTable,
    config: &PipelineConfig,
) -> Result<PipelineOutput, PipelineError> {
    let panel = build_panel(source, config)?;
    let report = run_backtest(&panel, config)?;
    Ok(PipelineOutput { panel, report })
}
