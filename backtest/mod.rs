//! The expanding-window backtest: lag rules, season splits, the linear model, the
//! (cutoff x rule) trainer, and presentation formatting of its tables.

pub mod format;
pub mod matrix;
pub mod ols;
pub mod rules;
pub mod split;

pub use self::matrix::{
    BacktestError, BacktestReport, CoefficientRecord, IterationError, ModelSummary,
    PredictionRecord, SkippedFit, run_backtest,
};
