//! # Backtest Matrix Trainer
//!
//! Fits one linear model per (season cutoff, lag rule) pair and scores it on every
//! later season. Each pair is an independent job: a failure in one job is recorded in
//! the report's skip ledger and never touches the results of another.
//!
//! Jobs run on the rayon pool when requested. Results are gathered in job order
//! (cutoff ascending, then rule enumeration order), so a parallel sweep produces
//! exactly the tables a sequential one does.

use super::ols::{FitError, LinearModel, r2_score};
use super::rules::{LagRule, enumerate_lag_rules};
use super::split::{SeasonSplit, cutoff_seasons, split_by_season};
use crate::panel::season::season_start;
use crate::panel::types::{FeatureId, LaggedPanel, RegionId, Season};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

/// Why a single (cutoff, rule) job produced no model.
#[derive(Error, Debug)]
pub enum IterationError {
    #[error("no training rows precede season {0}")]
    EmptyTrain(Season),
    #[error("no test rows fall in season {0} or later")]
    EmptyTest(Season),
    #[error("model fit failed: {0}")]
    Fit(#[from] FitError),
}

/// Structural failures that prevent any job from being defined.
#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("The lagged panel has no complete rows; there is nothing to backtest.")]
    EmptyPanel,
    #[error(
        "Every row belongs to season {0}. At least two seasons are needed to place a training cutoff."
    )]
    TooFewSeasons(Season),
    #[error("No lag offsets were given, so no lag rules can be formed.")]
    NoLagRules,
    #[error("Lag offset {0} has no feature columns in the lagged panel.")]
    UnknownLag(u32),
    #[error("All {attempted} (cutoff, lag rule) fits were skipped; see the log for each reason.")]
    AllFitsSkipped { attempted: usize },
}

/// One test row scored by one model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRecord {
    pub week_start: NaiveDate,
    pub region: RegionId,
    pub season_cutoff: Season,
    pub lag_rule: LagRule,
    pub actual: f64,
    pub predicted: f64,
    pub abs_error: f64,
    pub sq_error: f64,
    /// The model's R² on its whole test partition, repeated on each of its rows.
    pub r2_model: f64,
}

/// One fitted slope of one model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoefficientRecord {
    pub season_cutoff: Season,
    pub lag_rule: LagRule,
    pub feature: FeatureId,
    pub coef: f64,
}

/// Model-level statistics of one successful fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub season_cutoff: Season,
    pub lag_rule: LagRule,
    pub features: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub intercept: f64,
    pub r2: f64,
    pub mae: f64,
    pub rmse: f64,
}

/// A job that produced no model, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFit {
    pub season_cutoff: Season,
    pub lag_rule: LagRule,
    pub reason: String,
}

/// The sweep's output. A report with any skipped fits is partial.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BacktestReport {
    /// Job order: cutoff ascending, then rule enumeration order, then test-row order.
    pub predictions: Vec<PredictionRecord>,
    /// Sorted by (season_cutoff asc, lag_rule asc, coef desc).
    pub coefficients: Vec<CoefficientRecord>,
    pub models: Vec<ModelSummary>,
    pub skipped: Vec<SkippedFit>,
}

impl BacktestReport {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }

    pub fn jobs(&self) -> usize {
        self.models.len() + self.skipped.len()
    }
}

struct FittedJob {
    predictions: Vec<PredictionRecord>,
    coefficients: Vec<CoefficientRecord>,
    summary: ModelSummary,
}

/// Runs the full (cutoff x rule) sweep over `panel`.
pub fn run_backtest(
    panel: &LaggedPanel,
    lags: &[u32],
    parallel: bool,
) -> Result<BacktestReport, BacktestError> {
    let (min_season, max_season) = panel.season_range().ok_or(BacktestError::EmptyPanel)?;
    if min_season == max_season {
        return Err(BacktestError::TooFewSeasons(min_season));
    }
    if let Some(&missing) = lags
        .iter()
        .find(|&&lag| !panel.features.iter().any(|f| f.lag == lag))
    {
        return Err(BacktestError::UnknownLag(missing));
    }
    let rules = enumerate_lag_rules(lags);
    if rules.is_empty() {
        return Err(BacktestError::NoLagRules);
    }

    let seasons = panel.seasons();
    let splits: Vec<SeasonSplit> = cutoff_seasons(min_season, max_season)
        .into_iter()
        .map(|cutoff| split_by_season(&seasons, cutoff))
        .collect();
    let rule_columns: Vec<(LagRule, Vec<usize>)> = rules
        .into_iter()
        .map(|rule| {
            let columns = panel.feature_indices(|lag| rule.contains(lag));
            (rule, columns)
        })
        .collect();
    let jobs: Vec<(&SeasonSplit, &LagRule, &[usize])> = splits
        .iter()
        .flat_map(|split| {
            rule_columns
                .iter()
                .map(move |(rule, columns)| (split, rule, columns.as_slice()))
        })
        .collect();

    log::info!(
        "Backtesting {} rows over seasons {}..={}: {} cutoffs x {} lag rules = {} fits{}",
        panel.len(),
        min_season,
        max_season,
        splits.len(),
        rule_columns.len(),
        jobs.len(),
        if parallel { " (parallel)" } else { "" }
    );
    for split in &splits {
        log::debug!(
            "Cutoff {} (test from {}): {} train rows, {} test rows",
            split.cutoff,
            season_start(split.cutoff).map_or_else(|| "?".to_string(), |d| d.to_string()),
            split.train.len(),
            split.test.len()
        );
    }

    let outcomes: Vec<Result<FittedJob, IterationError>> = if parallel {
        jobs.par_iter()
            .map(|&(split, rule, columns)| fit_and_score(panel, split, rule, columns))
            .collect()
    } else {
        jobs.iter()
            .map(|&(split, rule, columns)| fit_and_score(panel, split, rule, columns))
            .collect()
    };

    let mut report = BacktestReport::default();
    for (&(split, rule, _), outcome) in jobs.iter().zip(outcomes) {
        match outcome {
            Ok(fitted) => {
                report.predictions.extend(fitted.predictions);
                report.coefficients.extend(fitted.coefficients);
                report.models.push(fitted.summary);
            }
            Err(e) => {
                log::warn!(
                    "Skipping cutoff {} rule {}: {}",
                    split.cutoff,
                    rule.label(),
                    e
                );
                report.skipped.push(SkippedFit {
                    season_cutoff: split.cutoff,
                    lag_rule: rule.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if report.models.is_empty() {
        return Err(BacktestError::AllFitsSkipped {
            attempted: jobs.len(),
        });
    }

    sort_coefficients(&mut report.coefficients);

    log::info!(
        "Backtest complete: {} models fitted, {} skipped, {} prediction rows, {} coefficient rows",
        report.models.len(),
        report.skipped.len(),
        report.predictions.len(),
        report.coefficients.len()
    );
    Ok(report)
}

/// Orders coefficients by cutoff, then rule label, then strongest positive coefficient first.
///
/// Both passes are stable, so the second keeps the coefficient order of the first within
/// each group, and every label is rendered once.
pub fn sort_coefficients(coefficients: &mut [CoefficientRecord]) {
    coefficients.sort_by(|a, b| b.coef.total_cmp(&a.coef));
    coefficients.sort_by_cached_key(|c| (c.season_cutoff, c.lag_rule.label()));
}

fn fit_and_score(
    panel: &LaggedPanel,
    split: &SeasonSplit,
    rule: &LagRule,
    columns: &[usize],
) -> Result<FittedJob, IterationError> {
    if split.train.is_empty() {
        return Err(IterationError::EmptyTrain(split.cutoff));
    }
    if split.test.is_empty() {
        return Err(IterationError::EmptyTest(split.cutoff));
    }

    let x_train = panel.design(&split.train, columns);
    let y_train = panel.target_of(&split.train);
    let model = LinearModel::fit(x_train.view(), y_train.view())?;

    let x_test = panel.design(&split.test, columns);
    let actual = panel.target_of(&split.test);
    let predicted = model.predict(x_test.view());
    let r2 = r2_score(actual.view(), predicted.view());

    let predictions: Vec<PredictionRecord> = split
        .test
        .iter()
        .zip(actual.iter().zip(predicted.iter()))
        .map(|(&row, (&actual, &predicted))| {
            let key = &panel.keys[row];
            let error = predicted - actual;
            PredictionRecord {
                week_start: key.week_start,
                region: key.region,
                season_cutoff: split.cutoff,
                lag_rule: rule.clone(),
                actual,
                predicted,
                abs_error: error.abs(),
                sq_error: error * error,
                r2_model: r2,
            }
        })
        .collect();

    let coefficients = columns
        .iter()
        .zip(model.coefficients.iter())
        .map(|(&column, &coef)| CoefficientRecord {
            season_cutoff: split.cutoff,
            lag_rule: rule.clone(),
            feature: panel.features[column].clone(),
            coef,
        })
        .collect();

    let test_rows = predictions.len() as f64;
    let mae = predictions.iter().map(|p| p.abs_error).sum::<f64>() / test_rows;
    let rmse = (predictions.iter().map(|p| p.sq_error).sum::<f64>() / test_rows).sqrt();

    log::trace!(
        "Cutoff {} rule {}: R2 {:.4}, intercept {:.4}",
        split.cutoff,
        rule,
        r2,
        model.intercept
    );

    Ok(FittedJob {
        summary: ModelSummary {
            season_cutoff: split.cutoff,
            lag_rule: rule.clone(),
            features: columns.len(),
            train_rows: split.train.len(),
            test_rows: predictions.len(),
            intercept: model.intercept,
            r2,
            mae,
            rmse,
        },
        predictions,
        coefficients,
    })
}
