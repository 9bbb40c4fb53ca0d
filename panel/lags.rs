//! # Lag Feature Builder
//!
//! For every lag offset `k` and every predictor, takes the predictor's region average
//! from `k` rows earlier in the same region's chronological series. The offset counts
//! observations, not calendar weeks; the two agree only where a region has no gaps.
//!
//! After all lag columns exist, any row with a missing target, predictor, or lag value
//! is removed. The surviving rows are packed into the dense `LaggedPanel`.

use super::types::{FeatureId, LaggedPanel, Panel, PanelRow, RowKey};
use itertools::Itertools;
use ndarray::{Array1, Array2};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LagError {
    #[error("At least one lag offset is required to build lagged features.")]
    NoLags,
    #[error("Lag offsets must be at least 1; a lag of 0 would leak the current week.")]
    ZeroLag,
    #[error("Lag offset {0} was requested more than once.")]
    DuplicateLag(u32),
    #[error("The panel is not sorted by (region, week_start) at row {0}.")]
    UnsortedPanel(usize),
    #[error("Internal error: lagged feature buffers do not form a matrix: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// The feature layout for `predictors` × `lags`: lag-major, then predictor order.
pub fn feature_layout(predictors: &[String], lags: &[u32]) -> Vec<FeatureId> {
    lags.iter()
        .flat_map(|&lag| predictors.iter().map(move |p| FeatureId::new(p.clone(), lag)))
        .collect()
}

/// Builds lagged columns within each region and drops every incomplete row.
///
/// `lags` are used in ascending order regardless of the order given.
pub fn build_lag_features(panel: &Panel, lags: &[u32]) -> Result<LaggedPanel, LagError> {
    let lags = validated_lags(lags)?;
    check_sorted(&panel.rows)?;

    let num_predictors = panel.predictor_names.len();
    let features = feature_layout(&panel.predictor_names, &lags);

    let mut keys = Vec::new();
    let mut target = Vec::new();
    let mut current = Vec::new();
    let mut lagged = Vec::new();
    let mut dropped = 0usize;

    // The panel is sorted, so consecutive runs of one region form its chronological series.
    for (region, series) in &panel.rows.iter().chunk_by(|row| row.region) {
        let series: Vec<&PanelRow> = series.collect();
        for (position, row) in series.iter().enumerate() {
            match complete_row(&series, position, &lags) {
                Some((row_target, values, lag_values)) => {
                    keys.push(RowKey {
                        region,
                        week_start: row.week_start,
                        season: row.season,
                    });
                    target.push(row_target);
                    current.extend(values);
                    lagged.extend(lag_values);
                }
                None => dropped += 1,
            }
        }
    }

    let n = keys.len();
    log::info!(
        "Lag construction complete: {} complete rows kept, {} rows dropped for missing values or history",
        n,
        dropped
    );

    Ok(LaggedPanel {
        target_name: panel.target_name.clone(),
        predictor_names: panel.predictor_names.clone(),
        features,
        keys,
        target: Array1::from_vec(target),
        current: Array2::from_shape_vec((n, num_predictors), current)?,
        lagged: Array2::from_shape_vec((n, num_predictors * lags.len()), lagged)?,
    })
}

fn validated_lags(lags: &[u32]) -> Result<Vec<u32>, LagError> {
    if lags.is_empty() {
        return Err(LagError::NoLags);
    }
    let mut seen = HashSet::with_capacity(lags.len());
    for &lag in lags {
        if lag == 0 {
            return Err(LagError::ZeroLag);
        }
        if !seen.insert(lag) {
            return Err(LagError::DuplicateLag(lag));
        }
    }
    Ok(lags.iter().copied().sorted_unstable().collect())
}

fn check_sorted(rows: &[PanelRow]) -> Result<(), LagError> {
    for (idx, pair) in rows.windows(2).enumerate() {
        if (pair[0].region, pair[0].week_start) >= (pair[1].region, pair[1].week_start) {
            return Err(LagError::UnsortedPanel(idx + 1));
        }
    }
    Ok(())
}

/// The row's target, current predictor values, and lag values in layout order, if all are present.
fn complete_row(
    series: &[&PanelRow],
    position: usize,
    lags: &[u32],
) -> Option<(f64, Vec<f64>, Vec<f64>)> {
    let row = series[position];
    let target = row.target?;
    let values: Vec<f64> = row.predictors.iter().copied().collect::<Option<_>>()?;

    let mut lag_values = Vec::with_capacity(lags.len() * values.len());
    for &lag in lags {
        let earlier = position.checked_sub(lag as usize)?;
        for &value in &series[earlier].predictors {
            lag_values.push(value?);
        }
    }
    Some((target, values, lag_values))
}
