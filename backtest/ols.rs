//! Ordinary least squares with an intercept.
//!
//! The intercept is handled by centering: the slope vector is the least-squares
//! solution on column-centered features and a centered target, and the intercept is
//! `mean(y) - mean(X) . beta`. The solve goes through an SVD, so rank deficiency is
//! visible in the singular values and reported instead of papered over.

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::LeastSquaresSvd;
use thiserror::Error;

/// Singular values below this fraction of the largest are treated as zero.
const RANK_TOLERANCE: f64 = 1e-10;

#[derive(Error, Debug)]
pub enum FitError {
    #[error("A model needs at least one feature column.")]
    NoFeatures,
    #[error(
        "Only {rows} training rows for {features} features plus an intercept; at least {} are needed.",
        .features + 1
    )]
    TooFewRows { rows: usize, features: usize },
    #[error(
        "The design matrix is rank deficient (rank {rank} of {features} features); the least-squares solution is not unique."
    )]
    RankDeficient { rank: usize, features: usize },
    #[error("The target has {target} rows but the design matrix has {design}.")]
    DimensionMismatch { design: usize, target: usize },
    #[error("Least-squares solve failed: {0}")]
    LinalgError(#[from] ndarray_linalg::error::LinalgError),
    #[error("The fitted coefficients contain non-finite values.")]
    NonFiniteSolution,
}

/// A fitted linear mapping `y = intercept + X . coefficients`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    pub intercept: f64,
    /// One coefficient per design column, in column order.
    pub coefficients: Array1<f64>,
}

impl LinearModel {
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Self, FitError> {
        let (rows, features) = x.dim();
        if features == 0 {
            return Err(FitError::NoFeatures);
        }
        if y.len() != rows {
            return Err(FitError::DimensionMismatch {
                design: rows,
                target: y.len(),
            });
        }
        if rows < features + 1 {
            return Err(FitError::TooFewRows { rows, features });
        }

        let x_mean = x
            .mean_axis(Axis(0))
            .ok_or(FitError::TooFewRows { rows, features })?;
        let y_mean = y.mean().ok_or(FitError::TooFewRows { rows, features })?;
        let x_centered = &x - &x_mean;
        let y_centered = y.mapv(|v| v - y_mean);

        let solution = x_centered.least_squares(&y_centered)?;

        let s_max = solution
            .singular_values
            .iter()
            .fold(0.0_f64, |max, &s| max.max(s));
        let rank = solution
            .singular_values
            .iter()
            .filter(|&&s| s > s_max * RANK_TOLERANCE)
            .count();
        if s_max == 0.0 || rank < features {
            return Err(FitError::RankDeficient { rank, features });
        }

        let coefficients = solution.solution;
        let intercept = y_mean - x_mean.dot(&coefficients);
        if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(FitError::NonFiniteSolution);
        }

        Ok(Self {
            intercept,
            coefficients,
        })
    }

    /// Predictions for each row of `x`, whose columns must match the fitted design.
    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.dot(&self.coefficients) + self.intercept
    }
}

/// Coefficient of determination of `predicted` against `actual`.
///
/// A constant `actual` has no variance to explain: the score is 1.0 when the prediction
/// is exact and 0.0 otherwise.
pub fn r2_score(actual: ArrayView1<f64>, predicted: ArrayView1<f64>) -> f64 {
    let mean = actual.mean().unwrap_or(0.0);
    let ss_res: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        if ss_res == 0.0 { 1.0 } else { 0.0 }
    } else {
        1.0 - ss_res / ss_tot
    }
}
