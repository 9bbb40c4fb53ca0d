//! Presentation labels for backtest tables. Values and row counts pass through unchanged.

use super::matrix::{CoefficientRecord, PredictionRecord};
use super::rules::LagRule;
use crate::panel::types::{RegionId, Season};
use chrono::NaiveDate;
use serde::Serialize;

/// Display labels for the rules the default lag set produces.
pub const LAG_WINDOW_LABELS: [(&str, &str); 4] = [
    ("lag1+lag2+lag3+lag4", "1-4 Weeks Before"),
    ("lag2+lag3+lag4", "2-4 Weeks Before"),
    ("lag3+lag4", "3-4 Weeks Before"),
    ("lag4", "4 Weeks Before"),
];

/// The display label of a rule. Rules outside the fixed table get a label built from
/// their smallest and largest offsets.
pub fn lag_window_label(rule: &LagRule) -> String {
    let token = rule.label();
    if let Some((_, label)) = LAG_WINDOW_LABELS.iter().find(|(t, _)| *t == token) {
        return label.to_string();
    }
    match (rule.lags().first(), rule.lags().last()) {
        (Some(min), Some(max)) if min == max => format!("{min} Weeks Before"),
        (Some(min), Some(max)) => format!("{min}-{max} Weeks Before"),
        _ => String::new(),
    }
}

/// `flu_symptoms_region_avg_lag2` -> `Flu Symptoms`.
pub fn clean_feature_name(name: &str) -> String {
    let stem = name.split("_region").next().unwrap_or(name);
    title_case(&stem.replace('_', " "))
}

/// Upper-cases the first letter of every run of letters and lower-cases the rest.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if in_word {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        in_word = c.is_alphabetic();
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedPrediction {
    pub week_start: NaiveDate,
    pub region: RegionId,
    pub season_cutoff: Season,
    pub lag_rule: LagRule,
    pub actual: f64,
    pub predicted: f64,
    pub abs_error: f64,
    pub sq_error: f64,
    pub r2_model: f64,
    #[serde(rename = "Lag Window")]
    pub lag_window: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedCoefficient {
    pub season_cutoff: Season,
    pub lag_rule: LagRule,
    pub feature: String,
    /// Kept alongside the cleaned name, which no longer shows the lag.
    pub lag: u32,
    pub coef: f64,
    #[serde(rename = "Lag Window")]
    pub lag_window: String,
}

pub fn format_predictions(predictions: &[PredictionRecord]) -> Vec<FormattedPrediction> {
    predictions
        .iter()
        .map(|p| FormattedPrediction {
            week_start: p.week_start,
            region: p.region,
            season_cutoff: p.season_cutoff,
            lag_rule: p.lag_rule.clone(),
            actual: p.actual,
            predicted: p.predicted,
            abs_error: p.abs_error,
            sq_error: p.sq_error,
            r2_model: p.r2_model,
            lag_window: lag_window_label(&p.lag_rule),
        })
        .collect()
}

pub fn format_coefficients(coefficients: &[CoefficientRecord]) -> Vec<FormattedCoefficient> {
    coefficients
        .iter()
        .map(|c| FormattedCoefficient {
            season_cutoff: c.season_cutoff,
            lag_rule: c.lag_rule.clone(),
            feature: clean_feature_name(&c.feature.column_name()),
            lag: c.feature.lag,
            coef: c.coef,
            lag_window: lag_window_label(&c.lag_rule),
        })
        .collect()
}
