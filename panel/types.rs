//! Row and table types shared by every panel stage.
//!
//! Values that may be absent in the source data are carried as `Option<f64>`
//! until the Lag Feature Builder removes incomplete rows; from that point on the
//! panel is dense and lives in `ndarray` structures.

use chrono::NaiveDate;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Serialize, Serializer};
use std::fmt;

/// An HHS region identifier (1 through 10 for the U.S. regions).
pub type RegionId = u32;

/// A flu-season label: the calendar year in which the season starts.
pub type Season = i32;

/// The suffix appended to every region-averaged column name.
pub const REGION_AVG_SUFFIX: &str = "_region_avg";

/// Name of the region-averaged column derived from `name`, e.g. `flu` -> `flu_region_avg`.
pub fn region_average_column(name: &str) -> String {
    format!("{name}{REGION_AVG_SUFFIX}")
}

/// Identifies one lagged model feature: a predictor's region average taken `lag` rows back.
///
/// The identifier is carried through the backtest as typed fields, so no stage ever
/// has to parse the lag number back out of a formatted column name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId {
    pub predictor: String,
    pub lag: u32,
}

impl FeatureId {
    pub fn new(predictor: impl Into<String>, lag: u32) -> Self {
        Self {
            predictor: predictor.into(),
            lag,
        }
    }

    /// The conventional column name, e.g. `flu_symptoms_region_avg_lag2`.
    pub fn column_name(&self) -> String {
        format!("{}_lag{}", region_average_column(&self.predictor), self.lag)
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.column_name())
    }
}

impl Serialize for FeatureId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The (region, week) key every stage groups and orders by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionWeek {
    pub region: RegionId,
    pub week_start: NaiveDate,
}

/// One row of the combined surveillance + trends input, typically one state in one week.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub region: RegionId,
    pub week_start: NaiveDate,
    /// The raw, not yet averaged target value (e.g. state-level `wili`).
    pub target: Option<f64>,
    /// One value per predictor, in `SourceTable::predictor_names` order.
    pub predictors: Vec<Option<f64>>,
}

impl SourceRow {
    pub fn key(&self) -> RegionWeek {
        RegionWeek {
            region: self.region,
            week_start: self.week_start,
        }
    }
}

/// The validated input table the pipeline consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTable {
    pub target_name: String,
    pub predictor_names: Vec<String>,
    pub rows: Vec<SourceRow>,
}

impl SourceTable {
    pub fn new(target_name: impl Into<String>, predictor_names: Vec<String>) -> Self {
        Self {
            target_name: target_name.into(),
            predictor_names,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A source row with its region-week means broadcast onto it.
#[derive(Debug, Clone, PartialEq)]
pub struct AveragedRow {
    pub source: SourceRow,
    pub target_avg: Option<f64>,
    pub predictor_avgs: Vec<Option<f64>>,
}

/// Output of the Region Aggregator: the input rows, in input order, each with its averages.
#[derive(Debug, Clone, PartialEq)]
pub struct AveragedTable {
    pub target_name: String,
    pub predictor_names: Vec<String>,
    pub rows: Vec<AveragedRow>,
}

/// One region-week of the de-duplicated panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelRow {
    pub region: RegionId,
    pub week_start: NaiveDate,
    pub season: Season,
    /// `<target>_region_avg`
    pub target: Option<f64>,
    /// `<predictor>_region_avg`, one per predictor.
    pub predictors: Vec<Option<f64>>,
}

/// Exactly one row per (region, week_start), sorted by region then week.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    pub target_name: String,
    pub predictor_names: Vec<String>,
    pub rows: Vec<PanelRow>,
}

impl Panel {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Identifies a row of the lagged panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowKey {
    pub region: RegionId,
    pub week_start: NaiveDate,
    pub season: Season,
}

/// The model-ready panel: only complete rows, with one column per `FeatureId`.
#[derive(Debug, Clone)]
pub struct LaggedPanel {
    pub target_name: String,
    pub predictor_names: Vec<String>,
    /// The column layout of `lagged`: lag-major, then predictor order.
    pub features: Vec<FeatureId>,
    pub keys: Vec<RowKey>,
    /// `<target>_region_avg` for each row.
    pub target: Array1<f64>,
    /// Unlagged region averages, shape `[n_rows, n_predictors]`.
    pub current: Array2<f64>,
    /// Lagged region averages, shape `[n_rows, features.len()]`.
    pub lagged: Array2<f64>,
}

impl LaggedPanel {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The smallest and largest season labels present, or `None` for an empty panel.
    pub fn season_range(&self) -> Option<(Season, Season)> {
        let min = self.keys.iter().map(|k| k.season).min()?;
        let max = self.keys.iter().map(|k| k.season).max()?;
        Some((min, max))
    }

    pub fn seasons(&self) -> Vec<Season> {
        self.keys.iter().map(|k| k.season).collect()
    }

    /// Column indices of the features whose lag is accepted by `keep`, in layout order.
    pub fn feature_indices(&self, keep: impl Fn(u32) -> bool) -> Vec<usize> {
        self.features
            .iter()
            .enumerate()
            .filter(|(_, feature)| keep(feature.lag))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Gathers the given rows and feature columns into a dense design matrix.
    pub fn design(&self, rows: &[usize], columns: &[usize]) -> Array2<f64> {
        select_block(self.lagged.view(), rows, columns)
    }

    /// Gathers the target values of the given rows.
    pub fn target_of(&self, rows: &[usize]) -> Array1<f64> {
        self.target.select(Axis(0), rows)
    }
}

fn select_block(matrix: ArrayView2<f64>, rows: &[usize], columns: &[usize]) -> Array2<f64> {
    matrix.select(Axis(0), rows).select(Axis(1), columns)
}
