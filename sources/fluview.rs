//! Cleaning of FluView surveillance exports.
//!
//! A FluView export has one row per (HHS region, epiweek) with the region written as
//! `hhsN`. Cleaning keys each row by integer region and the Sunday its epiweek starts
//! on, and keeps the target column.

use crate::panel::data::{self, DataError};
use crate::panel::types::{RegionId, RegionWeek};
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct SurveillanceRow {
    pub region: RegionId,
    pub week_start: NaiveDate,
    pub value: Option<f64>,
}

impl SurveillanceRow {
    pub fn key(&self) -> RegionWeek {
        RegionWeek {
            region: self.region,
            week_start: self.week_start,
        }
    }
}

/// Cleaned surveillance series for one target column.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveillanceTable {
    pub target_name: String,
    pub rows: Vec<SurveillanceRow>,
}

pub fn load_fluview(path: &Path, target: &str) -> Result<SurveillanceTable, DataError> {
    let df = data::read_table(path)?;
    clean_fluview(&df, target)
}

/// Keys every row by (region, week_start) and keeps `target`.
///
/// Exports that span several report issues can repeat a region-week; the first
/// occurrence is kept.
pub fn clean_fluview(df: &DataFrame, target: &str) -> Result<SurveillanceTable, DataError> {
    if df.height() == 0 {
        return Err(DataError::EmptyInput);
    }
    let regions = data::region_column(df)?;
    let weeks = data::week_start_column(df)?;
    let target_column = data::resolve_column(df, target)?;
    let values = data::numeric_column(df, &target_column)?;

    let mut seen = HashSet::with_capacity(df.height());
    let mut rows = Vec::with_capacity(df.height());
    for ((region, week_start), value) in regions.into_iter().zip(weeks).zip(values) {
        let row = SurveillanceRow {
            region,
            week_start,
            value,
        };
        if seen.insert(row.key()) {
            rows.push(row);
        }
    }

    let repeated = df.height() - rows.len();
    if repeated > 0 {
        log::warn!("Dropped {repeated} repeated region-weeks from the surveillance export");
    }
    log::info!(
        "Cleaned {} surveillance rows for target '{}'",
        rows.len(),
        target_column
    );

    Ok(SurveillanceTable {
        target_name: data::predictor_key(target),
        rows,
    })
}
