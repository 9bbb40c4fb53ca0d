//! Joins state-level trend rows with regional surveillance rows.
//!
//! The join is inner on (region, week_start): each trend row picks up its region's
//! surveillance value for that week, and trend rows without a surveillance match are
//! dropped. The result stays at state granularity; averaging happens downstream.

use super::fluview::SurveillanceTable;
use super::trends::TrendTable;
use crate::panel::types::{RegionWeek, SourceRow, SourceTable};
use ahash::AHashMap;

/// A joined row: the source row the pipeline consumes, plus the originating state.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedRow {
    pub state: Option<String>,
    pub source: SourceRow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombinedTable {
    pub target_name: String,
    pub predictor_names: Vec<String>,
    pub rows: Vec<CombinedRow>,
}

impl CombinedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_source_table(&self) -> SourceTable {
        let mut table = SourceTable::new(self.target_name.clone(), self.predictor_names.clone());
        table.rows = self.rows.iter().map(|row| row.source.clone()).collect();
        table
    }
}

/// Inner-joins `trends` with `surveillance` on (region, week_start), keeping trend order.
pub fn combine_sources(trends: &TrendTable, surveillance: &SurveillanceTable) -> CombinedTable {
    let targets: AHashMap<RegionWeek, Option<f64>> = surveillance
        .rows
        .iter()
        .map(|row| (row.key(), row.value))
        .collect();

    let rows: Vec<CombinedRow> = trends
        .rows
        .iter()
        .filter_map(|trend| {
            let key = RegionWeek {
                region: trend.region,
                week_start: trend.week_start,
            };
            let target = targets.get(&key)?;
            Some(CombinedRow {
                state: trend.state.clone(),
                source: SourceRow {
                    region: trend.region,
                    week_start: trend.week_start,
                    target: *target,
                    predictors: trend.values.clone(),
                },
            })
        })
        .collect();

    let unmatched = trends.rows.len() - rows.len();
    if unmatched > 0 {
        log::warn!("{unmatched} trend rows had no surveillance row for their region-week and were dropped");
    }
    log::info!(
        "Combined {} trend rows with {} surveillance rows into {} source rows",
        trends.rows.len(),
        surveillance.rows.len(),
        rows.len()
    );

    CombinedTable {
        target_name: surveillance.target_name.clone(),
        predictor_names: trends.keyword_names.clone(),
        rows,
    }
}
