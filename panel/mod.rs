//! Panel construction: input loading, region averaging, de-duplication with
//! season labels, and lagged feature construction.

pub mod aggregate;
pub mod data;
pub mod lags;
pub mod season;
pub mod types;

use self::season::assign_season;
use self::types::{AveragedTable, Panel, PanelRow, RegionWeek};
use std::collections::BTreeMap;

/// Collapses the broadcast table to one row per (region, week_start), labels each row
/// with its season, and sorts by region then week.
///
/// When several rows share a key, the first in input order is kept. All rows of a key
/// carry identical averages, so the choice never changes a value.
pub fn build_region_panel(averaged: &AveragedTable) -> Panel {
    let mut unique: BTreeMap<RegionWeek, PanelRow> = BTreeMap::new();
    for row in &averaged.rows {
        unique.entry(row.source.key()).or_insert_with(|| PanelRow {
            region: row.source.region,
            week_start: row.source.week_start,
            season: assign_season(row.source.week_start),
            target: row.target_avg,
            predictors: row.predictor_avgs.clone(),
        });
    }

    log::info!(
        "De-duplicated {} averaged rows into {} region-weeks",
        averaged.rows.len(),
        unique.len()
    );

    Panel {
        target_name: averaged.target_name.clone(),
        predictor_names: averaged.predictor_names.clone(),
        rows: unique.into_values().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::aggregate::broadcast_region_averages;
    use super::*;
    use crate::panel::types::{SourceRow, SourceTable};
    use chrono::NaiveDate;

    fn source(rows: &[(u32, (i32, u32, u32), f64)]) -> SourceTable {
        let mut table = SourceTable::new("wili", vec!["flu".to_string()]);
        table.rows = rows
            .iter()
            .map(|&(region, (y, m, d), value)| SourceRow {
                region,
                week_start: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
                target: Some(value),
                predictors: vec![Some(value * 10.0)],
            })
            .collect();
        table
    }

    #[test]
    fn one_row_per_region_week_sorted_with_seasons() {
        let table = source(&[
            (2, (2021, 1, 3), 1.0),
            (1, (2020, 8, 2), 2.0),
            (2, (2021, 1, 3), 3.0),
            (1, (2020, 7, 26), 4.0),
        ]);
        let panel = build_region_panel(&broadcast_region_averages(&table).unwrap());

        assert_eq!(panel.len(), 3);
        let keys: Vec<(u32, NaiveDate, i32)> = panel
            .rows
            .iter()
            .map(|r| (r.region, r.week_start, r.season))
            .collect();
        assert_eq!(
            keys,
            vec![
                (1, NaiveDate::from_ymd_opt(2020, 7, 26).unwrap(), 2019),
                (1, NaiveDate::from_ymd_opt(2020, 8, 2).unwrap(), 2020),
                (2, NaiveDate::from_ymd_opt(2021, 1, 3).unwrap(), 2020),
            ]
        );
        assert_eq!(panel.rows[2].target, Some(2.0));
        assert_eq!(panel.rows[2].predictors, vec![Some(20.0)]);
    }
}
