//! # Region Aggregator
//!
//! Collapses state-level rows into per-(region, week) means and broadcasts each mean
//! back onto every row that contributed to it. The broadcast is a many-to-one left join,
//! so the output has exactly as many rows as the input, in the same order.
//!
//! Missing values do not contribute to a mean. A region-week whose values are all
//! missing keeps a missing average, which the Lag Feature Builder later drops.

use super::types::{AveragedRow, AveragedTable, RegionWeek, SourceTable};
use ahash::AHashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("The source table contains no rows; there is nothing to aggregate.")]
    EmptySource,
    #[error(
        "Row {row} carries {found} predictor values, but the table declares {expected} predictors."
    )]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },
}

/// Running sums for one column of one region-week.
#[derive(Debug, Clone, Copy, Default)]
struct MeanAccumulator {
    sum: f64,
    count: usize,
}

impl MeanAccumulator {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Per-region-week means of the target and every predictor.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionWeekMeans {
    pub key: RegionWeek,
    pub target: Option<f64>,
    pub predictors: Vec<Option<f64>>,
}

/// The grouped means plus, for every source row, the index of its group.
#[derive(Debug, Clone)]
pub struct RegionAverages {
    /// One entry per region-week, in order of first appearance.
    pub groups: Vec<RegionWeekMeans>,
    /// `row_groups[i]` indexes `groups` for source row `i`.
    pub row_groups: Vec<usize>,
}

/// Groups the table by (region, week_start) and averages each column within a group.
pub fn compute_region_averages(table: &SourceTable) -> Result<RegionAverages, AggregateError> {
    if table.is_empty() {
        return Err(AggregateError::EmptySource);
    }
    let num_predictors = table.predictor_names.len();

    let mut group_of_key: AHashMap<RegionWeek, usize> = AHashMap::new();
    let mut keys: Vec<RegionWeek> = Vec::new();
    let mut accumulators: Vec<(MeanAccumulator, Vec<MeanAccumulator>)> = Vec::new();
    let mut row_groups = Vec::with_capacity(table.len());

    for (row_idx, row) in table.rows.iter().enumerate() {
        if row.predictors.len() != num_predictors {
            return Err(AggregateError::RaggedRow {
                row: row_idx,
                found: row.predictors.len(),
                expected: num_predictors,
            });
        }
        let group = *group_of_key.entry(row.key()).or_insert_with(|| {
            keys.push(row.key());
            accumulators.push((
                MeanAccumulator::default(),
                vec![MeanAccumulator::default(); num_predictors],
            ));
            keys.len() - 1
        });
        row_groups.push(group);

        let (target_acc, predictor_accs) = &mut accumulators[group];
        target_acc.push(row.target);
        for (acc, &value) in predictor_accs.iter_mut().zip(&row.predictors) {
            acc.push(value);
        }
    }

    log::debug!(
        "Aggregated {} source rows into {} region-weeks",
        table.len(),
        keys.len()
    );

    let groups = keys
        .into_iter()
        .zip(accumulators)
        .map(|(key, (target_acc, predictor_accs))| RegionWeekMeans {
            key,
            target: target_acc.mean(),
            predictors: predictor_accs.iter().map(MeanAccumulator::mean).collect(),
        })
        .collect();

    Ok(RegionAverages { groups, row_groups })
}

/// Attaches each row's region-week means to it. Row count and row order are preserved.
pub fn broadcast_region_averages(table: &SourceTable) -> Result<AveragedTable, AggregateError> {
    let averages = compute_region_averages(table)?;

    let rows: Vec<AveragedRow> = table
        .rows
        .iter()
        .zip(&averages.row_groups)
        .map(|(row, &group)| {
            let means = &averages.groups[group];
            AveragedRow {
                source: row.clone(),
                target_avg: means.target,
                predictor_avgs: means.predictors.clone(),
            }
        })
        .collect();

    log::info!(
        "Region aggregation complete: {} rows over {} region-weeks, {} predictors averaged",
        rows.len(),
        averages.groups.len(),
        table.predictor_names.len()
    );

    Ok(AveragedTable {
        target_name: table.target_name.clone(),
        predictor_names: table.predictor_names.clone(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::types::SourceRow;
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    fn week(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, d).unwrap()
    }

    fn row(region: u32, day: u32, target: Option<f64>, flu: Option<f64>) -> SourceRow {
        SourceRow {
            region,
            week_start: week(day),
            target,
            predictors: vec![flu],
        }
    }

    fn table(rows: Vec<SourceRow>) -> SourceTable {
        let mut table = SourceTable::new("wili", vec!["flu".to_string()]);
        table.rows = rows;
        table
    }

    #[test]
    fn output_row_count_equals_input_row_count() {
        let input = table(vec![
            row(1, 3, Some(1.0), Some(10.0)),
            row(1, 3, Some(3.0), Some(30.0)),
            row(1, 10, Some(2.0), Some(20.0)),
            row(2, 3, Some(5.0), Some(50.0)),
            row(2, 3, Some(7.0), Some(70.0)),
            row(2, 3, Some(9.0), Some(90.0)),
        ]);
        let averaged = broadcast_region_averages(&input).unwrap();
        assert_eq!(averaged.rows.len(), input.len());

        // Input order survives, and the mean is broadcast to every contributor.
        for (out, original) in averaged.rows.iter().zip(&input.rows) {
            assert_eq!(&out.source, original);
        }
        assert_abs_diff_eq!(averaged.rows[0].target_avg.unwrap(), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(averaged.rows[1].predictor_avgs[0].unwrap(), 20.0, epsilon = 1e-12);
        assert_abs_diff_eq!(averaged.rows[5].target_avg.unwrap(), 7.0, epsilon = 1e-12);
        assert_abs_diff_eq!(averaged.rows[3].predictor_avgs[0].unwrap(), 70.0, epsilon = 1e-12);
    }

    #[test]
    fn single_contributor_average_equals_its_value() {
        let averaged = broadcast_region_averages(&table(vec![row(4, 17, Some(2.5), Some(41.0))])).unwrap();
        assert_eq!(averaged.rows[0].target_avg, Some(2.5));
        assert_eq!(averaged.rows[0].predictor_avgs, vec![Some(41.0)]);
    }

    #[test]
    fn missing_values_are_excluded_from_the_mean() {
        let averaged = broadcast_region_averages(&table(vec![
            row(1, 3, Some(1.0), None),
            row(1, 3, None, Some(6.0)),
            row(1, 10, None, None),
        ]))
        .unwrap();
        assert_eq!(averaged.rows[0].target_avg, Some(1.0));
        assert_eq!(averaged.rows[0].predictor_avgs, vec![Some(6.0)]);
        assert_eq!(averaged.rows[2].target_avg, None);
        assert_eq!(averaged.rows[2].predictor_avgs, vec![None]);
    }

    #[test]
    fn groups_are_listed_in_first_appearance_order() {
        let averages = compute_region_averages(&table(vec![
            row(2, 10, Some(1.0), Some(1.0)),
            row(1, 3, Some(1.0), Some(1.0)),
            row(2, 10, Some(3.0), Some(3.0)),
        ]))
        .unwrap();
        assert_eq!(averages.groups.len(), 2);
        assert_eq!(averages.groups[0].key.region, 2);
        assert_eq!(averages.groups[1].key.region, 1);
        assert_eq!(averages.row_groups, vec![0, 1, 0]);
        assert_eq!(averages.groups[0].target, Some(2.0));
    }

    #[test]
    fn empty_source_is_rejected() {
        assert!(matches!(
            broadcast_region_averages(&table(vec![])),
            Err(AggregateError::EmptySource)
        ));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let mut bad = row(1, 3, Some(1.0), Some(1.0));
        bad.predictors.push(Some(2.0));
        match broadcast_region_averages(&table(vec![row(1, 3, Some(1.0), Some(1.0)), bad])) {
            Err(AggregateError::RaggedRow { row, found, expected }) => {
                assert_eq!((row, found, expected), (1, 2, 1));
            }
            other => panic!("Expected RaggedRow, got {:?}", other),
        }
    }
}
