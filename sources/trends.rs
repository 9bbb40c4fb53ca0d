//! State-level search-interest exports.
//!
//! Each row is one state in one week with one column per tracked keyword. The week is
//! read from `date` (the trends export convention) or `week_start`. The HHS region is
//! read from `region` when present and derived from `state` otherwise.
//!
//! Trend dates are moved back to the Sunday their epiweek starts on, so exports keyed
//! by any day of the week join the surveillance weeks.

use crate::panel::data::{self, DataError, STATE_COLUMN, WEEK_START_COLUMN};
use crate::panel::types::RegionId;
use crate::sources::epiweek::Epiweek;
use crate::sources::regions::normalize_state;
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use std::path::Path;

pub const DATE_COLUMN: &str = "date";

#[derive(Debug, Clone, PartialEq)]
pub struct TrendRow {
    pub state: Option<String>,
    pub region: RegionId,
    pub week_start: NaiveDate,
    /// One value per keyword, in `TrendTable::keyword_names` order.
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendTable {
    pub keyword_names: Vec<String>,
    pub rows: Vec<TrendRow>,
}

pub fn load_trends(path: &Path, keywords: &[String]) -> Result<TrendTable, DataError> {
    let df = data::read_table(path)?;
    trends_from_frame(&df, keywords)
}

pub fn trends_from_frame(df: &DataFrame, keywords: &[String]) -> Result<TrendTable, DataError> {
    if df.height() == 0 {
        return Err(DataError::EmptyInput);
    }
    let has = |name: &str| df.get_column_names().iter().any(|c| c.as_str() == name);

    let (week_column, dates) = if has(DATE_COLUMN) {
        (DATE_COLUMN, data::date_column(df, DATE_COLUMN)?)
    } else {
        (WEEK_START_COLUMN, data::week_start_column(df)?)
    };
    let weeks = snap_to_epiweek_starts(week_column, dates)?;
    let regions = data::region_column(df)?;
    let states: Vec<Option<String>> = if has(STATE_COLUMN) {
        data::text_column(df, STATE_COLUMN)?
            .into_iter()
            .map(|s| s.map(|code| normalize_state(&code)))
            .collect()
    } else {
        vec![None; df.height()]
    };

    let mut keyword_values = Vec::with_capacity(keywords.len());
    for keyword in keywords {
        let column = data::resolve_column(df, keyword)?;
        keyword_values.push(data::numeric_column(df, &column)?);
    }

    let rows = (0..df.height())
        .map(|i| TrendRow {
            state: states[i].clone(),
            region: regions[i],
            week_start: weeks[i],
            values: keyword_values.iter().map(|column| column[i]).collect(),
        })
        .collect::<Vec<_>>();

    log::info!(
        "Loaded {} trend rows for {} keywords",
        rows.len(),
        keywords.len()
    );

    Ok(TrendTable {
        keyword_names: keywords.iter().map(|k| data::predictor_key(k)).collect(),
        rows,
    })
}

/// Maps every date to the start of its epiweek.
fn snap_to_epiweek_starts(
    column_name: &str,
    dates: Vec<NaiveDate>,
) -> Result<Vec<NaiveDate>, DataError> {
    let mut moved = 0usize;
    let weeks = dates
        .into_iter()
        .enumerate()
        .map(|(row, date)| {
            let start = Epiweek::from_date(date)
                .and_then(|ew| ew.start_date())
                .ok_or_else(|| DataError::InvalidDate {
                    column_name: column_name.to_string(),
                    row,
                    value: date.to_string(),
                })?;
            if start != date {
                moved += 1;
            }
            Ok(start)
        })
        .collect::<Result<Vec<_>, DataError>>()?;
    if moved > 0 {
        log::info!("Moved {moved} trend dates back to the start of their epiweek");
    }
    Ok(weeks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn regions_are_derived_from_states_and_keywords_are_matched_by_key() {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(
            file,
            "date,flu,sore throat,state\n\
             2021-01-03,55,10,US-TX\n\
             2021-01-03,48,,ny"
        )
        .unwrap();
        file.flush().unwrap();

        let keywords = vec!["flu".to_string(), "sore_throat".to_string()];
        let table = load_trends(file.path(), &keywords).unwrap();

        assert_eq!(table.keyword_names, vec!["flu", "sore_throat"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].region, 6);
        assert_eq!(table.rows[0].state.as_deref(), Some("TX"));
        assert_eq!(table.rows[1].region, 2);
        assert_eq!(table.rows[1].values, vec![Some(48.0), None]);
    }

    #[test]
    fn mid_week_dates_land_on_their_epiweek_sunday() {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(
            file,
            "date,state,flu\n2021-01-06,TX,55\n2021-01-02,TX,50\n2021-01-03,TX,52"
        )
        .unwrap();
        file.flush().unwrap();

        let table = load_trends(file.path(), &["flu".to_string()]).unwrap();
        let weeks: Vec<NaiveDate> = table.rows.iter().map(|r| r.week_start).collect();
        let date = |y: i32, m: u32, d: u32| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert_eq!(weeks, vec![date(2021, 1, 3), date(2020, 12, 27), date(2021, 1, 3)]);
    }

    #[test]
    fn an_explicit_region_column_wins_over_the_state() {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "date,flu,state,region\n2021-01-03,55,TX,5").unwrap();
        file.flush().unwrap();

        let table = load_trends(file.path(), &["flu".to_string()]).unwrap();
        assert_eq!(table.rows[0].region, 5);
    }
}
