//! # Data Loading and Validation Module
//!
//! This module is the exclusive entry point for the combined surveillance + trends
//! table. It reads delimited text with `polars`, validates every required column
//! against a strict schema, and converts the result into the typed `SourceTable`
//! the panel stages consume.
//!
//! - Strict Schema: key columns are not configurable. Rows are keyed by `region`
//!   (or, failing that, `state`, mapped to its HHS region) and by `week_start`
//!   (or, failing that, `epiweek`, mapped to the week's first day).
//! - Fail Fast: unparseable dates, unknown region labels, and non-numeric predictor
//!   text are errors naming the column and row. Nothing is silently coerced.
//! - Missing Is Not Malformed: empty cells and `NaN` in the target or predictor
//!   columns are carried as missing values. The region mean ignores them and the
//!   Lag Feature Builder drops whatever stays incomplete.

use super::types::{RegionId, SourceRow, SourceTable};
use crate::config::PipelineConfig;
use crate::sources::epiweek::Epiweek;
use crate::sources::regions::{parse_region_label, region_for_state};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

pub const REGION_COLUMN: &str = "region";
pub const STATE_COLUMN: &str = "state";
pub const WEEK_START_COLUMN: &str = "week_start";
pub const EPIWEEK_COLUMN: &str = "epiweek";

/// A comprehensive error type for all data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error("Row {row} of key column '{column_name}' is empty. Every row needs a region and a week.")]
    MissingKey { column_name: String, row: usize },
    #[error("Row {row} of column '{column_name}' holds '{value}', which is not a YYYY-MM-DD date.")]
    InvalidDate {
        column_name: String,
        row: usize,
        value: String,
    },
    #[error("Row {row} holds epiweek {value}, which is not a valid YYYYWW epidemiological week.")]
    InvalidEpiweek { row: usize, value: i64 },
    #[error("Row {row} holds region '{value}', which is not an HHS region label.")]
    InvalidRegion { row: usize, value: String },
    #[error("Row {row} holds state '{value}', which belongs to no HHS region.")]
    UnknownState { row: usize, value: String },
    #[error(
        "Non-finite values (Infinity) were found in column '{column_name}' at row {row}. Values must be finite or missing."
    )]
    NonFiniteValuesFound { column_name: String, row: usize },
    #[error("The input table contains no data rows.")]
    EmptyInput,
}

/// Reads a delimited file with a header row. `.tsv` and `.tab` files are tab-separated,
/// everything else is comma-separated.
pub fn read_table(path: &Path) -> Result<DataFrame, DataError> {
    let separator = match path.extension().and_then(|ext| ext.to_str()) {
        Some("tsv") | Some("tab") => b'\t',
        _ => b',',
    };

    log::info!("Loading table from '{}'", path.display());
    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                // Every row takes part in type inference; a late `12.5` or `NaN` must not
                // fail a column whose first rows are whole numbers.
                .with_infer_schema_length(None)
                .with_parse_options(CsvParseOptions::default().with_separator(separator)),
        )
        .finish()?;
    log::info!(
        "Loaded {} rows and {} columns from '{}'",
        df.height(),
        df.width(),
        path.display()
    );
    Ok(df)
}

/// Reads and validates the combined surveillance + trends table.
pub fn load_source_table(path: &Path, config: &PipelineConfig) -> Result<SourceTable, DataError> {
    let df = read_table(path)?;
    source_table_from_frame(&df, config)
}

/// Validates an in-memory table against the schema and converts it to a `SourceTable`.
pub fn source_table_from_frame(
    df: &DataFrame,
    config: &PipelineConfig,
) -> Result<SourceTable, DataError> {
    if df.height() == 0 {
        return Err(DataError::EmptyInput);
    }

    let regions = region_column(df)?;
    let weeks = week_start_column(df)?;

    let target_column = resolve_column(df, &config.target)?;
    let target = numeric_column(df, &target_column)?;

    let mut predictor_names = Vec::with_capacity(config.predictors.len());
    let mut predictor_values = Vec::with_capacity(config.predictors.len());
    for predictor in &config.predictors {
        let column = resolve_column(df, predictor)?;
        predictor_values.push(numeric_column(df, &column)?);
        predictor_names.push(predictor_key(predictor));
    }

    log::info!(
        "Input validation successful: target '{}' and {} predictors across {} rows",
        target_column,
        predictor_names.len(),
        df.height()
    );

    let mut table = SourceTable::new(predictor_key(&config.target), predictor_names);
    table.rows = (0..df.height())
        .map(|i| SourceRow {
            region: regions[i],
            week_start: weeks[i],
            target: target[i],
            predictors: predictor_values.iter().map(|column| column[i]).collect(),
        })
        .collect();
    Ok(table)
}

/// Canonical predictor key: trimmed, with inner spaces turned into underscores.
/// `"flu symptoms"` and `"flu_symptoms"` name the same predictor.
pub fn predictor_key(name: &str) -> String {
    name.trim().replace(' ', "_")
}

/// Finds the input column for a configured name, trying the name as given, then its
/// underscore form, then its space form.
pub fn resolve_column(df: &DataFrame, name: &str) -> Result<String, DataError> {
    let available: HashSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    let candidates = [
        name.to_string(),
        predictor_key(name),
        name.trim().replace('_', " "),
    ];
    candidates
        .into_iter()
        .find(|candidate| available.contains(candidate))
        .ok_or_else(|| DataError::ColumnNotFound(name.to_string()))
}

fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

/// Extracts a numeric column, keeping nulls and `NaN` as missing values.
pub fn numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<Option<f64>>, DataError> {
    let column = df.column(column_name)?;
    let casted = column.cast(&DataType::Float64)?;

    // A non-strict cast turns unparseable text into nulls; any new null is malformed input.
    if casted.null_count() > column.null_count() {
        return Err(DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", column.dtype()),
        });
    }

    let mut values = Vec::with_capacity(casted.len());
    for (row, value) in casted.f64()?.into_iter().enumerate() {
        match value {
            Some(v) if v.is_nan() => values.push(None),
            Some(v) if v.is_infinite() => {
                return Err(DataError::NonFiniteValuesFound {
                    column_name: column_name.to_string(),
                    row,
                });
            }
            other => values.push(other),
        }
    }
    Ok(values)
}

/// Extracts a column as text. Every dtype can be rendered as text, so this never
/// fails on type; nulls stay `None`.
pub fn text_column(df: &DataFrame, column_name: &str) -> Result<Vec<Option<String>>, DataError> {
    let casted = df.column(column_name)?.cast(&DataType::String)?;
    Ok(casted
        .str()?
        .into_iter()
        .map(|value| value.map(|v| v.trim().to_string()))
        .collect())
}

/// Extracts a key column as text, rejecting empty cells.
fn required_text_column(df: &DataFrame, column_name: &str) -> Result<Vec<String>, DataError> {
    text_column(df, column_name)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| match value {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(DataError::MissingKey {
                column_name: column_name.to_string(),
                row,
            }),
        })
        .collect()
}

/// Resolves each row's HHS region from `region`, or from `state` when `region` is absent.
pub fn region_column(df: &DataFrame) -> Result<Vec<RegionId>, DataError> {
    if has_column(df, REGION_COLUMN) {
        let labels = required_text_column(df, REGION_COLUMN)?;
        return labels
            .into_iter()
            .enumerate()
            .map(|(row, label)| {
                parse_region_label(&label).ok_or(DataError::InvalidRegion { row, value: label })
            })
            .collect();
    }
    if has_column(df, STATE_COLUMN) {
        log::info!("No '{REGION_COLUMN}' column; mapping '{STATE_COLUMN}' to HHS regions");
        let states = required_text_column(df, STATE_COLUMN)?;
        return states
            .into_iter()
            .enumerate()
            .map(|(row, state)| {
                region_for_state(&state).ok_or(DataError::UnknownState { row, value: state })
            })
            .collect();
    }
    Err(DataError::ColumnNotFound(REGION_COLUMN.to_string()))
}

/// Resolves each row's week from `week_start`, or from `epiweek` when `week_start` is absent.
pub fn week_start_column(df: &DataFrame) -> Result<Vec<NaiveDate>, DataError> {
    if has_column(df, WEEK_START_COLUMN) {
        return date_column(df, WEEK_START_COLUMN);
    }
    if has_column(df, EPIWEEK_COLUMN) {
        log::info!("No '{WEEK_START_COLUMN}' column; deriving it from '{EPIWEEK_COLUMN}'");
        return epiweek_column(df, EPIWEEK_COLUMN);
    }
    Err(DataError::ColumnNotFound(WEEK_START_COLUMN.to_string()))
}

/// Parses a column of ISO dates. A trailing time component (`2021-01-03 00:00:00`,
/// `2021-01-03T00:00:00Z`) is accepted and discarded.
pub fn date_column(df: &DataFrame, column_name: &str) -> Result<Vec<NaiveDate>, DataError> {
    required_text_column(df, column_name)?
        .into_iter()
        .enumerate()
        .map(|(row, text)| {
            parse_date(&text).ok_or_else(|| DataError::InvalidDate {
                column_name: column_name.to_string(),
                row,
                value: text,
            })
        })
        .collect()
}

/// Maps a column of `YYYYWW` epiweeks to the Sunday each week starts on.
pub fn epiweek_column(df: &DataFrame, column_name: &str) -> Result<Vec<NaiveDate>, DataError> {
    let column = df.column(column_name)?;
    let casted = column.cast(&DataType::Int64)?;
    if casted.null_count() > column.null_count() {
        return Err(DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "i64 (YYYYWW)",
            found_type: format!("{:?}", column.dtype()),
        });
    }

    casted
        .i64()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            let value = value.ok_or_else(|| DataError::MissingKey {
                column_name: column_name.to_string(),
                row,
            })?;
            Epiweek::from_code(value)
                .and_then(|ew| ew.start_date())
                .ok_or(DataError::InvalidEpiweek { row, value })
        })
        .collect()
}

/// Parses `YYYY-MM-DD`, ignoring a time component separated by a space or `T`.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    let date_part = match text.find([' ', 'T']) {
        Some(idx) => &text[..idx],
        None => text,
    };
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::{self, Write};
    use tempfile::{Builder, NamedTempFile};

    /// A robust helper to create a temporary delimited file for testing.
    fn create_test_file(content: &str, suffix: &str) -> io::Result<NamedTempFile> {
        let mut file = Builder::new().suffix(suffix).tempfile()?;
        writeln!(file, "{}", content)?;
        file.flush()?;
        Ok(file)
    }

    fn config(predictors: &[&str]) -> PipelineConfig {
        PipelineConfig {
            predictors: predictors.iter().map(|p| p.to_string()).collect(),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn loads_state_level_rows_with_missing_values() {
        let content = "region,state,week_start,wili,flu,flu symptoms\n\
                       1,CT,2021-01-03,1.5,40,12\n\
                       1,MA,2021-01-03,2.5,,14\n\
                       2,NY,2021-01-10 00:00:00,3.0,NaN,10";
        let file = create_test_file(content, ".csv").unwrap();
        let table = load_source_table(file.path(), &config(&["flu", "flu symptoms"])).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.target_name, "wili");
        assert_eq!(table.predictor_names, vec!["flu", "flu_symptoms"]);
        assert_eq!(table.rows[0].region, 1);
        assert_eq!(table.rows[2].week_start, NaiveDate::from_ymd_opt(2021, 1, 10).unwrap());
        assert_abs_diff_eq!(table.rows[1].target.unwrap(), 2.5, epsilon = 1e-12);
        assert_eq!(table.rows[1].predictors[0], None);
        assert_eq!(table.rows[2].predictors[0], None);
        assert_abs_diff_eq!(table.rows[1].predictors[1].unwrap(), 14.0, epsilon = 1e-12);
    }

    #[test]
    fn tab_separated_files_are_detected_by_extension() {
        let content = "region\tweek_start\twili\tflu\nhhs4\t2021-01-03\t1.0\t5.0";
        let file = create_test_file(content, ".tsv").unwrap();
        let table = load_source_table(file.path(), &config(&["flu"])).unwrap();
        assert_eq!(table.rows[0].region, 4);
    }

    #[test]
    fn state_and_epiweek_fallbacks_fill_the_keys() {
        let content = "state,epiweek,wili,flu\nTX,202101,2.0,7\nWA,202053,1.0,8";
        let file = create_test_file(content, ".csv").unwrap();
        let table = load_source_table(file.path(), &config(&["flu"])).unwrap();
        assert_eq!(table.rows[0].region, 6);
        assert_eq!(table.rows[1].region, 10);
        assert_eq!(table.rows[0].week_start, NaiveDate::from_ymd_opt(2021, 1, 3).unwrap());
        assert_eq!(table.rows[1].week_start, NaiveDate::from_ymd_opt(2020, 12, 27).unwrap());
    }

    #[test]
    fn test_error_column_not_found() {
        let content = "region,week_start,wili,flu\n1,2021-01-03,1.0,2.0";
        let file = create_test_file(content, ".csv").unwrap();
        match load_source_table(file.path(), &config(&["flu", "cough"])) {
            Err(DataError::ColumnNotFound(col)) => assert_eq!(col, "cough"),
            other => panic!("Expected ColumnNotFound(cough), got {:?}", other),
        }
    }

    #[test]
    fn test_error_missing_key_columns() {
        let content = "week_start,wili,flu\n2021-01-03,1.0,2.0";
        let file = create_test_file(content, ".csv").unwrap();
        match load_source_table(file.path(), &config(&["flu"])) {
            Err(DataError::ColumnNotFound(col)) => assert_eq!(col, "region"),
            other => panic!("Expected ColumnNotFound(region), got {:?}", other),
        }
    }

    #[test]
    fn test_error_wrong_type() {
        let content = "region,week_start,wili,flu\n1,2021-01-03,1.0,2.0\n1,2021-01-10,1.0,lots";
        let file = create_test_file(content, ".csv").unwrap();
        match load_source_table(file.path(), &config(&["flu"])) {
            Err(DataError::ColumnWrongType {
                column_name,
                expected_type,
                found_type,
            }) => {
                assert_eq!(column_name, "flu");
                assert_eq!(expected_type, "f64 (numeric)");
                assert!(
                    found_type.contains("String") || found_type.contains("str"),
                    "Expected found_type to indicate text, got {}",
                    found_type
                );
            }
            other => panic!("Expected ColumnWrongType for 'flu', got {:?}", other),
        }
    }

    #[test]
    fn late_fractional_and_nan_values_do_not_fail_integer_looking_columns() {
        let mut content = String::from("region,week_start,wili,flu");
        let start = NaiveDate::from_ymd_opt(2019, 8, 4).unwrap();
        for i in 0..150 {
            let week = start + chrono::Duration::weeks(i);
            let flu = match i {
                140 => "12.5".to_string(),
                145 => "NaN".to_string(),
                _ => (i % 90).to_string(),
            };
            content.push_str(&format!("\n1,{week},{},{flu}", i % 7));
        }
        let file = create_test_file(&content, ".csv").unwrap();
        let table = load_source_table(file.path(), &config(&["flu"])).unwrap();

        assert_eq!(table.len(), 150);
        assert_abs_diff_eq!(table.rows[139].predictors[0].unwrap(), 49.0, epsilon = 1e-12);
        assert_abs_diff_eq!(table.rows[140].predictors[0].unwrap(), 12.5, epsilon = 1e-12);
        assert_eq!(table.rows[145].predictors[0], None);
        assert_abs_diff_eq!(table.rows[149].target.unwrap(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn late_text_in_a_numeric_column_is_a_wrong_type_error() {
        let mut content = String::from("region,week_start,wili,flu");
        let start = NaiveDate::from_ymd_opt(2019, 8, 4).unwrap();
        for i in 0..150 {
            let week = start + chrono::Duration::weeks(i);
            let flu = if i == 140 { "lots".to_string() } else { i.to_string() };
            content.push_str(&format!("\n1,{week},1.0,{flu}"));
        }
        let file = create_test_file(&content, ".csv").unwrap();
        match load_source_table(file.path(), &config(&["flu"])) {
            Err(DataError::ColumnWrongType { column_name, .. }) => assert_eq!(column_name, "flu"),
            other => panic!("Expected ColumnWrongType for 'flu', got {:?}", other),
        }
    }

    #[test]
    fn test_error_invalid_date() {
        let content = "region,week_start,wili,flu\n1,2021-01-03,1.0,2.0\n1,01/10/2021,1.0,3.0";
        let file = create_test_file(content, ".csv").unwrap();
        match load_source_table(file.path(), &config(&["flu"])) {
            Err(DataError::InvalidDate { column_name, row, value }) => {
                assert_eq!(column_name, "week_start");
                assert_eq!(row, 1);
                assert_eq!(value, "01/10/2021");
            }
            other => panic!("Expected InvalidDate, got {:?}", other),
        }
    }

    #[test]
    fn test_error_invalid_region_and_state() {
        let content = "region,week_start,wili,flu\nnorth,2021-01-03,1.0,2.0";
        let file = create_test_file(content, ".csv").unwrap();
        assert!(matches!(
            load_source_table(file.path(), &config(&["flu"])),
            Err(DataError::InvalidRegion { row: 0, .. })
        ));

        let content = "state,week_start,wili,flu\nZZ,2021-01-03,1.0,2.0";
        let file = create_test_file(content, ".csv").unwrap();
        assert!(matches!(
            load_source_table(file.path(), &config(&["flu"])),
            Err(DataError::UnknownState { row: 0, .. })
        ));
    }

    #[test]
    fn test_error_invalid_epiweek() {
        let content = "region,epiweek,wili,flu\n1,202061,1.0,2.0";
        let file = create_test_file(content, ".csv").unwrap();
        match load_source_table(file.path(), &config(&["flu"])) {
            Err(DataError::InvalidEpiweek { row, value }) => {
                assert_eq!(row, 0);
                assert_eq!(value, 202061);
            }
            other => panic!("Expected InvalidEpiweek, got {:?}", other),
        }
    }

    #[test]
    fn test_error_infinite_values() {
        let content = "region,week_start,wili,flu\n1,2021-01-03,inf,2.0";
        let file = create_test_file(content, ".csv").unwrap();
        match load_source_table(file.path(), &config(&["flu"])) {
            Err(DataError::NonFiniteValuesFound { column_name, row }) => {
                assert_eq!(column_name, "wili");
                assert_eq!(row, 0);
            }
            other => panic!("Expected NonFiniteValuesFound, got {:?}", other),
        }
    }

    #[test]
    fn test_error_empty_input() {
        let file = create_test_file("region,week_start,wili,flu", ".csv").unwrap();
        assert!(matches!(
            load_source_table(file.path(), &config(&["flu"])),
            Err(DataError::EmptyInput)
        ));
    }

    #[test]
    fn dates_accept_trailing_time_components() {
        let expected = NaiveDate::from_ymd_opt(2022, 3, 6);
        assert_eq!(parse_date("2022-03-06"), expected);
        assert_eq!(parse_date(" 2022-03-06 00:00:00 "), expected);
        assert_eq!(parse_date("2022-03-06T00:00:00Z"), expected);
        assert_eq!(parse_date("2022-13-06"), None);
        assert_eq!(parse_date("March 6"), None);
    }
}
