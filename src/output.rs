//! Table writers for backtest results, the lag-aligned panel, and combined source tables.
//!
//! Delimited files are tab-separated when the path ends in `.tsv` and comma-separated
//! otherwise. JSON output mirrors the prediction service's response body.

use crate::backtest::BacktestReport;
use crate::backtest::format::{format_coefficients, format_predictions};
use crate::panel::types::{LaggedPanel, region_average_column};
use crate::sources::combine::CombinedTable;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// On-disk format of the predictions and coefficients tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Tsv,
    Json,
}

/// The JSON body shape: both tables side by side.
#[derive(Serialize)]
struct PredsResponse<'a, P: Serialize, C: Serialize> {
    predictions: &'a [P],
    coefficients: &'a [C],
}

fn prepare_output_path(path: &Path) -> Result<(), io::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("tsv") | Some("tab") => b'\t',
        _ => b',',
    }
}

fn open_delimited(path: &Path) -> Result<csv::Writer<BufWriter<File>>, OutputError> {
    prepare_output_path(path)?;
    let file = File::create(path)?;
    Ok(csv::WriterBuilder::new()
        .delimiter(delimiter_for(path))
        .from_writer(BufWriter::new(file)))
}

/// Writes serializable rows with a header taken from the field names. An empty slice
/// produces an empty file.
pub fn write_records<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), OutputError> {
    let mut writer = open_delimited(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), OutputError> {
    prepare_output_path(path)?;
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Writes the backtest tables into `dir` and returns the paths written.
///
/// `Tsv` writes `predictions.tsv` and `coefficients.tsv`; `Json` writes both tables into
/// `preds.json`. Either way `models.tsv` holds the per-model summaries, and
/// `skipped.tsv` lists skipped fits when there are any. Tables carry display labels
/// unless `raw` is set.
pub fn write_report(
    report: &BacktestReport,
    dir: &Path,
    format: TableFormat,
    raw: bool,
) -> Result<Vec<PathBuf>, OutputError> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    match (format, raw) {
        (TableFormat::Tsv, true) => {
            written.push(write_table(dir, "predictions.tsv", &report.predictions)?);
            written.push(write_table(dir, "coefficients.tsv", &report.coefficients)?);
        }
        (TableFormat::Tsv, false) => {
            let predictions = format_predictions(&report.predictions);
            let coefficients = format_coefficients(&report.coefficients);
            written.push(write_table(dir, "predictions.tsv", &predictions)?);
            written.push(write_table(dir, "coefficients.tsv", &coefficients)?);
        }
        (TableFormat::Json, true) => {
            let path = dir.join("preds.json");
            write_json(
                &path,
                &PredsResponse {
                    predictions: &report.predictions,
                    coefficients: &report.coefficients,
                },
            )?;
            written.push(path);
        }
        (TableFormat::Json, false) => {
            let predictions = format_predictions(&report.predictions);
            let coefficients = format_coefficients(&report.coefficients);
            let path = dir.join("preds.json");
            write_json(
                &path,
                &PredsResponse {
                    predictions: &predictions,
                    coefficients: &coefficients,
                },
            )?;
            written.push(path);
        }
    }

    written.push(write_table(dir, "models.tsv", &report.models)?);
    if report.is_partial() {
        written.push(write_table(dir, "skipped.tsv", &report.skipped)?);
    }
    Ok(written)
}

fn write_table<T: Serialize>(dir: &Path, name: &str, rows: &[T]) -> Result<PathBuf, OutputError> {
    let path = dir.join(name);
    write_records(&path, rows)?;
    log::info!("Wrote {} rows to '{}'", rows.len(), path.display());
    Ok(path)
}

/// Writes the lag-aligned panel as one wide table: keys, season, the averaged target,
/// the unlagged averages, then every lag column in feature order.
pub fn write_panel(path: &Path, panel: &LaggedPanel) -> Result<(), OutputError> {
    let mut writer = open_delimited(path)?;

    let mut header = vec![
        "region".to_string(),
        "week_start".to_string(),
        "season".to_string(),
        region_average_column(&panel.target_name),
    ];
    header.extend(panel.predictor_names.iter().map(|p| region_average_column(p)));
    header.extend(panel.features.iter().map(|f| f.column_name()));
    writer.write_record(&header)?;

    for (i, key) in panel.keys.iter().enumerate() {
        let mut record = vec![
            key.region.to_string(),
            key.week_start.to_string(),
            key.season.to_string(),
            panel.target[i].to_string(),
        ];
        record.extend(panel.current.row(i).iter().map(|v| v.to_string()));
        record.extend(panel.lagged.row(i).iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    log::info!("Wrote {} panel rows to '{}'", panel.len(), path.display());
    Ok(())
}

/// Writes a combined source table in the layout `load_source_table` reads back.
pub fn write_combined(path: &Path, table: &CombinedTable) -> Result<(), OutputError> {
    let mut writer = open_delimited(path)?;

    let mut header = vec![
        "region".to_string(),
        "state".to_string(),
        "week_start".to_string(),
        table.target_name.clone(),
    ];
    header.extend(table.predictor_names.iter().cloned());
    writer.write_record(&header)?;

    let cell = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();
    for row in &table.rows {
        let mut record = vec![
            row.source.region.to_string(),
            row.state.clone().unwrap_or_default(),
            row.source.week_start.to_string(),
            cell(row.source.target),
        ];
        record.extend(row.source.predictors.iter().map(|&v| cell(v)));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    log::info!("Wrote {} combined rows to '{}'", table.len(), path.display());
    Ok(())
}
