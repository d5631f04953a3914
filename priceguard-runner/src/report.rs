//! Report artifacts: the dated quarantine report and per-symbol forecast CSVs.
//!
//! Both are written to a temporary sibling file and renamed into place, so
//! readers (the dashboard) never see a half-written file.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use priceguard_core::forecast::Forecast;

use crate::aggregator::{AggregationError, QuarantineAggregator};

pub const REPORT_COLUMNS: [&str; 5] = ["symbol", "timestamp", "close", "reason", "stage"];
pub const FORECAST_COLUMNS: [&str; 4] = ["ds", "yhat", "yhat_lower", "yhat_upper"];

/// `<dir>/QUARANTINE_REPORT_<YYYY_MM_DD>.csv`
pub fn report_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("QUARANTINE_REPORT_{}.csv", date.format("%Y_%m_%d")))
}

/// `<dir>/<symbol>_forecast.csv`, the name the dashboard looks up by ticker.
///
/// The ticker is kept as is (`EURUSD=X_forecast.csv`); only characters that
/// cannot appear in a file name become `_`.
pub fn forecast_path(dir: &Path, symbol: &str) -> PathBuf {
    let name: String = symbol
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    dir.join(format!("{name}_forecast.csv"))
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Write `path` through a temporary sibling and rename it into place.
fn write_atomically<F>(path: &Path, write: F) -> Result<(), AggregationError>
where
    F: FnOnce(&mut csv::Writer<File>) -> Result<(), csv::Error>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    let result = (|| {
        let mut wtr = csv::Writer::from_path(&tmp)?;
        write(&mut wtr)?;
        wtr.flush()?;
        Ok::<_, AggregationError>(())
    })();

    match result {
        Ok(()) => {
            fs::rename(&tmp, path)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// Write the quarantine report for `date`.
///
/// Returns `None` without touching the filesystem when there is nothing to
/// report. An existing report for the same date is overwritten.
pub fn write_report(
    dir: &Path,
    date: NaiveDate,
    aggregator: &QuarantineAggregator,
) -> Result<Option<PathBuf>, AggregationError> {
    if aggregator.is_empty() {
        return Ok(None);
    }

    let path = report_path(dir, date);
    write_atomically(&path, |wtr| {
        wtr.write_record(REPORT_COLUMNS)?;
        for entry in aggregator.entries() {
            wtr.write_record([
                entry.symbol().to_string(),
                format_timestamp(entry.timestamp()),
                entry.value().to_string(),
                entry.reason(),
                entry.stage().to_string(),
            ])?;
        }
        Ok(())
    })?;
    Ok(Some(path))
}

/// Write a forecast's points for the dashboard.
pub fn write_forecast_artifact(dir: &Path, symbol: &str, forecast: &Forecast) -> Result<PathBuf> {
    let path = forecast_path(dir, symbol);
    write_atomically(&path, |wtr| {
        wtr.write_record(FORECAST_COLUMNS)?;
        for p in &forecast.points {
            wtr.write_record([
                p.ds.format("%Y-%m-%d %H:%M:%S").to_string(),
                format!("{:.6}", p.yhat),
                format!("{:.6}", p.yhat_lower),
                format!("{:.6}", p.yhat_upper),
            ])?;
        }
        Ok(())
    })
    .with_context(|| format!("failed to write forecast artifact {}", path.display()))?;
    Ok(path)
}
