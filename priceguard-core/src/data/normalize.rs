//! Normalizer: adapter frames → canonical `Series` / `BenchmarkSeries`.
//!
//! Maps source-specific column names onto the canonical fields, converts
//! timestamps to UTC, coerces volume to a nullable integer and ignores every
//! other column.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use super::provider::{RawFrame, RawValue};
use crate::domain::{BenchmarkObservation, BenchmarkSeries, Record, Series};

const TIMESTAMP_ALIASES: &[&str] = &["timestamp", "date", "datetime", "time_period"];
const OPEN_ALIASES: &[&str] = &["open"];
const HIGH_ALIASES: &[&str] = &["high"];
const LOW_ALIASES: &[&str] = &["low"];
const CLOSE_ALIASES: &[&str] = &["close"];
const VOLUME_ALIASES: &[&str] = &["volume"];
const BENCHMARK_VALUE_ALIASES: &[&str] = &["obs_value", "value", "close"];

/// Normalization failures. Fatal for the symbol, never for the run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    #[error("{symbol}: missing required field '{field}'")]
    MissingField { symbol: String, field: &'static str },

    #[error("{symbol}: unparseable timestamp '{value}' at row {row}")]
    BadTimestamp {
        symbol: String,
        row: usize,
        value: String,
    },

    #[error("{symbol}: non-numeric {field} '{value}' at row {row}")]
    NonNumeric {
        symbol: String,
        field: &'static str,
        row: usize,
        value: String,
    },

    #[error("{symbol}: non-integral volume '{value}' at row {row}")]
    NonIntegralVolume {
        symbol: String,
        row: usize,
        value: String,
    },
}

/// Stateless normalizer for both price and benchmark frames.
pub struct Normalizer;

impl Normalizer {
    /// Normalize a market-price frame.
    ///
    /// Required: timestamp, open, high, low, close. Volume is optional; when
    /// the column is absent every record's volume is null.
    pub fn prices(symbol: &str, frame: &RawFrame) -> Result<Series, SchemaError> {
        let ts_idx = require(symbol, frame, TIMESTAMP_ALIASES, "timestamp")?;
        let open_idx = require(symbol, frame, OPEN_ALIASES, "open")?;
        let high_idx = require(symbol, frame, HIGH_ALIASES, "high")?;
        let low_idx = require(symbol, frame, LOW_ALIASES, "low")?;
        let close_idx = require(symbol, frame, CLOSE_ALIASES, "close")?;
        let volume_idx = frame.column_index(VOLUME_ALIASES);

        if volume_idx.is_none() {
            debug!(symbol, "no volume column; volumes will be null");
        }

        let mut records = Vec::with_capacity(frame.len());
        for (row, cells) in frame.rows().iter().enumerate() {
            let timestamp = parse_timestamp(&cells[ts_idx]).ok_or_else(|| {
                SchemaError::BadTimestamp {
                    symbol: symbol.to_string(),
                    row,
                    value: cells[ts_idx].to_string(),
                }
            })?;

            let price = |idx: usize, field: &'static str| {
                parse_number(&cells[idx]).map_err(|value| SchemaError::NonNumeric {
                    symbol: symbol.to_string(),
                    field,
                    row,
                    value,
                })
            };

            let volume = match volume_idx {
                Some(idx) => parse_volume(&cells[idx]).map_err(|value| {
                    SchemaError::NonIntegralVolume {
                        symbol: symbol.to_string(),
                        row,
                        value,
                    }
                })?,
                None => None,
            };

            records.push(Record {
                timestamp,
                open: price(open_idx, "open")?,
                high: price(high_idx, "high")?,
                low: price(low_idx, "low")?,
                close: price(close_idx, "close")?,
                volume,
            });
        }

        let (series, dropped) = Series::canonicalize(symbol, records);
        if dropped > 0 {
            warn!(symbol, dropped, "dropped duplicate timestamps");
        }
        Ok(series)
    }

    /// Normalize a benchmark frame. Rows without a value are dropped.
    pub fn benchmark(symbol: &str, frame: &RawFrame) -> Result<BenchmarkSeries, SchemaError> {
        let ts_idx = require(symbol, frame, TIMESTAMP_ALIASES, "timestamp")?;
        let value_idx = require(symbol, frame, BENCHMARK_VALUE_ALIASES, "value")?;

        let mut observations = Vec::with_capacity(frame.len());
        let mut skipped = 0usize;
        for (row, cells) in frame.rows().iter().enumerate() {
            let timestamp = parse_timestamp(&cells[ts_idx]).ok_or_else(|| {
                SchemaError::BadTimestamp {
                    symbol: symbol.to_string(),
                    row,
                    value: cells[ts_idx].to_string(),
                }
            })?;
            let value =
                parse_number(&cells[value_idx]).map_err(|value| SchemaError::NonNumeric {
                    symbol: symbol.to_string(),
                    field: "value",
                    row,
                    value,
                })?;

            match value {
                Some(value) => observations.push(BenchmarkObservation { timestamp, value }),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!(symbol, skipped, "benchmark rows without a value dropped");
        }
        Ok(BenchmarkSeries::new(symbol, observations))
    }
}

fn require(
    symbol: &str,
    frame: &RawFrame,
    aliases: &[&str],
    field: &'static str,
) -> Result<usize, SchemaError> {
    frame
        .column_index(aliases)
        .ok_or_else(|| SchemaError::MissingField {
            symbol: symbol.to_string(),
            field,
        })
}

/// Parse a timestamp cell into a UTC instant.
///
/// Accepts epoch seconds, RFC 3339, `%Y-%m-%d %H:%M:%S` with or without an
/// offset (no offset means UTC), plain dates (midnight UTC) and `%Y-%m`
/// months (first day, midnight UTC).
pub fn parse_timestamp(value: &RawValue) -> Option<DateTime<Utc>> {
    match value {
        RawValue::Null => None,
        RawValue::Int(secs) => DateTime::from_timestamp(*secs, 0),
        RawValue::Float(secs) if secs.is_finite() && secs.fract() == 0.0 => {
            DateTime::from_timestamp(*secs as i64, 0)
        }
        RawValue::Float(_) => None,
        RawValue::Text(s) => parse_timestamp_text(s.trim()),
    }
}

fn parse_timestamp_text(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ndt.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
    }
    // Monthly benchmark periods, e.g. "2024-03"
    if s.len() == 7 {
        if let Ok(date) = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d") {
            return date.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
        }
    }
    None
}

/// Numeric cell → `Ok(None)` for absent values, `Err(raw)` for garbage.
fn parse_number(value: &RawValue) -> Result<Option<f64>, String> {
    let v = match value {
        RawValue::Null => return Ok(None),
        RawValue::Int(i) => *i as f64,
        RawValue::Float(f) => *f,
        RawValue::Text(s) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("null") {
                return Ok(None);
            }
            s.parse::<f64>().map_err(|_| s.to_string())?
        }
    };
    Ok(v.is_finite().then_some(v))
}

fn parse_volume(value: &RawValue) -> Result<Option<i64>, String> {
    match value {
        RawValue::Int(i) => Ok(Some(*i)),
        RawValue::Text(s) if s.trim().parse::<i64>().is_ok() => Ok(s.trim().parse::<i64>().ok()),
        other => match parse_number(other)? {
            None => Ok(None),
            Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Some(f as i64)),
            Some(_) => Err(other.to_string()),
        },
    }
}
