//! Record, Series and BenchmarkSeries: the canonical per-record schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One normalized OHLCV observation.
///
/// Prices are nullable so that a missing field survives normalization and can
/// be flagged by validation. Volume is signed for the same reason: a negative
/// volume is a data error we want to see, not a parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub timestamp: DateTime<Utc>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
}

impl Record {
    /// Fully populated record.
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: i64,
    ) -> Self {
        Self {
            timestamp,
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close: Some(close),
            volume: Some(volume),
        }
    }

    /// True if any of open/high/low/close is absent.
    pub fn has_missing_price(&self) -> bool {
        self.open.is_none() || self.high.is_none() || self.low.is_none() || self.close.is_none()
    }
}

/// Composite row identity used wherever records are aligned or ordered.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
}

impl SeriesKey {
    pub fn new(symbol: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
        }
    }
}

/// Ordered, timestamp-unique records for one (symbol, source).
///
/// Every constructor re-establishes ascending timestamp order and drops
/// duplicate timestamps (first occurrence wins), so the invariant holds for
/// any value of this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    symbol: String,
    records: Vec<Record>,
}

impl Series {
    /// Build a series, sorting and de-duplicating the input.
    pub fn new(symbol: impl Into<String>, records: Vec<Record>) -> Self {
        Self::canonicalize(symbol, records).0
    }

    /// Build a series and report how many duplicate timestamps were dropped.
    pub fn canonicalize(symbol: impl Into<String>, mut records: Vec<Record>) -> (Self, usize) {
        // Stable sort keeps the adapter's first occurrence ahead of later duplicates.
        records.sort_by_key(|r| r.timestamp);
        let before = records.len();
        records.dedup_by_key(|r| r.timestamp);
        let dropped = before - records.len();
        (
            Self {
                symbol: symbol.into(),
                records,
            },
            dropped,
        )
    }

    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            records: Vec::new(),
        }
    }

    /// Caller guarantees `records` is already sorted and unique.
    pub(crate) fn from_canonical(symbol: String, records: Vec<Record>) -> Self {
        debug_assert!(records.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        Self { symbol, records }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&Record> {
        self.records.last()
    }

    pub fn get(&self, timestamp: DateTime<Utc>) -> Option<&Record> {
        self.records
            .binary_search_by_key(&timestamp, |r| r.timestamp)
            .ok()
            .map(|i| &self.records[i])
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl<'a> IntoIterator for &'a Series {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// A single reference value from the benchmark source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkObservation {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Independently sourced reference series. Read-only input to reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSeries {
    symbol: String,
    observations: Vec<BenchmarkObservation>,
}

impl BenchmarkSeries {
    pub fn new(symbol: impl Into<String>, mut observations: Vec<BenchmarkObservation>) -> Self {
        observations.sort_by_key(|o| o.timestamp);
        observations.dedup_by_key(|o| o.timestamp);
        Self {
            symbol: symbol.into(),
            observations,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn observations(&self) -> &[BenchmarkObservation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Benchmark value observed at exactly `timestamp`, if any.
    pub fn value_at(&self, timestamp: DateTime<Utc>) -> Option<f64> {
        self.observations
            .binary_search_by_key(&timestamp, |o| o.timestamp)
            .ok()
            .map(|i| self.observations[i].value)
    }
}
