//! Quarantine Aggregator: the single owner of every quarantine entry in a run.
//!
//! Per-symbol outcomes are handed over one at a time on the calling thread,
//! so the table needs no locking. Entries are keyed by (symbol, timestamp,
//! stage) and iterate in that order.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

use priceguard_core::domain::{DetectionStage, QuarantineEntry, SeriesKey};

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("duplicate quarantine entry for {symbol} at {timestamp} ({stage})")]
    DuplicateEntry {
        symbol: String,
        timestamp: DateTime<Utc>,
        stage: DetectionStage,
    },

    #[error("report I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("report CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Default)]
pub struct QuarantineAggregator {
    entries: BTreeMap<(SeriesKey, DetectionStage), QuarantineEntry>,
}

impl QuarantineAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of one symbol's entries. Returns how many were added.
    pub fn absorb<I>(&mut self, entries: I) -> Result<usize, AggregationError>
    where
        I: IntoIterator<Item = QuarantineEntry>,
    {
        let mut added = 0;
        for entry in entries {
            let key = (entry.key(), entry.stage());
            if self.entries.contains_key(&key) {
                return Err(AggregationError::DuplicateEntry {
                    symbol: entry.symbol().to_string(),
                    timestamp: entry.timestamp(),
                    stage: entry.stage(),
                });
            }
            self.entries.insert(key, entry);
            added += 1;
        }
        Ok(added)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by (symbol, timestamp, stage).
    pub fn entries(&self) -> impl Iterator<Item = &QuarantineEntry> + '_ {
        self.entries.values()
    }
}
