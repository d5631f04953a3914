//! Clean/quarantine partition and quarantine entries.
//!
//! A record's classification only ever moves clean → quarantined. The
//! `SymbolPartition` type is the single place where that move happens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::flag::{DetectionStage, FlagSet, QualityFlag};
use super::record::{Record, Series, SeriesKey};

/// A record that failed at least one check, with the stage that caught it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantinedRecord {
    pub record: Record,
    pub flags: FlagSet,
    pub stage: DetectionStage,
}

/// Clean and quarantined records for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolPartition {
    clean: Series,
    quarantine: Vec<QuarantinedRecord>,
}

impl SymbolPartition {
    pub fn new(clean: Series, quarantine: Vec<QuarantinedRecord>) -> Self {
        Self { clean, quarantine }
    }

    pub fn symbol(&self) -> &str {
        self.clean.symbol()
    }

    pub fn clean(&self) -> &Series {
        &self.clean
    }

    pub fn quarantine(&self) -> &[QuarantinedRecord] {
        &self.quarantine
    }

    pub fn clean_count(&self) -> usize {
        self.clean.len()
    }

    pub fn quarantine_count(&self) -> usize {
        self.quarantine.len()
    }

    /// Total records across both sets.
    pub fn total(&self) -> usize {
        self.clean.len() + self.quarantine.len()
    }

    /// Move clean records to quarantine wherever `decide` returns flags.
    ///
    /// Returns the number of records promoted. An empty flag set is treated
    /// as "keep clean".
    pub fn promote<F>(&mut self, stage: DetectionStage, mut decide: F) -> usize
    where
        F: FnMut(&Record) -> Option<FlagSet>,
    {
        let symbol = self.clean.symbol().to_string();
        let records = std::mem::replace(&mut self.clean, Series::empty(symbol.clone()))
            .into_records();

        let mut kept = Vec::with_capacity(records.len());
        let mut promoted = 0;
        for record in records {
            match decide(&record) {
                Some(flags) if !flags.is_empty() => {
                    self.quarantine.push(QuarantinedRecord {
                        record,
                        flags,
                        stage,
                    });
                    promoted += 1;
                }
                _ => kept.push(record),
            }
        }

        self.clean = Series::from_canonical(symbol, kept);
        promoted
    }

    /// Convert every quarantined record into a report entry.
    pub fn quarantine_entries(&self) -> Vec<QuarantineEntry> {
        let symbol = self.symbol();
        self.quarantine
            .iter()
            .map(|q| QuarantineEntry::from_quarantined(symbol, q))
            .collect()
    }

    pub fn into_parts(self) -> (Series, Vec<QuarantinedRecord>) {
        (self.clean, self.quarantine)
    }
}

/// The value column of a quarantine entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EntryValue {
    /// The record's closing value.
    Close(f64),
    /// The record had no close.
    Missing,
    /// Synthetic entry with no underlying record value (forecast signal).
    Placeholder,
}

impl EntryValue {
    pub const PLACEHOLDER: &'static str = "N/A";
}

impl fmt::Display for EntryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryValue::Close(v) => write!(f, "{v}"),
            EntryValue::Missing => Ok(()),
            EntryValue::Placeholder => f.write_str(Self::PLACEHOLDER),
        }
    }
}

/// One row of the quarantine report. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineEntry {
    symbol: String,
    timestamp: DateTime<Utc>,
    value: EntryValue,
    reasons: FlagSet,
    stage: DetectionStage,
}

impl QuarantineEntry {
    pub fn new(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        value: EntryValue,
        reasons: FlagSet,
        stage: DetectionStage,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            value,
            reasons,
            stage,
        }
    }

    /// Entry for a quarantined record. Forecast-stage entries carry the
    /// placeholder value because they stand for the model signal.
    pub fn from_quarantined(symbol: &str, quarantined: &QuarantinedRecord) -> Self {
        if quarantined.stage == DetectionStage::Forecast {
            return Self::forecast_anomaly(symbol, quarantined.record.timestamp);
        }
        let value = match quarantined.record.close {
            Some(close) => EntryValue::Close(close),
            None => EntryValue::Missing,
        };
        Self::new(
            symbol,
            quarantined.record.timestamp,
            value,
            quarantined.flags.clone(),
            quarantined.stage,
        )
    }

    /// Synthetic entry submitted on behalf of the forecasting collaborator.
    pub fn forecast_anomaly(symbol: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            symbol,
            timestamp,
            EntryValue::Placeholder,
            FlagSet::single(QualityFlag::ForecastAnomaly),
            DetectionStage::Forecast,
        )
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn value(&self) -> EntryValue {
        self.value
    }

    pub fn reasons(&self) -> &FlagSet {
        &self.reasons
    }

    pub fn stage(&self) -> DetectionStage {
        self.stage
    }

    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(self.symbol.clone(), self.timestamp)
    }

    /// Reasons rendered for the report.
    pub fn reason(&self) -> String {
        self.reasons.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap()
    }

    fn partition() -> SymbolPartition {
        let clean = Series::new(
            "EURUSD=X",
            (1..=4)
                .map(|d| Record::new(ts(d), 1.0, 1.1, 0.9, 1.0 + d as f64 / 100.0, 0))
                .collect(),
        );
        SymbolPartition::new(clean, Vec::new())
    }

    #[test]
    fn promote_moves_records_without_duplicating() {
        let mut p = partition();
        let moved = p.promote(DetectionStage::Reconciliation, |r| {
            (r.timestamp == ts(2)).then(|| FlagSet::single(QualityFlag::BenchmarkDiscrepancy))
        });
        assert_eq!(moved, 1);
        assert_eq!(p.clean_count(), 3);
        assert_eq!(p.quarantine_count(), 1);
        assert!(p.clean().get(ts(2)).is_none());
        assert_eq!(p.quarantine()[0].stage, DetectionStage::Reconciliation);
    }

    #[test]
    fn empty_flag_set_keeps_record_clean() {
        let mut p = partition();
        let moved = p.promote(DetectionStage::Forecast, |_| Some(FlagSet::new()));
        assert_eq!(moved, 0);
        assert_eq!(p.clean_count(), 4);
    }

    #[test]
    fn forecast_entries_use_placeholder_value() {
        let mut p = partition();
        p.promote(DetectionStage::Forecast, |r| {
            (r.timestamp == ts(4)).then(|| FlagSet::single(QualityFlag::ForecastAnomaly))
        });
        let entries = p.quarantine_entries();
        assert_eq!(entries[0].value(), EntryValue::Placeholder);
        assert_eq!(entries[0].value().to_string(), "N/A");
    }

    #[test]
    fn missing_close_renders_empty() {
        let mut record = Record::new(ts(1), 1.0, 1.1, 0.9, 1.0, 0);
        record.close = None;
        let q = QuarantinedRecord {
            record,
            flags: FlagSet::single(QualityFlag::MissingValue),
            stage: DetectionStage::Validation,
        };
        let entry = QuarantineEntry::from_quarantined("X", &q);
        assert_eq!(entry.value(), EntryValue::Missing);
        assert_eq!(entry.value().to_string(), "");
        assert_eq!(entry.reason(), "Missing Values");
    }
}
