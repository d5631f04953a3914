//! Quality flags and detection stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason a record was quarantined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityFlag {
    LogicError,
    NegativeVolume,
    MissingValue,
    PriceAnomaly,
    BenchmarkDiscrepancy,
    ForecastAnomaly,
}

impl QualityFlag {
    /// Machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            QualityFlag::LogicError => "LOGIC_ERROR",
            QualityFlag::NegativeVolume => "NEGATIVE_VOLUME",
            QualityFlag::MissingValue => "MISSING_VALUE",
            QualityFlag::PriceAnomaly => "PRICE_ANOMALY",
            QualityFlag::BenchmarkDiscrepancy => "BENCHMARK_DISCREPANCY",
            QualityFlag::ForecastAnomaly => "FORECAST_ANOMALY",
        }
    }

    /// Human-readable label used in the quarantine report.
    pub fn label(&self) -> &'static str {
        match self {
            QualityFlag::LogicError => "Logic Error (High < Low)",
            QualityFlag::NegativeVolume => "Negative Volume",
            QualityFlag::MissingValue => "Missing Values",
            QualityFlag::PriceAnomaly => "Price Anomaly",
            QualityFlag::BenchmarkDiscrepancy => "Benchmark Discrepancy",
            QualityFlag::ForecastAnomaly => "Forecast Anomaly",
        }
    }
}

impl fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Insertion-ordered set of flags for one record.
///
/// Order is rule-evaluation order. The set only becomes a string at the
/// report boundary (`Display`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSet(Vec<QualityFlag>);

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(flag: QualityFlag) -> Self {
        Self(vec![flag])
    }

    /// Add a flag; returns false if it was already present.
    pub fn insert(&mut self, flag: QualityFlag) -> bool {
        if self.0.contains(&flag) {
            return false;
        }
        self.0.push(flag);
        true
    }

    pub fn contains(&self, flag: QualityFlag) -> bool {
        self.0.contains(&flag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = QualityFlag> + '_ {
        self.0.iter().copied()
    }

    /// Reason codes joined with `|`, e.g. `LOGIC_ERROR|PRICE_ANOMALY`.
    pub fn codes(&self) -> String {
        self.0.iter().map(|f| f.code()).collect::<Vec<_>>().join("|")
    }
}

impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, flag) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            f.write_str(flag.label())?;
        }
        Ok(())
    }
}

impl FromIterator<QualityFlag> for FlagSet {
    fn from_iter<I: IntoIterator<Item = QualityFlag>>(iter: I) -> Self {
        let mut set = FlagSet::new();
        for flag in iter {
            set.insert(flag);
        }
        set
    }
}

/// Pipeline stage that quarantined a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionStage {
    Validation,
    Reconciliation,
    Forecast,
}

impl fmt::Display for DetectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DetectionStage::Validation => "VALIDATION",
            DetectionStage::Reconciliation => "RECONCILIATION",
            DetectionStage::Forecast => "FORECAST",
        })
    }
}
