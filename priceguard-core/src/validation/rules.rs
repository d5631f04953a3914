//! Standard record-level quality rules.

use serde::{Deserialize, Serialize};

use crate::domain::{QualityFlag, Record};

/// A single independent check on one record.
///
/// Rules see one record at a time and never each other's verdicts, so the
/// engine can evaluate all of them without short-circuiting.
pub trait QualityRule: Send + Sync {
    /// Human-readable name (e.g., "high_below_low").
    fn name(&self) -> &str;

    /// Flag attached when the rule fires.
    fn flag(&self) -> QualityFlag;

    /// True if `record` violates this rule.
    fn violated(&self, record: &Record) -> bool;
}

/// LOGIC_ERROR: high below low.
#[derive(Debug, Clone, Copy, Default)]
pub struct HighBelowLow;

impl QualityRule for HighBelowLow {
    fn name(&self) -> &str {
        "high_below_low"
    }

    fn flag(&self) -> QualityFlag {
        QualityFlag::LogicError
    }

    fn violated(&self, record: &Record) -> bool {
        matches!((record.high, record.low), (Some(high), Some(low)) if high < low)
    }
}

/// NEGATIVE_VOLUME: volume below zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegativeVolume;

impl QualityRule for NegativeVolume {
    fn name(&self) -> &str {
        "negative_volume"
    }

    fn flag(&self) -> QualityFlag {
        QualityFlag::NegativeVolume
    }

    fn violated(&self, record: &Record) -> bool {
        record.volume.is_some_and(|v| v < 0)
    }
}

/// MISSING_VALUE: any of open/high/low/close absent. Volume may be null.
#[derive(Debug, Clone, Copy, Default)]
pub struct MissingPrice;

impl QualityRule for MissingPrice {
    fn name(&self) -> &str {
        "missing_price"
    }

    fn flag(&self) -> QualityFlag {
        QualityFlag::MissingValue
    }

    fn violated(&self, record: &Record) -> bool {
        record.has_missing_price()
    }
}

/// How the swing rule treats a record whose open is exactly zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroOpenPolicy {
    /// A zero open is itself an anomaly.
    #[default]
    Flag,
    /// No swing can be computed; the rule does not fire.
    Skip,
}

/// PRICE_ANOMALY: |close - open| / |open| above the threshold.
#[derive(Debug, Clone, Copy)]
pub struct PriceSwing {
    pub threshold: f64,
    pub zero_open: ZeroOpenPolicy,
}

impl PriceSwing {
    pub fn new(threshold: f64, zero_open: ZeroOpenPolicy) -> Self {
        Self {
            threshold,
            zero_open,
        }
    }

    /// Relative intraday swing, or `None` if it cannot be computed.
    pub fn swing(record: &Record) -> Option<f64> {
        let (open, close) = (record.open?, record.close?);
        if open == 0.0 {
            return None;
        }
        Some((close - open).abs() / open.abs())
    }
}

impl QualityRule for PriceSwing {
    fn name(&self) -> &str {
        "price_swing"
    }

    fn flag(&self) -> QualityFlag {
        QualityFlag::PriceAnomaly
    }

    fn violated(&self, record: &Record) -> bool {
        match (record.open, record.close) {
            (Some(open), Some(_)) if open == 0.0 => self.zero_open == ZeroOpenPolicy::Flag,
            _ => Self::swing(record).is_some_and(|s| s > self.threshold),
        }
    }
}
