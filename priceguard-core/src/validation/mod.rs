//! Validation Engine: independent rule checks partitioning a series into
//! clean and quarantined records.
//!
//! Every rule is evaluated against every record; a record with zero flags
//! is clean, anything else is quarantined with its flags in rule order.

pub mod rules;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{DetectionStage, FlagSet, Record, Series, SymbolPartition};

pub use rules::{HighBelowLow, MissingPrice, NegativeVolume, PriceSwing, QualityRule, ZeroOpenPolicy};

/// Validation settings (`[validation]` in the config file).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    /// Relative open→close move above which a record is a PRICE_ANOMALY.
    pub swing_threshold: f64,
    pub zero_open: ZeroOpenPolicy,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            swing_threshold: 0.20,
            zero_open: ZeroOpenPolicy::Flag,
        }
    }
}

/// Ordered list of quality rules.
pub struct ValidationEngine {
    rules: Vec<Box<dyn QualityRule>>,
}

impl ValidationEngine {
    /// Engine with no rules; everything passes.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// The four standard rules, in report order: logic error, negative
    /// volume, missing value, price swing.
    pub fn standard(config: &ValidationConfig) -> Self {
        Self::new()
            .with_rule(HighBelowLow)
            .with_rule(NegativeVolume)
            .with_rule(MissingPrice)
            .with_rule(PriceSwing::new(config.swing_threshold, config.zero_open))
    }

    pub fn with_rule(mut self, rule: impl QualityRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// All flags raised for one record, in rule order.
    pub fn evaluate(&self, record: &Record) -> FlagSet {
        self.rules
            .iter()
            .filter(|rule| rule.violated(record))
            .map(|rule| rule.flag())
            .collect()
    }

    /// Partition a series into clean and quarantined records.
    pub fn validate(&self, series: Series) -> SymbolPartition {
        let mut partition = SymbolPartition::new(series, Vec::new());
        let quarantined = partition.promote(DetectionStage::Validation, |record| {
            Some(self.evaluate(record))
        });
        debug!(
            symbol = partition.symbol(),
            clean = partition.clean_count(),
            quarantined,
            "validation complete"
        );
        partition
    }
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::standard(&ValidationConfig::default())
    }
}
