//! Reconciliation Engine: cross-checks a symbol's clean series against an
//! independently sourced benchmark.
//!
//! Only timestamps present in both series are compared (inner join). A
//! clean record with no benchmark observation is counted as uncovered and
//! stays clean.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{BenchmarkSeries, DetectionStage, FlagSet, QualityFlag, SymbolPartition};

/// Reconciliation settings (`[reconciliation]` in the config file).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconciliationConfig {
    /// Relative difference above which a record is a BENCHMARK_DISCREPANCY.
    pub discrepancy_threshold: f64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            discrepancy_threshold: 0.01,
        }
    }
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationStats {
    /// Aligned pairs whose relative difference was computed.
    pub compared: usize,
    /// Records moved from clean to quarantine.
    pub promoted: usize,
    /// Clean records with no benchmark observation at their timestamp.
    pub uncovered: usize,
    /// Aligned pairs skipped because the benchmark value was zero.
    pub skipped_zero_benchmark: usize,
}

impl ReconciliationStats {
    /// No timestamp was shared by the two series. Reconciliation passed
    /// vacuously.
    pub fn is_alignment_gap(&self) -> bool {
        self.compared == 0 && self.skipped_zero_benchmark == 0
    }
}

/// |target - benchmark| / benchmark, or `None` when the benchmark value
/// cannot be divided by.
pub fn relative_difference(target: f64, benchmark: f64) -> Option<f64> {
    if benchmark == 0.0 || !benchmark.is_finite() || !target.is_finite() {
        return None;
    }
    Some((target - benchmark).abs() / benchmark.abs())
}

#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    threshold: f64,
}

impl Reconciler {
    pub fn new(config: &ReconciliationConfig) -> Self {
        Self {
            threshold: config.discrepancy_threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Promote discrepant clean records of `partition` into its quarantine.
    pub fn reconcile(
        &self,
        partition: &mut SymbolPartition,
        benchmark: &BenchmarkSeries,
    ) -> ReconciliationStats {
        let mut stats = ReconciliationStats::default();

        let promoted = partition.promote(DetectionStage::Reconciliation, |record| {
            let (Some(close), Some(bench)) = (record.close, benchmark.value_at(record.timestamp))
            else {
                stats.uncovered += 1;
                return None;
            };
            match relative_difference(close, bench) {
                Some(diff) => {
                    stats.compared += 1;
                    (diff > self.threshold)
                        .then(|| FlagSet::single(QualityFlag::BenchmarkDiscrepancy))
                }
                None => {
                    stats.skipped_zero_benchmark += 1;
                    None
                }
            }
        });
        stats.promoted = promoted;

        let symbol = partition.symbol();
        if stats.is_alignment_gap() && partition.total() > 0 {
            warn!(
                symbol,
                benchmark = benchmark.symbol(),
                "no overlapping timestamps with benchmark; reconciliation skipped"
            );
        } else {
            debug!(
                symbol,
                benchmark = benchmark.symbol(),
                compared = stats.compared,
                promoted = stats.promoted,
                uncovered = stats.uncovered,
                "reconciliation complete"
            );
        }
        if stats.skipped_zero_benchmark > 0 {
            warn!(
                symbol,
                skipped = stats.skipped_zero_benchmark,
                "benchmark value of zero; pairs skipped"
            );
        }
        stats
    }
}
