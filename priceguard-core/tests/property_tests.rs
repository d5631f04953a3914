//! Property tests for partition invariants.
//!
//! Uses proptest to verify:
//! 1. Partition totality: every record lands in exactly one of clean/quarantine
//! 2. Disjointness: no timestamp appears in both sets
//! 3. Idempotence: validating an already-clean series flags nothing
//! 4. Promotion monotonicity: reconciliation never shrinks the quarantine

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeSet;

use priceguard_core::domain::{BenchmarkObservation, BenchmarkSeries, Record, Series};
use priceguard_core::reconcile::{Reconciler, ReconciliationConfig};
use priceguard_core::validation::{ValidationConfig, ValidationEngine};

// ── Strategies (proptest) ────────────────────────────────────────────

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn arb_price() -> impl Strategy<Value = Option<f64>> {
    prop_oneof![
        9 => (0.0..500.0_f64).prop_map(|p| Some((p * 100.0).round() / 100.0)),
        1 => Just(None),
    ]
}

fn arb_volume() -> impl Strategy<Value = Option<i64>> {
    prop_oneof![
        8 => (0..1_000_000i64).prop_map(Some),
        1 => (-1000..0i64).prop_map(Some),
        1 => Just(None),
    ]
}

/// Records with possibly repeated day offsets, in arbitrary order.
fn arb_records() -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(
        (0..120i64, arb_price(), arb_price(), arb_price(), arb_price(), arb_volume()),
        0..80,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .map(|(day, open, high, low, close, volume)| Record {
                timestamp: base() + Duration::days(day),
                open,
                high,
                low,
                close,
                volume,
            })
            .collect()
    })
}

fn arb_swing() -> impl Strategy<Value = f64> {
    (0.01..1.0_f64).prop_map(|t| (t * 100.0).round() / 100.0)
}

// ── 1-2. Totality and disjointness ───────────────────────────────────

proptest! {
    #[test]
    fn partition_is_total_and_disjoint(records in arb_records(), swing in arb_swing()) {
        let series = Series::new("SPY", records);
        let input_count = series.len();
        let engine = ValidationEngine::standard(&ValidationConfig {
            swing_threshold: swing,
            ..Default::default()
        });

        let partition = engine.validate(series);
        prop_assert_eq!(partition.clean_count() + partition.quarantine_count(), input_count);

        let clean: BTreeSet<_> = partition.clean().iter().map(|r| r.timestamp).collect();
        for q in partition.quarantine() {
            prop_assert!(!clean.contains(&q.record.timestamp));
            prop_assert!(!q.flags.is_empty());
        }
    }

    /// Normalized series are strictly ordered with no duplicate timestamps.
    #[test]
    fn series_is_sorted_and_unique(records in arb_records()) {
        let series = Series::new("SPY", records);
        prop_assert!(series
            .records()
            .windows(2)
            .all(|w| w[0].timestamp < w[1].timestamp));
    }
}

// ── 3. Idempotence ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn validating_clean_output_flags_nothing(records in arb_records(), swing in arb_swing()) {
        let engine = ValidationEngine::standard(&ValidationConfig {
            swing_threshold: swing,
            ..Default::default()
        });
        let first = engine.validate(Series::new("SPY", records));
        let (clean, _) = first.into_parts();
        let clean_count = clean.len();

        let second = engine.validate(clean);
        prop_assert_eq!(second.quarantine_count(), 0);
        prop_assert_eq!(second.clean_count(), clean_count);
    }
}

// ── 4. Promotion monotonicity ────────────────────────────────────────

proptest! {
    #[test]
    fn reconciliation_only_promotes(
        records in arb_records(),
        offsets in prop::collection::vec((0..120i64, 0.5..200.0_f64), 0..60),
    ) {
        let engine = ValidationEngine::default();
        let mut partition = engine.validate(Series::new("SPY", records));
        let before_total = partition.total();
        let before_quarantine = partition.quarantine_count();

        let bench = BenchmarkSeries::new(
            "REF",
            offsets
                .into_iter()
                .map(|(day, value)| BenchmarkObservation {
                    timestamp: base() + Duration::days(day),
                    value,
                })
                .collect(),
        );
        let stats = Reconciler::new(&ReconciliationConfig::default()).reconcile(&mut partition, &bench);

        prop_assert_eq!(partition.total(), before_total);
        prop_assert_eq!(partition.quarantine_count(), before_quarantine + stats.promoted);
        prop_assert_eq!(
            stats.compared + stats.uncovered + stats.skipped_zero_benchmark,
            partition.clean_count() + stats.promoted
        );
    }
}
