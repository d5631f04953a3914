//! Criterion benchmarks for PriceGuard hot paths.
//!
//! Benchmarks:
//! 1. Normalizer (raw frame → canonical series)
//! 2. Validation Engine partition
//! 3. Reconciliation against a benchmark series

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use priceguard_core::data::{Normalizer, RawFrame, RawValue};
use priceguard_core::domain::{BenchmarkObservation, BenchmarkSeries, Record, Series};
use priceguard_core::reconcile::{Reconciler, ReconciliationConfig};
use priceguard_core::validation::ValidationEngine;

// ── Helpers ──────────────────────────────────────────────────────────

/// Every 50th record is broken in one of three ways.
fn make_records(n: usize) -> Vec<Record> {
    let base = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            let mut r = Record::new(
                base + Duration::days(i as i64),
                close - 0.3,
                close + 1.5,
                close - 1.5,
                close,
                1_000_000 + (i as i64 % 500_000),
            );
            match i % 150 {
                0 => r.volume = Some(-1),
                50 => std::mem::swap(&mut r.high, &mut r.low),
                100 => r.close = None,
                _ => {}
            }
            r
        })
        .collect()
}

fn make_frame(n: usize) -> RawFrame {
    let mut frame = RawFrame::new(["Date", "Open", "High", "Low", "Close", "Adj Close", "Volume"]);
    for r in make_records(n) {
        frame.push_row(vec![
            RawValue::Text(r.timestamp.format("%Y-%m-%d").to_string()),
            r.open.into(),
            r.high.into(),
            r.low.into(),
            r.close.into(),
            r.close.into(),
            r.volume.into(),
        ]);
    }
    frame
}

fn make_benchmark(series: &Series) -> BenchmarkSeries {
    BenchmarkSeries::new(
        "REF",
        series
            .iter()
            .filter_map(|r| {
                r.close.map(|c| BenchmarkObservation {
                    timestamp: r.timestamp,
                    value: c * 1.001,
                })
            })
            .collect(),
    )
}

// ── 1. Normalizer ────────────────────────────────────────────────────

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");

    for &n in &[252, 2520] {
        let frame = make_frame(n);
        group.bench_with_input(BenchmarkId::new("yahoo_frame", n), &n, |b, _| {
            b.iter(|| Normalizer::prices("BENCH", black_box(&frame)))
        });
    }

    group.finish();
}

// ── 2. Validation ────────────────────────────────────────────────────

fn bench_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("validation");
    let engine = ValidationEngine::default();

    for &n in &[252, 2520, 25_200] {
        let series = Series::new("BENCH", make_records(n));
        group.bench_with_input(BenchmarkId::new("standard_rules", n), &n, |b, _| {
            b.iter(|| engine.validate(black_box(series.clone())))
        });
    }

    group.finish();
}

// ── 3. Reconciliation ────────────────────────────────────────────────

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    let engine = ValidationEngine::default();
    let reconciler = Reconciler::new(&ReconciliationConfig::default());

    for &n in &[252, 2520] {
        let series = Series::new("BENCH", make_records(n));
        let bench = make_benchmark(&series);
        let partition = engine.validate(series);
        group.bench_with_input(BenchmarkId::new("aligned", n), &n, |b, _| {
            b.iter(|| {
                let mut p = partition.clone();
                reconciler.reconcile(black_box(&mut p), black_box(&bench))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_normalize, bench_validation, bench_reconcile);
criterion_main!(benches);
