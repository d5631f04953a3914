//! Deterministic synthetic source for offline development runs.
//!
//! Each symbol gets its own random walk, seeded from the BLAKE3 hash of the
//! symbol, so the same (symbol, window) always yields the same rows. Only
//! weekdays are produced and bars are always daily.
//!
//! A benchmark symbol can be tied to a market symbol with [`SyntheticAdapter::with_alias`];
//! it then tracks that symbol's closes with sub-0.2% noise, which is close
//! enough to pass reconciliation at the default threshold.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

use super::provider::{FetchError, FetchOutcome, Interval, RawFrame, RawValue, SourceAdapter, SourceKind};

/// One generated daily bar.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bar {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
}

pub struct SyntheticAdapter {
    kind: SourceKind,
    aliases: HashMap<String, String>,
    defect_rate: f64,
}

impl SyntheticAdapter {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            aliases: HashMap::new(),
            defect_rate: 0.0,
        }
    }

    /// Make benchmark `symbol` follow the walk of market symbol `target`.
    pub fn with_alias(mut self, symbol: impl Into<String>, target: impl Into<String>) -> Self {
        self.aliases.insert(symbol.into(), target.into());
        self
    }

    /// Fraction of bars that get a deliberate defect (inverted high/low,
    /// negative volume or a missing close). Clamped to `[0, 1]`.
    pub fn with_defect_rate(mut self, rate: f64) -> Self {
        self.defect_rate = if rate.is_finite() { rate.clamp(0.0, 1.0) } else { 0.0 };
        self
    }

    fn market_frame(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> RawFrame {
        let mut defect_rng = rng_for(&format!("{symbol}#defects"));
        let mut frame = RawFrame::new(["timestamp", "open", "high", "low", "close", "volume"]);

        for bar in random_walk(symbol, start, end) {
            let mut row = vec![
                RawValue::Text(bar.date.format("%Y-%m-%d").to_string()),
                RawValue::Float(bar.open),
                RawValue::Float(bar.high),
                RawValue::Float(bar.low),
                RawValue::Float(bar.close),
                RawValue::Int(bar.volume),
            ];
            if self.defect_rate > 0.0 && defect_rng.gen_bool(self.defect_rate) {
                match defect_rng.gen_range(0..3) {
                    0 => row.swap(2, 3),
                    1 => row[5] = RawValue::Int(-bar.volume),
                    _ => row[4] = RawValue::Null,
                }
            }
            frame.push_row(row);
        }
        frame
    }

    fn benchmark_frame(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> RawFrame {
        let target = self.aliases.get(symbol).map(String::as_str).unwrap_or(symbol);
        let mut noise_rng = rng_for(&format!("{symbol}#benchmark"));
        let mut frame = RawFrame::new(["TIME_PERIOD", "OBS_VALUE"]);

        for bar in random_walk(target, start, end) {
            let noise: f64 = noise_rng.gen_range(-0.0015..0.0015);
            frame.push_row(vec![
                RawValue::Text(bar.date.format("%Y-%m-%d").to_string()),
                RawValue::Float(bar.close * (1.0 + noise)),
            ]);
        }
        frame
    }
}

fn rng_for(seed_text: &str) -> StdRng {
    let seed: [u8; 32] = *blake3::hash(seed_text.as_bytes()).as_bytes();
    StdRng::from_seed(seed)
}

fn random_walk(symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<Bar> {
    let mut rng = rng_for(symbol);
    let mut bars = Vec::new();
    let mut price = 100.0_f64;
    let mut current = start;

    while current <= end {
        if matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            current += Duration::days(1);
            continue;
        }

        let daily_return: f64 = rng.gen_range(-0.03..0.03);
        let open = price;
        let close = price * (1.0 + daily_return);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = rng.gen_range(500_000..5_000_000i64);

        bars.push(Bar {
            date: current,
            open,
            high,
            low,
            close,
            volume,
        });

        price = close;
        current += Duration::days(1);
    }

    bars
}

impl SourceAdapter for SyntheticAdapter {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        _interval: Interval,
    ) -> Result<FetchOutcome, FetchError> {
        if symbol.trim().is_empty() {
            return Err(FetchError::InvalidSymbol {
                symbol: symbol.to_string(),
                reason: "empty symbol".into(),
            });
        }
        let frame = match self.kind {
            SourceKind::MarketPrice => self.market_frame(symbol, start, end),
            SourceKind::Benchmark => self.benchmark_frame(symbol, start, end),
        };
        Ok(FetchOutcome::from_frame(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
    }

    fn rows(adapter: &SyntheticAdapter, symbol: &str) -> RawFrame {
        let (start, end) = window();
        match adapter.fetch(symbol, start, end, Interval::Daily).unwrap() {
            FetchOutcome::Rows(frame) => frame,
            FetchOutcome::Empty => panic!("expected rows"),
        }
    }

    #[test]
    fn deterministic_per_symbol() {
        let adapter = SyntheticAdapter::new(SourceKind::MarketPrice);
        assert_eq!(rows(&adapter, "SPY"), rows(&adapter, "SPY"));
        assert_ne!(rows(&adapter, "SPY"), rows(&adapter, "QQQ"));
    }

    #[test]
    fn weekdays_only() {
        let (start, end) = window();
        let bars = random_walk("SPY", start, end);
        assert_eq!(bars.len(), 23);
        assert!(bars
            .iter()
            .all(|b| !matches!(b.date.weekday(), Weekday::Sat | Weekday::Sun)));
        assert!(bars.iter().all(|b| b.high >= b.low));
    }

    #[test]
    fn aliased_benchmark_tracks_market_walk() {
        let (start, end) = window();
        let adapter = SyntheticAdapter::new(SourceKind::Benchmark).with_alias("REF", "SPY");
        let frame = rows(&adapter, "REF");
        let market = random_walk("SPY", start, end);
        assert_eq!(frame.len(), market.len());
        for (row, bar) in frame.rows().iter().zip(&market) {
            let RawValue::Float(value) = row[1] else {
                panic!("expected float");
            };
            assert!(((value - bar.close) / value).abs() < 0.002);
        }
    }

    #[test]
    fn full_defect_rate_damages_every_bar() {
        let adapter = SyntheticAdapter::new(SourceKind::MarketPrice).with_defect_rate(1.0);
        let clean = SyntheticAdapter::new(SourceKind::MarketPrice);
        let damaged = rows(&adapter, "SPY");
        let pristine = rows(&clean, "SPY");
        for (a, b) in damaged.rows().iter().zip(pristine.rows()) {
            assert_ne!(a, b);
        }
    }

    #[test]
    fn empty_window_is_empty_outcome() {
        let adapter = SyntheticAdapter::new(SourceKind::MarketPrice);
        let sat = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
        let sun = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        assert_eq!(
            adapter.fetch("SPY", sat, sun, Interval::Daily).unwrap(),
            FetchOutcome::Empty
        );
    }
}
