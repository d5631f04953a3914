//! Pipeline configuration, loaded once per run from TOML.
//!
//! The loaded `PipelineConfig` is immutable and passed by reference into
//! every component; nothing reads configuration from process-wide state.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;
use thiserror::Error;

use priceguard_core::data::Interval;
use priceguard_core::forecast::ForecastConfig;
use priceguard_core::reconcile::ReconciliationConfig;
use priceguard_core::validation::ValidationConfig;

use crate::orchestrator::{FetchWindow, RetryPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// `[pipeline]`: what to fetch and where to write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSettings {
    pub market_symbols: Vec<String>,
    pub benchmark_symbols: Vec<String>,
    pub history_days: u32,
    pub interval: Interval,
    pub max_workers: usize,
    pub output_dir: PathBuf,
    pub log_level: String,
    /// Market symbol → benchmark symbol it is reconciled against.
    pub benchmark_mapping: BTreeMap<String, String>,
}

impl PipelineSettings {
    /// Upper bound on `history_days` (one hundred years).
    pub const MAX_HISTORY_DAYS: u32 = 36_500;
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            market_symbols: Vec::new(),
            benchmark_symbols: Vec::new(),
            history_days: 730,
            interval: Interval::Daily,
            max_workers: 4,
            output_dir: PathBuf::from("data"),
            log_level: "info".into(),
            benchmark_mapping: BTreeMap::new(),
        }
    }
}

/// `[retry]`: bounded retry of transient fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 500,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, StdDuration::from_millis(self.backoff_ms))
    }
}

/// Complete configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl PipelineConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints. Reports every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        let mut problems = Vec::new();

        if p.market_symbols.is_empty() {
            problems.push("pipeline.market_symbols is empty".to_string());
        }
        let market: BTreeSet<&str> = p.market_symbols.iter().map(String::as_str).collect();
        if market.len() != p.market_symbols.len() {
            problems.push("pipeline.market_symbols contains duplicates".to_string());
        }
        let benchmarks: BTreeSet<&str> = p.benchmark_symbols.iter().map(String::as_str).collect();
        if benchmarks.len() != p.benchmark_symbols.len() {
            problems.push("pipeline.benchmark_symbols contains duplicates".to_string());
        }
        if p.max_workers == 0 {
            problems.push("pipeline.max_workers must be at least 1".to_string());
        }
        if !(1..=PipelineSettings::MAX_HISTORY_DAYS).contains(&p.history_days) {
            problems.push(format!(
                "pipeline.history_days must be between 1 and {}, got {}",
                PipelineSettings::MAX_HISTORY_DAYS,
                p.history_days
            ));
        }
        for (symbol, benchmark) in &p.benchmark_mapping {
            if !market.contains(symbol.as_str()) {
                problems.push(format!(
                    "benchmark_mapping key '{symbol}' is not in market_symbols"
                ));
            }
            if !benchmarks.contains(benchmark.as_str()) {
                problems.push(format!(
                    "benchmark_mapping value '{benchmark}' is not in benchmark_symbols"
                ));
            }
        }

        for (name, value) in [
            ("validation.swing_threshold", self.validation.swing_threshold),
            (
                "reconciliation.discrepancy_threshold",
                self.reconciliation.discrepancy_threshold,
            ),
            ("forecast.z_score", self.forecast.z_score),
        ] {
            if !(value.is_finite() && value > 0.0) {
                problems.push(format!("{name} must be a positive number, got {value}"));
            }
        }
        if self.forecast.horizon_days > ForecastConfig::MAX_HORIZON_DAYS {
            problems.push(format!(
                "forecast.horizon_days must be at most {}, got {}",
                ForecastConfig::MAX_HORIZON_DAYS,
                self.forecast.horizon_days
            ));
        }
        if self.forecast.lookback < 2 {
            problems.push("forecast.lookback must be at least 2".to_string());
        }
        if self.retry.max_attempts == 0 {
            problems.push("retry.max_attempts must be at least 1".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }

    /// Historical window ending at `as_of` (inclusive).
    pub fn window(&self, as_of: NaiveDate) -> Result<FetchWindow, ConfigError> {
        let days = i64::from(self.pipeline.history_days);
        let start = as_of
            .checked_sub_signed(Duration::days(days))
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "a {days}-day window ending {as_of} starts before the earliest supported date"
                ))
            })?;
        Ok(FetchWindow {
            start,
            end: as_of,
            interval: self.pipeline.interval,
        })
    }

    /// BLAKE3 hex digest of the canonical JSON form of this config.
    pub fn fingerprint(&self) -> Result<String, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use priceguard_core::validation::ZeroOpenPolicy;

    const FULL: &str = r#"
[pipeline]
market_symbols = ["EURUSD=X", "BTC-USD"]
benchmark_symbols = ["EXR.D.USD.EUR.SP00.A"]
history_days = 730
interval = "1d"
max_workers = 4
output_dir = "data"
log_level = "info"

[pipeline.benchmark_mapping]
"EURUSD=X" = "EXR.D.USD.EUR.SP00.A"

[validation]
swing_threshold = 0.20
zero_open = "skip"

[reconciliation]
discrepancy_threshold = 0.01

[forecast]
enabled = true
lookback = 30

[retry]
max_attempts = 3
backoff_ms = 100
"#;

    #[test]
    fn parses_full_config() {
        let config = PipelineConfig::from_toml(FULL).unwrap();
        assert_eq!(config.pipeline.market_symbols.len(), 2);
        assert_eq!(
            config.pipeline.benchmark_mapping.get("EURUSD=X").map(String::as_str),
            Some("EXR.D.USD.EUR.SP00.A")
        );
        assert_eq!(config.validation.zero_open, ZeroOpenPolicy::Skip);
        assert!(config.forecast.enabled);
        assert_eq!(config.forecast.lookback, 30);
        // Unset keys keep their defaults
        assert_eq!(config.forecast.horizon_days, 30);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn optional_sections_default() {
        let config = PipelineConfig::from_toml("[pipeline]\nmarket_symbols = [\"SPY\"]\n").unwrap();
        assert_eq!(config.validation, ValidationConfig::default());
        assert_eq!(config.reconciliation.discrepancy_threshold, 0.01);
        assert!(!config.forecast.enabled);
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.pipeline.interval, Interval::Daily);
        assert_eq!(config.pipeline.history_days, 730);
    }

    #[test]
    fn rejects_invalid_values() {
        let toml = r#"
[pipeline]
market_symbols = ["SPY"]
max_workers = 0

[pipeline.benchmark_mapping]
"QQQ" = "REF"

[validation]
swing_threshold = -1.0
"#;
        let err = PipelineConfig::from_toml(toml).unwrap_err().to_string();
        assert!(err.contains("max_workers"), "{err}");
        assert!(err.contains("'QQQ' is not in market_symbols"), "{err}");
        assert!(err.contains("'REF' is not in benchmark_symbols"), "{err}");
        assert!(err.contains("swing_threshold"), "{err}");
    }

    #[test]
    fn rejects_empty_symbol_list() {
        assert!(matches!(
            PipelineConfig::from_toml("[pipeline]\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_unknown_keys() {
        let base = "[pipeline]\nmarket_symbols = [\"SPY\"]\n";
        for extra in [
            "max_worker = 2\n",
            "[validation]\nswing_treshold = 0.05\n",
            "[reconciliation]\nthreshold = 0.05\n",
            "[forecast]\nhorizon = 10\n",
            "[retry]\nattempts = 3\n",
        ] {
            let toml = format!("{base}{extra}");
            assert!(
                matches!(PipelineConfig::from_toml(&toml), Err(ConfigError::Parse(_))),
                "accepted {extra:?}"
            );
        }
    }

    #[test]
    fn rejects_out_of_range_horizons() {
        let toml = "[pipeline]\nmarket_symbols = [\"SPY\"]\nhistory_days = 4000000000\n\
                    [forecast]\nhorizon_days = 1000000\n";
        let err = PipelineConfig::from_toml(toml).unwrap_err().to_string();
        assert!(err.contains("history_days must be between 1 and 36500"), "{err}");
        assert!(err.contains("horizon_days must be at most 3650"), "{err}");
    }

    #[test]
    fn window_that_underflows_is_an_error() {
        let mut config = PipelineConfig::from_toml(FULL).unwrap();
        config.pipeline.history_days = u32::MAX;
        let as_of = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        assert!(matches!(config.window(as_of), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn window_spans_history_days() {
        let config = PipelineConfig::from_toml(FULL).unwrap();
        let as_of = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let window = config.window(as_of).unwrap();
        assert_eq!(window.end, as_of);
        assert_eq!((window.end - window.start).num_days(), 730);
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = PipelineConfig::from_toml(FULL).unwrap();
        let mut b = a.clone();
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        b.pipeline.max_workers = 8;
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = PipelineConfig::from_file(Path::new("/nonexistent/priceguard.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
