//! Forecast check: a statistical band model over a symbol's clean closes.
//!
//! The forecasting collaborator is a trait so a heavier model can be
//! plugged in. The in-tree [`BandForecaster`] fits a mean ± z·σ band to the
//! recent history and reports an anomaly when the latest close falls
//! outside it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{DetectionStage, FlagSet, QualityFlag, Series, SymbolPartition};

/// Forecast settings (`[forecast]` in the config file).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastConfig {
    pub enabled: bool,
    /// Number of historical closes the band is fitted on.
    pub lookback: usize,
    pub z_score: f64,
    /// Days projected past the latest observation.
    pub horizon_days: usize,
}

impl ForecastConfig {
    /// Upper bound on `horizon_days`.
    pub const MAX_HORIZON_DAYS: usize = 3_650;
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            lookback: 60,
            z_score: 1.96,
            horizon_days: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    #[error("{symbol}: need at least {need} historical closes, have {have}")]
    InsufficientHistory {
        symbol: String,
        have: usize,
        need: usize,
    },

    #[error("{symbol}: model produced a non-finite band")]
    NonFinite { symbol: String },
}

/// One row of the forecast artifact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub ds: DateTime<Utc>,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub is_anomaly: bool,
    pub lower: f64,
    pub upper: f64,
    /// Timestamp and close of the observation that was checked.
    pub latest: Option<(DateTime<Utc>, f64)>,
    pub points: Vec<ForecastPoint>,
    pub in_sample_mae: f64,
}

/// Forecasting collaborator capability.
pub trait Forecaster: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, symbol: &str, series: &Series) -> Result<Forecast, ForecastError>;
}

/// Mean ± z·σ band over the last `lookback` closes before the latest one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandForecaster {
    pub lookback: usize,
    pub z_score: f64,
    pub horizon: usize,
}

impl BandForecaster {
    pub const MIN_HISTORY: usize = 2;

    /// `horizon` is capped at [`ForecastConfig::MAX_HORIZON_DAYS`].
    pub fn new(lookback: usize, z_score: f64, horizon: usize) -> Self {
        Self {
            lookback,
            z_score,
            horizon: horizon.min(ForecastConfig::MAX_HORIZON_DAYS),
        }
    }

    pub fn from_config(config: &ForecastConfig) -> Self {
        Self::new(config.lookback, config.z_score, config.horizon_days)
    }
}

impl Default for BandForecaster {
    fn default() -> Self {
        Self::from_config(&ForecastConfig::default())
    }
}

impl Forecaster for BandForecaster {
    fn name(&self) -> &str {
        "band"
    }

    fn predict(&self, symbol: &str, series: &Series) -> Result<Forecast, ForecastError> {
        let observed: Vec<(DateTime<Utc>, f64)> = series
            .iter()
            .filter_map(|r| r.close.map(|c| (r.timestamp, c)))
            .collect();

        let Some((&latest, before)) = observed.split_last() else {
            return Err(ForecastError::InsufficientHistory {
                symbol: symbol.to_string(),
                have: 0,
                need: Self::MIN_HISTORY,
            });
        };
        let history = &before[before.len().saturating_sub(self.lookback)..];
        if history.len() < Self::MIN_HISTORY {
            return Err(ForecastError::InsufficientHistory {
                symbol: symbol.to_string(),
                have: history.len(),
                need: Self::MIN_HISTORY,
            });
        }

        let n = history.len() as f64;
        let mean = history.iter().map(|(_, c)| c).sum::<f64>() / n;
        let variance = history.iter().map(|(_, c)| (c - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let half_width = self.z_score * variance.sqrt();
        let (lower, upper) = (mean - half_width, mean + half_width);
        if !lower.is_finite() || !upper.is_finite() {
            return Err(ForecastError::NonFinite {
                symbol: symbol.to_string(),
            });
        }

        let in_sample_mae = history.iter().map(|(_, c)| (c - mean).abs()).sum::<f64>() / n;

        let point = |ds| ForecastPoint {
            ds,
            yhat: mean,
            yhat_lower: lower,
            yhat_upper: upper,
        };
        let mut points: Vec<ForecastPoint> = history.iter().map(|&(ds, _)| point(ds)).collect();
        points.push(point(latest.0));
        let horizon = self.horizon.min(ForecastConfig::MAX_HORIZON_DAYS);
        points.extend(
            (1..=horizon as i64)
                .map_while(|day| latest.0.checked_add_signed(Duration::days(day)))
                .map(point),
        );

        let (latest_ts, latest_close) = latest;
        let is_anomaly = latest_close < lower || latest_close > upper;
        if is_anomaly {
            warn!(
                symbol,
                timestamp = %latest_ts,
                close = latest_close,
                lower,
                upper,
                "latest close outside forecast band"
            );
        } else {
            debug!(symbol, mae = in_sample_mae, "forecast band fitted");
        }

        Ok(Forecast {
            is_anomaly,
            lower,
            upper,
            latest: Some(latest),
            points,
            in_sample_mae,
        })
    }
}

/// Promote the checked record when the forecast reports an anomaly.
///
/// Returns true if a record was moved to quarantine.
pub fn apply_forecast(partition: &mut SymbolPartition, forecast: &Forecast) -> bool {
    let Some((latest_ts, _)) = forecast.latest.filter(|_| forecast.is_anomaly) else {
        return false;
    };
    partition.promote(DetectionStage::Forecast, |record| {
        (record.timestamp == latest_ts).then(|| FlagSet::single(QualityFlag::ForecastAnomaly))
    }) > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntryValue, Record};
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn series(closes: &[f64]) -> Series {
        Series::new(
            "BTC-USD",
            closes
                .iter()
                .enumerate()
                .map(|(i, &c)| Record::new(ts(i as u32 + 1), c, c, c, c, 1))
                .collect(),
        )
    }

    #[test]
    fn calm_series_is_not_anomalous() {
        let f = BandForecaster::new(60, 1.96, 5)
            .predict("BTC-USD", &series(&[100.0, 101.0, 99.0, 100.5, 100.0]))
            .unwrap();
        assert!(!f.is_anomaly);
        // 4 history points, the latest, 5 projected
        assert_eq!(f.points.len(), 10);
        assert_eq!(f.latest, Some((ts(5), 100.0)));
    }

    #[test]
    fn jump_outside_band_is_anomalous() {
        let f = BandForecaster::default()
            .predict("BTC-USD", &series(&[100.0, 101.0, 99.0, 100.0, 150.0]))
            .unwrap();
        assert!(f.is_anomaly);
        assert!(f.upper < 150.0);
    }

    #[test]
    fn lookback_limits_history() {
        // Early wild values fall out of a 3-point lookback.
        let f = BandForecaster::new(3, 1.96, 0)
            .predict("X", &series(&[10.0, 500.0, 100.0, 101.0, 99.0, 100.0]))
            .unwrap();
        assert!(((f.lower + f.upper) / 2.0 - 100.0).abs() < 1e-9);
        assert_eq!(f.points.len(), 4);
    }

    #[test]
    fn short_history_is_an_error() {
        let err = BandForecaster::default()
            .predict("X", &series(&[1.0, 2.0]))
            .unwrap_err();
        assert_eq!(
            err,
            ForecastError::InsufficientHistory {
                symbol: "X".into(),
                have: 1,
                need: 2
            }
        );
    }

    #[test]
    fn anomaly_promotes_latest_record() {
        let s = series(&[100.0, 101.0, 99.0, 100.0, 150.0]);
        let f = BandForecaster::default().predict("BTC-USD", &s).unwrap();
        let mut partition = SymbolPartition::new(s, Vec::new());
        assert!(apply_forecast(&mut partition, &f));
        assert_eq!(partition.clean_count(), 4);
        let entry = &partition.quarantine_entries()[0];
        assert_eq!(entry.timestamp(), ts(5));
        assert_eq!(entry.value(), EntryValue::Placeholder);
        assert_eq!(entry.stage(), DetectionStage::Forecast);
    }

    #[test]
    fn horizon_is_capped() {
        let f = BandForecaster::new(60, 1.96, usize::MAX)
            .predict("X", &series(&[100.0, 101.0, 99.0, 100.0]))
            .unwrap();
        // 3 history points, the latest, then the capped projection
        assert_eq!(f.points.len(), 4 + ForecastConfig::MAX_HORIZON_DAYS);
    }

    #[test]
    fn config_rejects_unknown_keys() {
        let err = serde_json::from_str::<ForecastConfig>(r#"{"horizon": 10}"#).unwrap_err();
        assert!(err.to_string().contains("unknown field"), "{err}");
    }
}
