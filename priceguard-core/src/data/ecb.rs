//! ECB Data Portal benchmark adapter (SDMX-CSV).
//!
//! Series keys look like `EXR.D.USD.EUR.SP00.A`: the part before the first
//! dot is the dataflow, the rest is the key within it.

use chrono::NaiveDate;
use std::time::Duration;
use tracing::debug;

use super::csv_dir::frame_from_reader;
use super::provider::{FetchError, FetchOutcome, Interval, SourceAdapter, SourceKind};

/// ECB Data Portal adapter.
pub struct EcbAdapter {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl EcbAdapter {
    pub const DEFAULT_BASE_URL: &'static str = "https://data-api.ecb.europa.eu/service/data";

    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(Self::DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn series_url(&self, series_key: &str, start: NaiveDate, end: NaiveDate) -> Result<String, FetchError> {
        let (flow, key) = split_series_key(series_key)?;
        Ok(format!(
            "{}/{flow}/{key}?format=csvdata&startPeriod={}&endPeriod={}",
            self.base_url,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d"),
        ))
    }
}

/// Split `FLOW.KEY...` at the first dot.
pub fn split_series_key(series_key: &str) -> Result<(&str, &str), FetchError> {
    match series_key.trim().split_once('.') {
        Some((flow, key)) if !flow.is_empty() && !key.is_empty() => Ok((flow, key)),
        _ => Err(FetchError::InvalidSymbol {
            symbol: series_key.to_string(),
            reason: "expected <FLOW>.<KEY>, e.g. EXR.D.USD.EUR.SP00.A".into(),
        }),
    }
}

impl SourceAdapter for EcbAdapter {
    fn name(&self) -> &str {
        "ecb_data_portal"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Benchmark
    }

    // The ECB reports at its own granularity; the interval is not forwarded.
    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        _interval: Interval,
    ) -> Result<FetchOutcome, FetchError> {
        let url = self.series_url(symbol, start, end)?;
        let resp = self
            .client
            .get(&url)
            .header("Accept", "text/csv")
            .send()
            .map_err(|e| FetchError::Network(format!("{symbol}: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(FetchOutcome::Empty);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                retry_after_secs: 60,
            });
        }
        if !status.is_success() {
            return Err(FetchError::Http {
                source_name: self.name().to_string(),
                symbol: symbol.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp
            .text()
            .map_err(|e| FetchError::Network(format!("{symbol}: {e}")))?;
        if body.trim().is_empty() {
            return Ok(FetchOutcome::Empty);
        }

        let frame = frame_from_reader(body.as_bytes())?;
        debug!(symbol, rows = frame.len(), "parsed ECB series");
        Ok(FetchOutcome::from_frame(frame))
    }
}
