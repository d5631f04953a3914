//! Yahoo Finance market-price adapter.
//!
//! Fetches OHLCV bars from Yahoo's v8 chart API and hands them on as a raw
//! frame with Yahoo's own column names. Yahoo has no official API and is
//! subject to unannounced format changes; those surface as
//! `FetchError::ResponseFormat`.

use chrono::{DateTime, Duration as TimeDelta, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::provider::{
    FetchError, FetchOutcome, Interval, RawFrame, RawValue, SourceAdapter, SourceKind,
};

pub const COLUMNS: [&str; 7] = ["Date", "Open", "High", "Low", "Close", "Adj Close", "Volume"];

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    gmtoffset: Option<i64>,
    exchange_timezone_name: Option<String>,
}

/// How bar instants map onto exchange-local session dates.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SessionClock {
    /// IANA zone; the offset follows daylight saving per bar.
    Zone(Tz),
    /// Single offset in seconds, used when the zone name is missing or unknown.
    Fixed(i64),
}

impl SessionClock {
    fn from_meta(meta: Option<&ChartMeta>) -> Self {
        let zone = meta
            .and_then(|m| m.exchange_timezone_name.as_deref())
            .and_then(|name| name.parse::<Tz>().ok());
        match zone {
            Some(tz) => SessionClock::Zone(tz),
            None => SessionClock::Fixed(meta.and_then(|m| m.gmtoffset).unwrap_or(0)),
        }
    }

    fn local_date(&self, ts: i64) -> Option<NaiveDate> {
        let utc = DateTime::<Utc>::from_timestamp(ts, 0)?;
        match *self {
            SessionClock::Zone(tz) => Some(utc.with_timezone(&tz).date_naive()),
            SessionClock::Fixed(offset) => utc
                .checked_add_signed(TimeDelta::seconds(offset))
                .map(|local| local.date_naive()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// Yahoo Finance chart adapter.
pub struct YahooAdapter {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl YahooAdapter {
    pub const DEFAULT_BASE_URL: &'static str = "https://query2.finance.yahoo.com";

    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(Self::DEFAULT_BASE_URL)
    }

    /// Adapter pointed at an alternative host (mirrors, local stubs).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Build the chart API URL for a symbol and date range.
    fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate, interval: Interval) -> String {
        let start_ts = start
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_default();
        let end_ts = end
            .and_hms_opt(23, 59, 59)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_default();
        format!(
            "{}/v8/finance/chart/{symbol}\
             ?period1={start_ts}&period2={end_ts}&interval={interval}\
             &includeAdjustedClose=true",
            self.base_url
        )
    }
}

/// Parse the chart API response into a raw frame.
fn parse_response(
    symbol: &str,
    resp: ChartResponse,
    interval: Interval,
) -> Result<FetchOutcome, FetchError> {
    let result = match resp.chart.result {
        Some(result) => result,
        None => {
            return match resp.chart.error {
                Some(err) if err.code == "Not Found" => Ok(FetchOutcome::Empty),
                Some(err) => Err(FetchError::ResponseFormat(format!(
                    "{}: {}",
                    err.code, err.description
                ))),
                None => Err(FetchError::ResponseFormat(
                    "empty result with no error".into(),
                )),
            };
        }
    };

    let Some(data) = result.into_iter().next() else {
        return Ok(FetchOutcome::Empty);
    };

    // No timestamps means no bars in the window.
    let Some(timestamps) = data.timestamp else {
        return Ok(FetchOutcome::Empty);
    };

    let quote = data
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::ResponseFormat(format!("no quote data for {symbol}")))?;

    let adj_closes = data
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .map(|a| a.adjclose);

    let clock = SessionClock::from_meta(data.meta.as_ref());

    let mut frame = RawFrame::new(COLUMNS);
    for (i, &ts) in timestamps.iter().enumerate() {
        let open = quote.open.get(i).copied().flatten();
        let high = quote.high.get(i).copied().flatten();
        let low = quote.low.get(i).copied().flatten();
        let close = quote.close.get(i).copied().flatten();
        let volume = quote.volume.get(i).copied().flatten();

        // Holidays and non-trading days come back as all-null rows
        if open.is_none() && high.is_none() && low.is_none() && close.is_none() && volume.is_none()
        {
            continue;
        }

        let adj_close = adj_closes.as_ref().and_then(|v| v.get(i).copied().flatten());

        let date = if interval.is_date_based() {
            // Daily bars are stamped at the exchange's local session date
            let local = clock.local_date(ts).ok_or_else(|| {
                FetchError::ResponseFormat(format!("invalid timestamp: {ts}"))
            })?;
            RawValue::Text(local.format("%Y-%m-%d").to_string())
        } else {
            RawValue::Int(ts)
        };

        frame.push_row(vec![
            date,
            open.into(),
            high.into(),
            low.into(),
            close.into(),
            adj_close.into(),
            volume.into(),
        ]);
    }

    debug!(symbol, rows = frame.len(), "parsed chart response");
    Ok(FetchOutcome::from_frame(frame))
}

impl SourceAdapter for YahooAdapter {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::MarketPrice
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: Interval,
    ) -> Result<FetchOutcome, FetchError> {
        if symbol.trim().is_empty() {
            return Err(FetchError::InvalidSymbol {
                symbol: symbol.to_string(),
                reason: "empty symbol".into(),
            });
        }

        let url = self.chart_url(symbol, start, end, interval);
        let resp = self.client.get(&url).send().map_err(|e| {
            FetchError::Network(format!("{symbol}: {e}"))
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(FetchOutcome::Empty);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(FetchError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        if !status.is_success() {
            return Err(FetchError::Http {
                source_name: self.name().to_string(),
                symbol: symbol.to_string(),
                status: status.as_u16(),
            });
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            FetchError::ResponseFormat(format!("failed to parse response for {symbol}: {e}"))
        })?;

        parse_response(symbol, chart, interval)
    }
}
