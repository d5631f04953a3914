//! Source adapter trait, raw frame type and structured fetch errors.
//!
//! The SourceAdapter trait abstracts over data sources (Yahoo Finance, ECB,
//! local CSV, synthetic) so the orchestrator never knows which one it is
//! talking to, and tests can substitute their own.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One untyped cell as delivered by an adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawValue {
    /// Text cell; empty or whitespace-only text becomes `Null`.
    pub fn text(s: impl AsRef<str>) -> Self {
        let s = s.as_ref().trim();
        if s.is_empty() {
            RawValue::Null
        } else {
            RawValue::Text(s.to_string())
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }
}

impl From<Option<f64>> for RawValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(RawValue::Null, RawValue::Float)
    }
}

impl From<Option<i64>> for RawValue {
    fn from(v: Option<i64>) -> Self {
        v.map_or(RawValue::Null, RawValue::Int)
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => f.write_str("null"),
            RawValue::Int(v) => write!(f, "{v}"),
            RawValue::Float(v) => write!(f, "{v}"),
            RawValue::Text(s) => f.write_str(s),
        }
    }
}

/// Adapter output before normalization: a header row plus untyped rows.
///
/// Column names are whatever the source uses (`Close`, `OBS_VALUE`, ...);
/// mapping them onto the canonical schema is the normalizer's job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFrame {
    columns: Vec<String>,
    rows: Vec<Vec<RawValue>>,
}

impl RawFrame {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row. Short rows are padded with `Null`, long rows truncated.
    pub fn push_row(&mut self, mut row: Vec<RawValue>) {
        row.resize(self.columns.len(), RawValue::Null);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<RawValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the first column whose name matches any alias (case-insensitive).
    pub fn column_index(&self, aliases: &[&str]) -> Option<usize> {
        aliases.iter().find_map(|alias| {
            self.columns
                .iter()
                .position(|c| c.trim().eq_ignore_ascii_case(alias))
        })
    }
}

/// What a successful fetch returned.
///
/// "No data" is a normal outcome, not an error: adapters return `Empty`
/// and the orchestrator decides what that means for the run.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Rows(RawFrame),
    Empty,
}

impl FetchOutcome {
    /// `Empty` if the frame has no rows.
    pub fn from_frame(frame: RawFrame) -> Self {
        if frame.is_empty() {
            FetchOutcome::Empty
        } else {
            FetchOutcome::Rows(frame)
        }
    }
}

/// Which kind of source a job targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Primary OHLCV price source.
    MarketPrice,
    /// Independent reference source used only for reconciliation.
    Benchmark,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceKind::MarketPrice => "market_price",
            SourceKind::Benchmark => "benchmark",
        })
    }
}

/// Bar interval requested from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1h")]
    Hourly,
    #[default]
    #[serde(rename = "1d")]
    Daily,
    #[serde(rename = "1wk")]
    Weekly,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Hourly => "1h",
            Interval::Daily => "1d",
            Interval::Weekly => "1wk",
        }
    }

    /// Whether bars are identified by calendar date rather than instant.
    pub fn is_date_based(&self) -> bool {
        !matches!(self, Interval::Hourly)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1h" => Ok(Interval::Hourly),
            "1d" => Ok(Interval::Daily),
            "1wk" => Ok(Interval::Weekly),
            other => Err(format!("unknown interval '{other}' (expected 1h, 1d or 1wk)")),
        }
    }
}

/// Structured fetch errors.
///
/// These are designed to be displayable in logs and the CLI summary.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("HTTP {status} from {source_name} for {symbol}")]
    Http {
        source_name: String,
        symbol: String,
        status: u16,
    },

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("invalid symbol '{symbol}': {reason}")]
    InvalidSymbol { symbol: String, reason: String },

    #[error("I/O error: {0}")]
    Io(String),
}

impl FetchError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::RateLimited { .. } => true,
            FetchError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Fetch capability implemented by every source.
///
/// Implementations must not return an error for "no data"; they return
/// `FetchOutcome::Empty` instead.
pub trait SourceAdapter: Send + Sync {
    /// Human-readable name of this adapter.
    fn name(&self) -> &str;

    /// Which kind of series this adapter produces.
    fn kind(&self) -> SourceKind;

    /// Fetch the raw series for one symbol over `[start, end]`.
    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: Interval,
    ) -> Result<FetchOutcome, FetchError>;
}

/// Filesystem-safe version of a symbol, used for file names.
///
/// FX pairs lose their `=X` suffix (`EURUSD=X` → `EURUSD`); any character
/// outside `[A-Za-z0-9._-]` becomes `_`.
pub fn safe_symbol(symbol: &str) -> String {
    symbol
        .trim()
        .trim_end_matches("=X")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_lookup_is_case_insensitive() {
        let frame = RawFrame::new(["Date", "Open", "OBS_VALUE"]);
        assert_eq!(frame.column_index(&["date"]), Some(0));
        assert_eq!(frame.column_index(&["value", "obs_value"]), Some(2));
        assert_eq!(frame.column_index(&["close"]), None);
    }

    #[test]
    fn short_rows_are_padded() {
        let mut frame = RawFrame::new(["a", "b", "c"]);
        frame.push_row(vec![RawValue::Int(1)]);
        assert_eq!(frame.rows()[0].len(), 3);
        assert!(frame.rows()[0][2].is_null());
    }

    #[test]
    fn empty_frame_is_empty_outcome() {
        assert_eq!(
            FetchOutcome::from_frame(RawFrame::new(["Date"])),
            FetchOutcome::Empty
        );
    }

    #[test]
    fn interval_parses_config_spelling() {
        assert_eq!("1d".parse::<Interval>().unwrap(), Interval::Daily);
        assert_eq!("1wk".parse::<Interval>().unwrap(), Interval::Weekly);
        assert!("5m".parse::<Interval>().is_err());
    }

    #[test]
    fn transient_errors() {
        assert!(FetchError::Network("timeout".into()).is_transient());
        assert!(FetchError::Http {
            source_name: "yahoo".into(),
            symbol: "SPY".into(),
            status: 503
        }
        .is_transient());
        assert!(!FetchError::ResponseFormat("bad".into()).is_transient());
    }

    #[test]
    fn safe_symbol_strips_fx_suffix() {
        assert_eq!(safe_symbol("EURUSD=X"), "EURUSD");
        assert_eq!(safe_symbol("BTC-USD"), "BTC-USD");
        assert_eq!(safe_symbol("^GSPC"), "_GSPC");
        assert_eq!(safe_symbol("EXR.D.USD.EUR.SP00.A"), "EXR.D.USD.EUR.SP00.A");
    }
}
