//! Ingestion Orchestrator: one fetch+normalize job per (symbol, source kind)
//! on a bounded private rayon pool.
//!
//! A failing job never aborts its siblings. Every job returns an owned value;
//! the caller blocks until the whole batch has been collected.

use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use priceguard_core::data::{
    FetchError, FetchOutcome, Interval, Normalizer, SchemaError, SourceAdapter, SourceKind,
};
use priceguard_core::domain::{BenchmarkSeries, Series};

/// One unit of ingestion work.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IngestJob {
    pub symbol: String,
    pub kind: SourceKind,
}

impl IngestJob {
    pub fn market(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            kind: SourceKind::MarketPrice,
        }
    }

    pub fn benchmark(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            kind: SourceKind::Benchmark,
        }
    }
}

impl fmt::Display for IngestJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.symbol, self.kind)
    }
}

/// Historical window and bar interval shared by every job in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: Interval,
}

/// Bounded retry of transient fetch failures.
///
/// `max_attempts = 1` means every job is attempted exactly once. Delays grow
/// exponentially from `backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (1-based count of failures so far).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

/// Why a job produced no series.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("fetch failed after {attempts} attempt(s): {source}")]
    Fetch {
        attempts: u32,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("no data returned for {symbol}")]
    Empty { symbol: String },

    #[error("no adapter configured for {kind} sources")]
    NoAdapter { kind: SourceKind },

    #[error("adapter panicked: {message}")]
    Panicked { message: String },
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Adapters for each source kind.
pub struct AdapterSet {
    pub market: Box<dyn SourceAdapter>,
    pub benchmark: Option<Box<dyn SourceAdapter>>,
}

impl AdapterSet {
    pub fn new(market: Box<dyn SourceAdapter>) -> Self {
        Self {
            market,
            benchmark: None,
        }
    }

    pub fn with_benchmark(mut self, benchmark: Box<dyn SourceAdapter>) -> Self {
        self.benchmark = Some(benchmark);
        self
    }

    pub fn for_kind(&self, kind: SourceKind) -> Option<&dyn SourceAdapter> {
        match kind {
            SourceKind::MarketPrice => Some(self.market.as_ref()),
            SourceKind::Benchmark => self.benchmark.as_deref(),
        }
    }
}

/// Normalized output of one successful job.
#[derive(Debug)]
enum Ingested {
    Prices(Series),
    Benchmark(BenchmarkSeries),
}

/// Everything one ingestion batch produced.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub prices: BTreeMap<String, Series>,
    pub benchmarks: BTreeMap<String, BenchmarkSeries>,
    pub failed: BTreeMap<IngestJob, IngestError>,
}

impl IngestOutcome {
    /// Symbols of failed jobs of the given kind.
    pub fn failed_symbols(&self, kind: SourceKind) -> impl Iterator<Item = &str> + '_ {
        self.failed
            .keys()
            .filter(move |job| job.kind == kind)
            .map(|job| job.symbol.as_str())
    }
}

pub struct Orchestrator {
    adapters: AdapterSet,
    retry: RetryPolicy,
    pool: rayon::ThreadPool,
}

impl Orchestrator {
    pub fn new(
        adapters: AdapterSet,
        max_workers: usize,
        retry: RetryPolicy,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_workers.max(1))
            .thread_name(|i| format!("priceguard-worker-{i}"))
            .build()?;
        Ok(Self {
            adapters,
            retry,
            pool,
        })
    }

    /// The bounded worker pool, shared with the per-symbol stages.
    pub fn pool(&self) -> &rayon::ThreadPool {
        &self.pool
    }

    /// Run every job and wait for all of them.
    pub fn ingest(&self, jobs: &[IngestJob], window: &FetchWindow) -> IngestOutcome {
        info!(
            jobs = jobs.len(),
            start = %window.start,
            end = %window.end,
            interval = %window.interval,
            "starting ingestion"
        );

        let results: Vec<(IngestJob, Result<Ingested, IngestError>)> = self.pool.install(|| {
            jobs.par_iter()
                .map(|job| (job.clone(), self.run_isolated(job, window)))
                .collect()
        });

        let mut outcome = IngestOutcome::default();
        for (job, result) in results {
            match result {
                Ok(Ingested::Prices(series)) => {
                    outcome.prices.insert(job.symbol, series);
                }
                Ok(Ingested::Benchmark(series)) => {
                    outcome.benchmarks.insert(job.symbol, series);
                }
                Err(e) => {
                    match &e {
                        IngestError::Empty { .. } => {
                            warn!(job = %job, "no data returned; symbol skipped")
                        }
                        _ => error!(job = %job, error = %e, "ingestion failed"),
                    }
                    outcome.failed.insert(job, e);
                }
            }
        }

        info!(
            succeeded = outcome.prices.len() + outcome.benchmarks.len(),
            failed = outcome.failed.len(),
            total = jobs.len(),
            "ingestion complete"
        );
        outcome
    }

    /// A panicking adapter fails its own job only.
    fn run_isolated(&self, job: &IngestJob, window: &FetchWindow) -> Result<Ingested, IngestError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.run_job(job, window))).unwrap_or_else(
            |payload| {
                Err(IngestError::Panicked {
                    message: panic_message(payload.as_ref()),
                })
            },
        )
    }

    fn run_job(&self, job: &IngestJob, window: &FetchWindow) -> Result<Ingested, IngestError> {
        let adapter = self
            .adapters
            .for_kind(job.kind)
            .ok_or(IngestError::NoAdapter { kind: job.kind })?;

        debug!(job = %job, adapter = adapter.name(), "fetch started");
        let frame = match self.fetch_with_retry(adapter, &job.symbol, window)? {
            FetchOutcome::Rows(frame) => frame,
            FetchOutcome::Empty => {
                return Err(IngestError::Empty {
                    symbol: job.symbol.clone(),
                })
            }
        };

        let ingested = match job.kind {
            SourceKind::MarketPrice => Ingested::Prices(Normalizer::prices(&job.symbol, &frame)?),
            SourceKind::Benchmark => {
                Ingested::Benchmark(Normalizer::benchmark(&job.symbol, &frame)?)
            }
        };
        debug!(job = %job, rows = frame.len(), "fetch finished");
        Ok(ingested)
    }

    fn fetch_with_retry(
        &self,
        adapter: &dyn SourceAdapter,
        symbol: &str,
        window: &FetchWindow,
    ) -> Result<FetchOutcome, IngestError> {
        let mut attempt = 1;
        loop {
            match adapter.fetch(symbol, window.start, window.end, window.interval) {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        symbol,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient fetch failure; retrying"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(source) => {
                    return Err(IngestError::Fetch {
                        attempts: attempt,
                        source,
                    })
                }
            }
        }
    }
}
