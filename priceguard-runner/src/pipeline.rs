//! One pipeline run: ingest → validate → reconcile → forecast → aggregate → report.
//!
//! Per-symbol stages run in parallel on the orchestrator's pool. Their owned
//! outcomes are then handed one at a time to the aggregator on the calling
//! thread.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info, warn};

use priceguard_core::data::SourceKind;
use priceguard_core::domain::{BenchmarkSeries, QuarantineEntry, Series};
use priceguard_core::forecast::{apply_forecast, BandForecaster, Forecaster};
use priceguard_core::reconcile::{Reconciler, ReconciliationStats};
use priceguard_core::validation::ValidationEngine;

use crate::aggregator::{AggregationError, QuarantineAggregator};
use crate::config::{ConfigError, PipelineConfig};
use crate::orchestrator::{AdapterSet, IngestJob, IngestOutcome, Orchestrator};
use crate::report::{write_forecast_artifact, write_report};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

/// Per-symbol result line of the run summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolSummary {
    pub symbol: String,
    pub input_count: usize,
    pub clean_count: usize,
    pub quarantined_count: usize,
    pub reconciliation: Option<ReconciliationStats>,
    pub forecast_anomaly: bool,
    pub forecast_artifact: Option<PathBuf>,
}

/// A job that produced no series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobFailure {
    pub symbol: String,
    pub kind: SourceKind,
    pub error: String,
}

/// Record of one run. Not persisted beyond the report artifact.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub requested: BTreeSet<String>,
    pub succeeded: BTreeSet<String>,
    pub failed: BTreeSet<String>,
    pub failed_benchmarks: BTreeSet<String>,
    pub failures: Vec<JobFailure>,
    pub symbols: Vec<SymbolSummary>,
    pub quarantine_count: usize,
    pub report_path: Option<PathBuf>,
}

impl PipelineRun {
    /// No quarantine entries, hence no report.
    pub fn is_healthy(&self) -> bool {
        self.quarantine_count == 0
    }

    /// Every requested job produced a series.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Owned output of the per-symbol stages.
struct SymbolOutcome {
    summary: SymbolSummary,
    entries: Vec<QuarantineEntry>,
}

pub struct Pipeline {
    config: PipelineConfig,
    orchestrator: Orchestrator,
    validation: ValidationEngine,
    reconciler: Reconciler,
    forecaster: Option<Box<dyn Forecaster>>,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig, adapters: AdapterSet) -> Result<Self, PipelineError> {
        config.validate()?;
        let orchestrator = Orchestrator::new(
            adapters,
            config.pipeline.max_workers,
            config.retry.policy(),
        )?;
        let forecaster: Option<Box<dyn Forecaster>> = if config.forecast.enabled {
            Some(Box::new(BandForecaster::from_config(&config.forecast)))
        } else {
            None
        };

        let validation = ValidationEngine::standard(&config.validation);
        info!(
            rules = ?validation.rule_names(),
            forecast = forecaster.as_ref().map(|f| f.name()),
            "pipeline configured"
        );

        Ok(Self {
            config: config.clone(),
            orchestrator,
            validation,
            reconciler: Reconciler::new(&config.reconciliation),
            forecaster,
        })
    }

    /// Replace the forecasting collaborator (enables the forecast check).
    pub fn with_forecaster(mut self, forecaster: Box<dyn Forecaster>) -> Self {
        self.forecaster = Some(forecaster);
        self
    }

    /// Execute one run over the window ending at `as_of`.
    pub fn run(&self, as_of: NaiveDate) -> Result<PipelineRun, PipelineError> {
        let started_at = Utc::now();
        let run_id = self.run_id(started_at)?;
        let settings = &self.config.pipeline;
        let window = self.config.window(as_of)?;

        info!(
            run_id = %run_id,
            start = %window.start,
            end = %window.end,
            "pipeline run started"
        );

        let jobs: Vec<IngestJob> = settings
            .market_symbols
            .iter()
            .map(IngestJob::market)
            .chain(settings.benchmark_symbols.iter().map(IngestJob::benchmark))
            .collect();

        let outcome = self.orchestrator.ingest(&jobs, &window);
        let failed_benchmarks: BTreeSet<String> = outcome
            .failed_symbols(SourceKind::Benchmark)
            .map(str::to_string)
            .collect();
        let failures: Vec<JobFailure> = outcome
            .failed
            .iter()
            .map(|(job, e)| JobFailure {
                symbol: job.symbol.clone(),
                kind: job.kind,
                error: e.to_string(),
            })
            .collect();
        let IngestOutcome { prices, benchmarks, .. } = outcome;

        let succeeded: BTreeSet<String> = prices.keys().cloned().collect();
        let mut outcomes: Vec<SymbolOutcome> = self.orchestrator.pool().install(|| {
            prices
                .into_par_iter()
                .map(|(symbol, series)| self.process_symbol(symbol, series, &benchmarks))
                .collect()
        });
        outcomes.sort_by(|a, b| a.summary.symbol.cmp(&b.summary.symbol));

        // Single consumer: the only place quarantine entries are accumulated.
        let mut aggregator = QuarantineAggregator::new();
        let mut symbols = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            aggregator.absorb(outcome.entries)?;
            symbols.push(outcome.summary);
        }

        let report_path = write_report(&settings.output_dir, as_of, &aggregator)?;
        let requested: BTreeSet<String> = settings.market_symbols.iter().cloned().collect();
        let failed: BTreeSet<String> = requested.difference(&succeeded).cloned().collect();

        let run = PipelineRun {
            run_id,
            started_at,
            window_start: window.start,
            window_end: window.end,
            requested,
            succeeded,
            failed,
            failed_benchmarks,
            failures,
            symbols,
            quarantine_count: aggregator.len(),
            report_path,
        };

        match &run.report_path {
            Some(path) => error!(
                quarantined = run.quarantine_count,
                report = %path.display(),
                "pipeline finished with issues"
            ),
            None => info!(
                succeeded = run.succeeded.len(),
                failed = run.failed.len(),
                "pipeline finished; no data issues found"
            ),
        }
        Ok(run)
    }

    fn process_symbol(
        &self,
        symbol: String,
        series: Series,
        benchmarks: &BTreeMap<String, BenchmarkSeries>,
    ) -> SymbolOutcome {
        let input_count = series.len();
        let mut partition = self.validation.validate(series);

        let reconciliation = self
            .config
            .pipeline
            .benchmark_mapping
            .get(&symbol)
            .and_then(|benchmark_symbol| match benchmarks.get(benchmark_symbol) {
                Some(benchmark) => {
                    info!(
                        symbol = %symbol,
                        benchmark = %benchmark_symbol,
                        "reconciling against benchmark"
                    );
                    Some(self.reconciler.reconcile(&mut partition, benchmark))
                }
                None => {
                    warn!(
                        symbol = %symbol,
                        benchmark = %benchmark_symbol,
                        "benchmark unavailable; reconciliation skipped"
                    );
                    None
                }
            });

        let mut forecast_anomaly = false;
        let mut forecast_artifact = None;
        if let Some(forecaster) = &self.forecaster {
            match forecaster.predict(&symbol, partition.clean()) {
                Ok(forecast) => {
                    forecast_anomaly = apply_forecast(&mut partition, &forecast);
                    let dir = &self.config.pipeline.output_dir;
                    match write_forecast_artifact(dir, &symbol, &forecast) {
                        Ok(path) => forecast_artifact = Some(path),
                        Err(e) => warn!(
                            symbol = %symbol,
                            error = %format!("{e:#}"),
                            "forecast artifact not written"
                        ),
                    }
                }
                Err(e) => warn!(symbol = %symbol, error = %e, "forecast check skipped"),
            }
        }

        let entries = partition.quarantine_entries();
        SymbolOutcome {
            summary: SymbolSummary {
                symbol,
                input_count,
                clean_count: partition.clean_count(),
                quarantined_count: partition.quarantine_count(),
                reconciliation,
                forecast_anomaly,
                forecast_artifact,
            },
            entries,
        }
    }

    /// Short BLAKE3 id over the config fingerprint and the start instant.
    fn run_id(&self, started_at: DateTime<Utc>) -> Result<String, ConfigError> {
        let fingerprint = self.config.fingerprint()?;
        let seed = format!(
            "{fingerprint}:{}",
            started_at.to_rfc3339_opts(SecondsFormat::Nanos, true)
        );
        let hex = blake3::hash(seed.as_bytes()).to_hex();
        Ok(hex[..16].to_string())
    }
}

/// Build a pipeline and run it once, with context on failure.
pub fn run_pipeline(
    config: &PipelineConfig,
    adapters: AdapterSet,
    as_of: NaiveDate,
) -> anyhow::Result<PipelineRun> {
    use anyhow::Context;

    let pipeline = Pipeline::new(config, adapters).context("failed to set up pipeline")?;
    pipeline
        .run(as_of)
        .with_context(|| format!("pipeline run for {as_of} failed"))
}
