//! PriceGuard Runner: pipeline orchestration, aggregation and reporting.
//!
//! This crate builds on `priceguard-core` to provide:
//! - TOML pipeline configuration
//! - Ingestion orchestrator (bounded rayon pool, per-job isolation, retry)
//! - Adapter selection (live, CSV directory, synthetic)
//! - Quarantine aggregator and dated report writer
//! - The pipeline run and its summary

pub mod aggregator;
pub mod config;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod sources;

pub use aggregator::{AggregationError, QuarantineAggregator};
pub use config::{ConfigError, PipelineConfig, PipelineSettings, RetryConfig};
pub use orchestrator::{
    AdapterSet, FetchWindow, IngestError, IngestJob, IngestOutcome, Orchestrator, RetryPolicy,
};
pub use pipeline::{
    run_pipeline, JobFailure, Pipeline, PipelineError, PipelineRun, SymbolSummary,
};
pub use report::{report_path, write_forecast_artifact, write_report};
pub use sources::{build_adapters, SourceMode};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<PipelineConfig>();
        assert_sync::<PipelineConfig>();
    }

    #[test]
    fn orchestrator_is_shareable_across_workers() {
        assert_sync::<Orchestrator>();
        assert_sync::<AdapterSet>();
    }

    #[test]
    fn pipeline_is_shareable_across_workers() {
        assert_sync::<Pipeline>();
    }

    #[test]
    fn job_results_cross_threads() {
        assert_send::<IngestError>();
        assert_send::<IngestOutcome>();
        assert_send::<PipelineRun>();
    }
}
