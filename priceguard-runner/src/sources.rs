//! Adapter selection for a run: live providers, a CSV directory, or
//! synthetic data.

use std::path::PathBuf;

use priceguard_core::data::{
    CsvDirAdapter, EcbAdapter, FetchError, SourceKind, SyntheticAdapter, YahooAdapter,
};

use crate::config::PipelineConfig;
use crate::orchestrator::AdapterSet;

/// Where a run's series come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMode {
    /// Yahoo Finance for prices, the ECB Data Portal for benchmarks.
    Live,
    /// `<dir>/<safe_symbol>.csv` for both kinds.
    CsvDir(PathBuf),
    /// Deterministic random walks; benchmarks track their mapped symbol.
    Synthetic,
}

/// Build the adapter set for `mode`.
///
/// No benchmark adapter is configured when the config lists no benchmark
/// symbols.
pub fn build_adapters(
    mode: &SourceMode,
    config: &PipelineConfig,
) -> Result<AdapterSet, FetchError> {
    let wants_benchmark = !config.pipeline.benchmark_symbols.is_empty();

    let set = match mode {
        SourceMode::Live => {
            let set = AdapterSet::new(Box::new(YahooAdapter::new()?));
            if wants_benchmark {
                set.with_benchmark(Box::new(EcbAdapter::new()?))
            } else {
                set
            }
        }
        SourceMode::CsvDir(dir) => {
            let set = AdapterSet::new(Box::new(CsvDirAdapter::new(dir, SourceKind::MarketPrice)));
            if wants_benchmark {
                set.with_benchmark(Box::new(CsvDirAdapter::new(dir, SourceKind::Benchmark)))
            } else {
                set
            }
        }
        SourceMode::Synthetic => {
            let set = AdapterSet::new(Box::new(SyntheticAdapter::new(SourceKind::MarketPrice)));
            if wants_benchmark {
                let benchmark = config.pipeline.benchmark_mapping.iter().fold(
                    SyntheticAdapter::new(SourceKind::Benchmark),
                    |adapter, (market, bench)| adapter.with_alias(bench.clone(), market.clone()),
                );
                set.with_benchmark(Box::new(benchmark))
            } else {
                set
            }
        }
    };
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(benchmarks: bool) -> PipelineConfig {
        let mut toml = String::from("[pipeline]\nmarket_symbols = [\"EURUSD=X\"]\n");
        if benchmarks {
            toml.push_str("benchmark_symbols = [\"REF\"]\n");
            toml.push_str("[pipeline.benchmark_mapping]\n\"EURUSD=X\" = \"REF\"\n");
        }
        PipelineConfig::from_toml(&toml).unwrap()
    }

    #[test]
    fn benchmark_adapter_only_when_needed() {
        let set = build_adapters(&SourceMode::Synthetic, &config(false)).unwrap();
        assert!(set.for_kind(SourceKind::Benchmark).is_none());

        let set = build_adapters(&SourceMode::Synthetic, &config(true)).unwrap();
        let bench = set.for_kind(SourceKind::Benchmark).unwrap();
        assert_eq!(bench.kind(), SourceKind::Benchmark);
    }

    #[test]
    fn csv_mode_uses_directory_adapters() {
        let set = build_adapters(&SourceMode::CsvDir(PathBuf::from("data")), &config(true)).unwrap();
        assert_eq!(set.market.name(), "csv_dir");
        assert_eq!(set.for_kind(SourceKind::Benchmark).map(|a| a.name()), Some("csv_dir"));
    }
}
