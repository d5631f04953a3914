//! PriceGuard CLI: run the quality pipeline and inspect inputs.
//!
//! Commands:
//! - `run` executes one pipeline run from a TOML config
//! - `validate` runs the validation rules alone on one CSV file
//! - `check-config` parses and validates a config file
//!
//! `run` exits with 0 when no issues were found, 2 when the run produced a
//! quarantine report or a job failed, and 1 on a fatal error.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use priceguard_core::data::{read_csv_frame, Normalizer};
use priceguard_core::domain::SymbolPartition;
use priceguard_core::validation::{ValidationConfig, ValidationEngine};
use priceguard_runner::{build_adapters, run_pipeline, PipelineConfig, PipelineRun, SourceMode};

/// Exit code of a run that completed but found issues.
const EXIT_ISSUES: i32 = 2;

#[derive(Parser)]
#[command(
    name = "priceguard",
    about = "PriceGuard: data-quality gate for market price series"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Source {
    /// Yahoo Finance prices, ECB benchmarks.
    Live,
    /// `<data-dir>/<symbol>.csv` files.
    Csv,
    /// Deterministic generated series.
    Synthetic,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one pipeline run.
    Run {
        /// Path to the TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Where series come from.
        #[arg(long, value_enum, default_value_t = Source::Live)]
        source: Source,

        /// Directory of CSV files (required with --source csv).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Run date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        as_of: Option<String>,

        /// Print the run summary as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run the validation rules on one CSV file and print the partition.
    Validate {
        /// CSV file with Date/Open/High/Low/Close[/Volume] columns.
        file: PathBuf,

        /// Symbol to report under. Defaults to the file stem.
        #[arg(long)]
        symbol: Option<String>,

        /// Relative open→close swing above which a record is quarantined.
        #[arg(long)]
        swing_threshold: Option<f64>,
    },
    /// Parse and validate a config file.
    CheckConfig {
        /// Path to the TOML config file.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            source,
            data_dir,
            as_of,
            json,
        } => {
            let healthy = run_cmd(&config, source, data_dir, as_of.as_deref(), json)?;
            if !healthy {
                std::process::exit(EXIT_ISSUES);
            }
            Ok(())
        }
        Commands::Validate {
            file,
            symbol,
            swing_threshold,
        } => {
            init_logging("info");
            run_validate(&file, symbol, swing_threshold)
        }
        Commands::CheckConfig { config } => run_check_config(&config),
    }
}

/// Install the fmt subscriber. `RUST_LOG` wins over `fallback`.
fn init_logging(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{s}' (expected YYYY-MM-DD)"))
}

/// Returns whether the run was healthy and complete.
fn run_cmd(
    config_path: &Path,
    source: Source,
    data_dir: Option<PathBuf>,
    as_of: Option<&str>,
    json: bool,
) -> Result<bool> {
    let config = PipelineConfig::from_file(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    init_logging(&config.pipeline.log_level);

    let as_of = match as_of {
        Some(s) => parse_date(s)?,
        None => chrono::Local::now().date_naive(),
    };
    let mode = match (source, data_dir) {
        (Source::Live, _) => SourceMode::Live,
        (Source::Synthetic, _) => SourceMode::Synthetic,
        (Source::Csv, Some(dir)) => SourceMode::CsvDir(dir),
        (Source::Csv, None) => bail!("--source csv requires --data-dir"),
    };

    let adapters = build_adapters(&mode, &config).context("failed to set up data sources")?;
    info!(config = %config_path.display(), as_of = %as_of, "configuration loaded");
    let run = run_pipeline(&config, adapters, as_of)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_summary(&run);
    }
    Ok(run.is_healthy() && run.is_complete())
}

fn run_validate(file: &Path, symbol: Option<String>, swing_threshold: Option<f64>) -> Result<()> {
    let symbol = match symbol {
        Some(s) => s,
        None => file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .context("cannot derive a symbol from the file name; pass --symbol")?,
    };

    let mut config = ValidationConfig::default();
    if let Some(threshold) = swing_threshold {
        if !(threshold.is_finite() && threshold > 0.0) {
            bail!("--swing-threshold must be a positive number, got {threshold}");
        }
        config.swing_threshold = threshold;
    }

    let frame = read_csv_frame(file).with_context(|| format!("failed to read {}", file.display()))?;
    let series = Normalizer::prices(&symbol, &frame)?;
    let partition = ValidationEngine::standard(&config).validate(series);
    print_partition(&partition);
    Ok(())
}

fn run_check_config(path: &Path) -> Result<()> {
    let config = PipelineConfig::from_file(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    let p = &config.pipeline;

    println!("Config OK: {}", path.display());
    println!("Market symbols:    {}", p.market_symbols.join(", "));
    if !p.benchmark_symbols.is_empty() {
        println!("Benchmark symbols: {}", p.benchmark_symbols.join(", "));
    }
    for (market, benchmark) in &p.benchmark_mapping {
        println!("  {market} -> {benchmark}");
    }
    println!("History:           {} days @ {}", p.history_days, p.interval);
    println!("Workers:           {}", p.max_workers);
    println!("Output dir:        {}", p.output_dir.display());
    println!(
        "Forecast check:    {}",
        if config.forecast.enabled { "enabled" } else { "disabled" }
    );
    println!("Fingerprint:       {}", config.fingerprint()?);
    Ok(())
}

fn print_partition(partition: &SymbolPartition) {
    println!();
    println!("=== Validation: {} ===", partition.symbol());
    println!("Records:     {}", partition.total());
    println!("Clean:       {}", partition.clean_count());
    println!("Quarantined: {}", partition.quarantine_count());

    let entries = partition.quarantine_entries();
    if entries.is_empty() {
        println!();
        return;
    }
    println!();
    println!("{:<22} {:>14}  Reason", "Timestamp", "Close");
    println!("{}", "-".repeat(64));
    for entry in &entries {
        println!(
            "{:<22} {:>14}  {}",
            entry.timestamp().format("%Y-%m-%d %H:%M:%S"),
            entry.value().to_string(),
            entry.reason()
        );
    }
    println!();
}

fn print_summary(run: &PipelineRun) {
    println!();
    println!("=== PriceGuard Run {} ===", run.run_id);
    println!("Window:      {} to {}", run.window_start, run.window_end);
    println!(
        "Symbols:     {} requested, {} ingested, {} failed",
        run.requested.len(),
        run.succeeded.len(),
        run.failed.len()
    );
    println!();
    println!(
        "{:<14} {:>7} {:>7} {:>11}  {:<16} Forecast",
        "Symbol", "Input", "Clean", "Quarantined", "Reconciliation"
    );
    println!("{}", "-".repeat(72));
    for s in &run.symbols {
        let reconciliation = match &s.reconciliation {
            Some(stats) if stats.is_alignment_gap() => "no overlap".to_string(),
            Some(stats) => format!("{}/{} flagged", stats.promoted, stats.compared),
            None => "-".to_string(),
        };
        let forecast = if s.forecast_anomaly { "ANOMALY" } else { "-" };
        println!(
            "{:<14} {:>7} {:>7} {:>11}  {:<16} {}",
            s.symbol, s.input_count, s.clean_count, s.quarantined_count, reconciliation, forecast
        );
    }

    if !run.failures.is_empty() {
        println!();
        println!("--- Failures ---");
        for f in &run.failures {
            println!("{} ({}): {}", f.symbol, f.kind, f.error);
        }
    }

    println!();
    match &run.report_path {
        Some(path) => println!(
            "ISSUES: {} quarantined record(s), report written to {}",
            run.quarantine_count,
            path.display()
        ),
        None => println!("No data issues found."),
    }
    println!();
}
