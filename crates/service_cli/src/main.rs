//! finmart CLI - Command Line Operations for the Financial Data Mart
//!
//! This is the operational entry point for the finmart warehouse.
//!
//! # Commands
//!
//! - `finmart ingest <source> <csv>` - Load a raw flat file
//! - `finmart stage` - Rebuild staging tables
//! - `finmart snapshot` - Capture history tables
//! - `finmart dimensions` - Rebuild dimensions
//! - `finmart facts [--grain <name>]` - Merge fact tables
//! - `finmart test` - Run validation assertions
//! - `finmart run` - Execute the full pipeline
//! - `finmart summary` - Print row counts and reconciliation
//!
//! With `--metrics-file` (or `metrics_file` in the configuration) every
//! command leaves a Prometheus text snapshot of its metrics behind.
//!
//! # Architecture
//!
//! As part of the **S**ervice layer, this crate wires configuration,
//! logging, and the file-backed warehouse to the pipeline in
//! `mart_pipeline`.

use clap::{Parser, Subcommand};
use std::path::Path;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use anyhow::Context;
use mart_pipeline::PipelineConfig;

mod commands;
mod error;
mod telemetry;

pub use error::{CliError, Result};

/// finmart Financial Data Mart CLI
#[derive(Parser)]
#[command(name = "finmart")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "finmart.toml")]
    config: String,

    /// Warehouse directory (overrides the configuration)
    #[arg(short, long, global = true)]
    warehouse_dir: Option<String>,

    /// Prometheus text file to write metrics to (overrides the configuration)
    #[arg(long, global = true)]
    metrics_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a CSV file into its raw table
    Ingest {
        /// Raw source (transactions, prices, rates)
        source: String,

        /// Path to the CSV file
        file: String,

        /// Load timestamp (defaults to now, UTC)
        #[arg(short, long)]
        loaded_at: Option<String>,
    },

    /// Rebuild staging tables from the raw layer
    Stage,

    /// Capture SCD2 history snapshots
    Snapshot {
        /// Logical run timestamp (YYYY-MM-DD HH:MM:SS)
        #[arg(long)]
        as_of: Option<String>,
    },

    /// Rebuild every dimension, calendar included
    Dimensions,

    /// Merge fact tables
    Facts {
        /// Single grain to merge (e.g. fact_transactions)
        #[arg(short, long)]
        grain: Option<String>,

        /// Ignore stored watermarks and reprocess every staged row
        #[arg(long)]
        full_refresh: bool,
    },

    /// Run validation assertions
    Test,

    /// Execute the full ordered pipeline
    Run {
        /// Ignore stored watermarks and reprocess every staged row
        #[arg(long)]
        full_refresh: bool,

        /// Logical run timestamp for snapshots (YYYY-MM-DD HH:MM:SS)
        #[arg(long)]
        as_of: Option<String>,
    },

    /// Print row counts and reconciliation checks
    Summary,

    /// Check configuration and list stored tables
    Check,
}

fn load_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let path = Path::new(&cli.config);
    let mut config = PipelineConfig::load_or_default(path)
        .with_context(|| format!("loading {}", cli.config))?
        .with_env_override();
    if let Some(dir) = &cli.warehouse_dir {
        config.warehouse_dir = dir.into();
    }
    if let Some(path) = &cli.metrics_file {
        config.metrics_file = Some(path.into());
    }
    config
        .validate()
        .with_context(|| format!("validating {}", cli.config))?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    // Initialise tracing; RUST_LOG wins over the configured level
    let level = if cli.verbose { "debug" } else { config.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    if cli.verbose {
        info!("Verbose mode enabled");
    }
    debug!(config = %cli.config, warehouse = %config.warehouse_dir.display(), "Configuration loaded");

    let recorder = telemetry::install().context("installing metrics recorder")?;
    let outcome = dispatch(cli.command, &config);
    if let Some(path) = &config.metrics_file {
        telemetry::write_snapshot(&recorder, path)
            .with_context(|| format!("writing metrics to {}", path.display()))?;
    }
    outcome?;
    Ok(())
}

fn dispatch(command: Commands, config: &PipelineConfig) -> Result<()> {
    match command {
        Commands::Ingest {
            source,
            file,
            loaded_at,
        } => commands::ingest::run(config, &source, &file, loaded_at.as_deref())?,
        Commands::Stage => commands::stage::run(config)?,
        Commands::Snapshot { as_of } => commands::snapshot::run(config, as_of.as_deref())?,
        Commands::Dimensions => commands::dimensions::run(config)?,
        Commands::Facts { grain, full_refresh } => {
            commands::facts::run(config, grain.as_deref(), full_refresh)?
        }
        Commands::Test => commands::test::run(config)?,
        Commands::Run { full_refresh, as_of } => commands::run::run(config, full_refresh, as_of.as_deref())?,
        Commands::Summary => commands::summary::run(config)?,
        Commands::Check => commands::check::run(config)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_warehouse_override() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from([
            "finmart",
            "--config",
            dir.path().join("missing.toml").to_str().unwrap(),
            "--warehouse-dir",
            "/tmp/finmart-wh",
            "summary",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.warehouse_dir, Path::new("/tmp/finmart-wh"));
        assert_eq!(config.metrics_file, None);
    }

    #[test]
    fn test_metrics_file_override() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from([
            "finmart",
            "--config",
            dir.path().join("missing.toml").to_str().unwrap(),
            "--metrics-file",
            "/tmp/finmart.prom",
            "run",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.metrics_file.as_deref(), Some(Path::new("/tmp/finmart.prom")));
    }

    #[test]
    fn test_ingest_arguments() {
        let cli = Cli::parse_from(["finmart", "ingest", "prices", "prices.csv", "--loaded-at", "2024-03-05"]);
        match cli.command {
            Commands::Ingest {
                source,
                file,
                loaded_at,
            } => {
                assert_eq!((source.as_str(), file.as_str()), ("prices", "prices.csv"));
                assert_eq!(loaded_at.as_deref(), Some("2024-03-05"));
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn test_facts_arguments() {
        let cli = Cli::parse_from(["finmart", "facts", "--grain", "fact_daily_prices", "--full-refresh"]);
        match cli.command {
            Commands::Facts { grain, full_refresh } => {
                assert_eq!(grain.as_deref(), Some("fact_daily_prices"));
                assert!(full_refresh);
            }
            _ => panic!("expected facts"),
        }
    }
}
