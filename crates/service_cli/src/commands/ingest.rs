//! Ingest command implementation
//!
//! Loads a CSV file into its raw table.

use chrono::Utc;
use mart_pipeline::{ingest_file, PipelineConfig, RawSource};
use mart_store::FileStore;
use std::path::Path;
use tracing::info;

use super::parse_timestamp;
use crate::{CliError, Result};

/// Run the ingest command
pub fn run(config: &PipelineConfig, source: &str, file: &str, loaded_at: Option<&str>) -> Result<()> {
    let source: RawSource = source.parse()?;
    let path = Path::new(file);
    if !path.exists() {
        return Err(CliError::FileNotFound(file.to_string()));
    }
    let loaded_at = match loaded_at {
        Some(text) => parse_timestamp(text)?,
        None => Utc::now().naive_utc(),
    };

    info!("Ingesting {} from {}", source, file);
    let store = FileStore::open(&config.warehouse_dir)?;
    let outcome = ingest_file(&store, source, path, loaded_at)?;

    println!(
        "{}: read {} rows ({} new, {} replaced), {} rows stored",
        outcome.table, outcome.rows_read, outcome.inserted, outcome.updated, outcome.total
    );
    Ok(())
}
