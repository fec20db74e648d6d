//! CLI command implementations
//!
//! Each submodule implements a specific CLI command.

pub mod check;
pub mod dimensions;
pub mod facts;
pub mod ingest;
pub mod run;
pub mod snapshot;
pub mod stage;
pub mod summary;

use chrono::{NaiveDate, NaiveDateTime};
use mart_pipeline::{Pipeline, PipelineConfig};
use mart_store::FileStore;
use mart_transform::MergeMode;
use tracing::debug;

use crate::{CliError, Result};

/// Opens the file-backed warehouse described by `config`.
pub fn open_pipeline(config: &PipelineConfig) -> Result<Pipeline<FileStore>> {
    debug!(warehouse = %config.warehouse_dir.display(), "Opening warehouse");
    let store = FileStore::open(&config.warehouse_dir)?;
    Ok(Pipeline::from_config(store, config)?)
}

/// Parses `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`, or a bare date
/// (midnight).
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    let text = text.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(ts);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| CliError::InvalidArgument(format!("Invalid timestamp: {}", text)))
}

/// Merge mode selected by `--full-refresh`.
pub fn merge_mode(full_refresh: bool) -> MergeMode {
    if full_refresh {
        MergeMode::FullRefresh
    } else {
        MergeMode::Incremental
    }
}
