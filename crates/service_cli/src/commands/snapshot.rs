//! Snapshot command implementation
//!
//! Captures the SCD2 history tables.

use mart_pipeline::PipelineConfig;
use tracing::info;

use super::{open_pipeline, parse_timestamp};
use crate::Result;

/// Run the snapshot command
pub fn run(config: &PipelineConfig, as_of: Option<&str>) -> Result<()> {
    let as_of = as_of.map(parse_timestamp).transpose()?;
    let pipeline = open_pipeline(config)?;

    info!("Capturing snapshots...");
    for (spec, outcome) in pipeline.catalog().snapshots.iter().zip(pipeline.snapshot(as_of)?) {
        println!(
            "{}: {} opened, {} superseded, {} deleted, {} unchanged",
            spec.name, outcome.opened, outcome.superseded, outcome.deleted, outcome.unchanged
        );
    }
    Ok(())
}
