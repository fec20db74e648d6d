//! Stage command implementation
//!
//! Rebuilds every staging table from the raw layer.

use mart_pipeline::PipelineConfig;
use tracing::{info, warn};

use super::open_pipeline;
use crate::Result;

/// Run the stage command
pub fn run(config: &PipelineConfig) -> Result<()> {
    let pipeline = open_pipeline(config)?;
    info!("Staging raw tables...");
    let report = pipeline.stage()?;

    for (table, rows) in &report.tables {
        println!("{:<40} {:>10} rows", table.to_string(), rows);
    }
    for line in report.quality.summary() {
        warn!("Data quality: {}", line);
    }
    Ok(())
}
