//! Facts command implementation
//!
//! Merges one fact grain, or all of them, into the marts layer.

use mart_pipeline::PipelineConfig;
use tracing::info;

use super::{merge_mode, open_pipeline};
use crate::Result;

/// Run the facts command
pub fn run(config: &PipelineConfig, grain: Option<&str>, full_refresh: bool) -> Result<()> {
    let pipeline = open_pipeline(config)?;
    let mode = merge_mode(full_refresh);
    info!("Merging facts ({:?})...", mode);

    let grains = pipeline.merge_facts(grain, mode)?.into_result()?;
    for report in grains {
        println!(
            "{:<40} selected={} inserted={} updated={} restated={}",
            report.fact.to_string(),
            report.selected,
            report.inserted,
            report.updated,
            report.restated
        );
        for (foreign_key, n) in &report.substitutions {
            println!("  {} rows mapped to the unknown {}", n, foreign_key);
        }
    }
    Ok(())
}
