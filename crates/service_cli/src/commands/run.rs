//! Run command implementation
//!
//! Executes the full ordered pipeline.

use mart_pipeline::{PipelineConfig, PipelineStep, ProgressCallback};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{merge_mode, open_pipeline, parse_timestamp};
use crate::{CliError, Result};

/// Run the full pipeline
pub fn run(config: &PipelineConfig, full_refresh: bool, as_of: Option<&str>) -> Result<()> {
    let as_of = as_of.map(parse_timestamp).transpose()?;
    let pipeline = open_pipeline(config)?;
    let mode = merge_mode(full_refresh);

    let progress: ProgressCallback = Arc::new(|step: PipelineStep, pct: f64| {
        if pct >= 1.0 {
            info!("[{}] done", step.name());
        } else {
            debug!("[{}] {:.0}%", step.name(), pct * 100.0);
        }
    });

    info!("Running pipeline ({:?})...", mode);
    let report = pipeline.run(mode, as_of, Some(progress))?;

    for grain in &report.facts {
        println!(
            "{:<40} selected={} inserted={} updated={} restated={}",
            grain.fact.to_string(),
            grain.selected,
            grain.inserted,
            grain.updated,
            grain.restated
        );
    }
    if let Some(summary) = &report.summary {
        println!("{}", summary);
    }
    if !report.quality.is_empty() {
        warn!("{} data-quality issue(s) recorded", report.quality.len());
    }
    println!("Completed in {} ms", report.duration_ms);

    if !report.success {
        return Err(CliError::RunFailed(report.errors));
    }
    Ok(())
}
