//! Dimensions command implementation

use mart_pipeline::PipelineConfig;
use tracing::{info, warn};

use super::open_pipeline;
use crate::Result;

/// Run the dimensions command
pub fn run(config: &PipelineConfig) -> Result<()> {
    let pipeline = open_pipeline(config)?;
    info!("Rebuilding dimensions...");

    for report in pipeline.build_dimensions()? {
        println!("{:<40} {:>10} members", report.dimension.to_string(), report.members);
        if report.excluded_null_keys > 0 {
            warn!(
                "{}: {} input rows excluded for a null natural key",
                report.dimension, report.excluded_null_keys
            );
        }
        if report.beyond_horizon > 0 {
            warn!(
                "{}: {} event dates lie past the calendar horizon and map to the unknown date",
                report.dimension, report.beyond_horizon
            );
        }
    }
    Ok(())
}
