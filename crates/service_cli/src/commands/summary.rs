//! Summary command implementation
//!
//! Prints row counts for every layer and the reconciliation checks.

use mart_pipeline::PipelineConfig;

use super::open_pipeline;
use crate::{CliError, Result};

/// Run the summary command
pub fn run(config: &PipelineConfig) -> Result<()> {
    let summary = open_pipeline(config)?.summary()?;
    println!("{}", summary);

    let failed = summary.reconciliation.iter().filter(|c| !c.passed()).count();
    if failed > 0 {
        return Err(CliError::ReconciliationFailed(failed));
    }
    Ok(())
}
