//! Check command implementation
//!
//! Validates the configuration and model catalog, and lists stored tables.

use mart_pipeline::PipelineConfig;
use mart_store::TableStore;
use tracing::info;

use super::open_pipeline;
use crate::Result;

/// Run the check command
pub fn run(config: &PipelineConfig) -> Result<()> {
    info!("Checking configuration...");
    let pipeline = open_pipeline(config)?;
    let catalog = pipeline.catalog();

    println!("Warehouse: {}", config.warehouse_dir.display());
    println!(
        "Models: {} staging, {} snapshots, {} dimensions (+ calendar), {} facts",
        catalog.staging.len(),
        catalog.snapshots.len(),
        catalog.dimensions.len(),
        catalog.facts.len()
    );
    println!(
        "Reference data: {} securities, {} currencies",
        config.securities.len(),
        config.currencies.len()
    );

    let tables = pipeline.store().list()?;
    if tables.is_empty() {
        println!("No tables stored yet");
    }
    for table in tables {
        println!("  {}", table);
    }
    Ok(())
}
