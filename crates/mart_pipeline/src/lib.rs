//! # mart_pipeline: Warehouse Orchestration
//!
//! Drives the finmart warehouse end to end over any [`TableStore`].
//!
//! This crate provides:
//! - TOML configuration with environment overrides and validation
//! - Raw CSV ingestion (transactions, market prices, exchange rates)
//! - The ordered pipeline: staging, snapshots, dimensions, facts,
//!   assertions, and reconciliation
//!
//! ## Example
//!
//! ```
//! use mart_pipeline::prelude::*;
//! use mart_store::MemoryStore;
//!
//! let config = PipelineConfig::default();
//! let pipeline = Pipeline::from_config(MemoryStore::new(), &config).unwrap();
//!
//! // Nothing ingested yet: staging has no raw input.
//! assert!(pipeline.run(MergeMode::Incremental, None, None).is_err());
//! ```
//!
//! [`TableStore`]: mart_store::TableStore

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod ingest;
pub mod workflow;

pub use config::{ConfigError, PipelineConfig};
pub use error::PipelineError;
pub use ingest::{ingest_file, ingest_rows, read_csv, IngestOutcome, RawSource};
pub use workflow::{
    DimensionReport, FactsReport, GrainReport, Pipeline, PipelineStep, ProgressCallback, RunReport, StageReport,
    WarehouseSummary,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::PipelineConfig;
    pub use crate::error::PipelineError;
    pub use crate::ingest::{ingest_file, RawSource};
    pub use crate::workflow::{Pipeline, PipelineStep, RunReport, WarehouseSummary};
    pub use mart_transform::MergeMode;
}
