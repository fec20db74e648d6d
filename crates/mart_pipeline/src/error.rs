//! Error types for the finmart pipeline.

use mart_store::{StoreError, TableName};
use mart_transform::TransformError;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline error type
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Table store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Model error
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Flat file could not be read or parsed
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Input file
        path: PathBuf,
        /// Underlying parser error
        source: csv::Error,
    },

    /// Unknown raw source name
    #[error("Unknown source '{0}'. Supported: transactions, prices, rates")]
    UnknownSource(String),

    /// A flat file lacks a column the load needs
    #[error("Input for {table} has no '{column}' column")]
    MissingColumn {
        /// Raw table
        table: TableName,
        /// Missing column
        column: String,
    },

    /// One or more fact grains failed
    #[error("{failed} fact grain(s) failed: {}", .grains.join(", "))]
    GrainsFailed {
        /// Number of failed grains
        failed: usize,
        /// Failed grain names
        grains: Vec<String>,
    },
}

impl PipelineError {
    /// Returns `true` for errors that abort a single fact grain only.
    pub fn is_grain_local(&self) -> bool {
        matches!(
            self,
            Self::Transform(
                TransformError::WatermarkRegression { .. } | TransformError::StaleDimension { .. }
            )
        )
    }
}
