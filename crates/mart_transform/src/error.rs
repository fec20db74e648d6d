//! Errors raised by transformation models.
//!
//! Only structural problems are errors. Row-level defects are reported through
//! [`QualityReport`](mart_core::QualityReport) and never abort a model.

use chrono::NaiveDateTime;
use mart_core::CoreError;
use mart_store::{StoreError, TableName};
use thiserror::Error;

/// Structural failure of a staging, snapshot, dimension, or fact model.
///
/// # Examples
/// ```
/// use mart_store::TableName;
/// use mart_transform::TransformError;
///
/// let err = TransformError::MissingSource(TableName::raw("daily_rates"));
/// assert_eq!(format!("{}", err), "Required source table missing: raw.daily_rates");
/// ```
#[derive(Debug, Error)]
pub enum TransformError {
    /// A model's input table has never been written.
    #[error("Required source table missing: {0}")]
    MissingSource(TableName),

    /// A raw row has no `_loaded_at`, breaking the ingestion contract.
    #[error("Raw row {row} of {table} has no load timestamp")]
    MissingLoadTimestamp {
        /// Raw table
        table: TableName,
        /// Zero-based row ordinal
        row: usize,
    },

    /// The staged source's newest row is older than the fact's watermark.
    #[error(
        "Watermark regression for {fact}: source max {source_max} is older than stored watermark {stored}"
    )]
    WatermarkRegression {
        /// Fact table
        fact: TableName,
        /// Stored fact watermark
        stored: NaiveDateTime,
        /// Maximum `source_loaded_at` in the staged source
        source_max: NaiveDateTime,
    },

    /// A dimension was built from older data than the fact about to use it.
    #[error(
        "Dimension {dimension} is stale for {fact}: built from data up to {dimension_watermark:?}, source reaches {source_max}"
    )]
    StaleDimension {
        /// Fact table
        fact: TableName,
        /// Referenced dimension
        dimension: TableName,
        /// Watermark recorded when the dimension was built
        dimension_watermark: Option<NaiveDateTime>,
        /// Maximum `source_loaded_at` in the staged source
        source_max: NaiveDateTime,
    },

    /// The snapshot's logical time does not move past an open version.
    #[error(
        "Non-monotonic run time for {snapshot}: {run_at} is not after {boundary} for entity {entity}"
    )]
    NonMonotonicRunTime {
        /// History table
        snapshot: TableName,
        /// Logical timestamp of this run
        run_at: NaiveDateTime,
        /// Latest boundary already recorded for the entity
        boundary: NaiveDateTime,
        /// Natural key of the entity
        entity: String,
    },

    /// No model with the given name is registered.
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// A model definition is inconsistent.
    #[error("Invalid model {model}: {reason}")]
    InvalidModel {
        /// Model name
        model: String,
        /// What is wrong
        reason: String,
    },

    /// Typed row access failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
