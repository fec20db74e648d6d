//! CLI error types.

use mart_pipeline::PipelineError;
use mart_store::StoreError;
use thiserror::Error;

/// CLI error type
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid command-line argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Input file does not exist
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Warehouse storage error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Metrics recorder could not be installed
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Pipeline error
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Assertions found violating rows
    #[error("{0} assertion(s) failed")]
    AssertionsFailed(usize),

    /// Row-count reconciliation found mismatches
    #[error("{0} reconciliation check(s) failed")]
    ReconciliationFailed(usize),

    /// The full run completed with errors
    #[error("Pipeline run failed: {}", .0.join("; "))]
    RunFailed(Vec<String>),
}

/// CLI result type
pub type Result<T> = std::result::Result<T, CliError>;
