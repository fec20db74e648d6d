//! Storage errors.

use std::path::PathBuf;
use thiserror::Error;

use crate::name::TableName;

/// Errors raised by [`TableStore`](crate::TableStore) implementations.
///
/// # Examples
/// ```
/// use mart_store::{StoreError, TableName};
///
/// let err = StoreError::NotFound(TableName::raw("daily_prices"));
/// assert_eq!(format!("{}", err), "Table not found: raw.daily_prices");
/// ```
#[derive(Debug, Error)]
pub enum StoreError {
    /// The table has never been written.
    #[error("Table not found: {0}")]
    NotFound(TableName),

    /// A table name could not be parsed.
    #[error("Invalid table name: {0}")]
    InvalidName(String),

    /// Filesystem failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Affected path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A table file could not be encoded or decoded.
    #[error("Serialisation error for {table}: {source}")]
    Serialisation {
        /// Affected table
        table: TableName,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// A writer panicked while holding the store lock.
    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}
