//! Error types for typed row access.

use thiserror::Error;

/// Errors raised when a row does not have the shape a component expects.
///
/// These are structural errors (a model is wired to the wrong columns), not
/// row-level data-quality issues; the latter are collected in a
/// [`QualityReport`](crate::quality::QualityReport) instead.
///
/// # Examples
/// ```
/// use mart_core::types::CoreError;
///
/// let err = CoreError::MissingColumn("ticker".to_string());
/// assert_eq!(format!("{}", err), "Missing column: ticker");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A required column is absent from the row.
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// A column holds a value of an unexpected type.
    #[error("Type mismatch in column {column}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Column name
        column: String,
        /// Expected value type
        expected: &'static str,
        /// Actual value type
        found: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mismatch_display() {
        let err = CoreError::TypeMismatch {
            column: "amount".to_string(),
            expected: "decimal",
            found: "text",
        };
        let msg = err.to_string();
        assert!(msg.contains("amount"));
        assert!(msg.contains("decimal"));
        assert!(msg.contains("text"));
    }
}
