//! # mart_core: Foundation Layer for the finmart Modeling Engine
//!
//! ## Layer Role
//!
//! mart_core is the bottom layer of the finmart workspace, providing:
//! - Dynamically typed cell values and rows (`types::value`, `types::row`)
//! - Deterministic surrogate key generation (`keys`)
//! - Explicit tie-break comparators for deduplication (`dedup`)
//! - Null-propagating decimal arithmetic (`math`)
//! - Row-level data-quality issue accumulation (`quality`)
//!
//! ## Zero Dependency Principle
//!
//! This crate has no dependencies on other finmart crates. External
//! dependencies are limited to:
//! - chrono: Dates and timestamps
//! - rust_decimal: Fixed-scale numerics
//! - sha2 / hex: Content-derived identifiers
//! - serde: Serialisation of rows into table files
//!
//! ## Usage Examples
//!
//! ```rust
//! use mart_core::keys::SurrogateKey;
//! use mart_core::types::{Row, Value};
//!
//! let row = Row::new()
//!     .with("ticker", "AAPL")
//!     .with("price_date", Value::Null);
//!
//! let key = SurrogateKey::generate(&row.project(&["ticker"]));
//! assert_eq!(key.as_str().len(), 32);
//! assert!(!key.is_default_member());
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod dedup;
pub mod keys;
pub mod math;
pub mod quality;
pub mod types;

pub use keys::SurrogateKey;
pub use quality::{DataQualityIssue, IssueKind, QualityReport};
pub use types::{CoreError, Row, Value};
