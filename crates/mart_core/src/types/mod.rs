//! Core value and row types.
//!
//! This module provides:
//! - `Value`: A single cell with a total order and canonical string form
//! - `Row`: An ordered column → value map
//! - `CoreError`: Errors from typed access to rows

pub mod error;
pub mod row;
pub mod value;

pub use error::CoreError;
pub use row::{Row, SOURCE_LOADED_AT};
pub use value::Value;
