//! Ordered rows of named values.
//!
//! A `Row` is the unit every component exchanges: raw records, staged
//! records, dimension members, history versions, and facts are all rows.
//! Columns are kept in a `BTreeMap`, so two rows with the same content
//! serialise and compare identically regardless of insertion order.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::CoreError;
use super::value::Value;

/// Name of the watermark column carried from staging into facts.
pub const SOURCE_LOADED_AT: &str = "source_loaded_at";

static NULL: Value = Value::Null;

/// A single record: column name → value.
///
/// Missing columns read as [`Value::Null`].
///
/// # Examples
///
/// ```
/// use mart_core::types::{Row, Value};
///
/// let row = Row::new().with("merchant_name", "Acme").with("category", Value::Null);
/// assert_eq!(row.text("merchant_name"), Some("Acme"));
/// assert!(row.get("category").is_null());
/// assert!(row.get("not_a_column").is_null());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    /// Creates an empty row.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Sets a column, replacing any previous value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    /// Returns the value of a column (`Null` when absent).
    pub fn get(&self, column: &str) -> &Value {
        self.0.get(column).unwrap_or(&NULL)
    }

    /// Returns `true` if the column is present (even when null).
    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    /// Removes a column, returning its value.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.0.remove(column)
    }

    /// Iterates over columns in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Returns the column names in name order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Projects the given columns, in order, into a value tuple.
    pub fn project(&self, columns: &[&str]) -> Vec<Value> {
        columns.iter().map(|c| self.get(c).clone()).collect()
    }

    /// Projects the given owned column names into a value tuple.
    pub fn project_owned(&self, columns: &[String]) -> Vec<Value> {
        columns.iter().map(|c| self.get(c).clone()).collect()
    }

    /// Text content of a column.
    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).as_text()
    }

    /// Decimal content of a column (integers widened).
    pub fn decimal(&self, column: &str) -> Option<Decimal> {
        self.get(column).as_decimal()
    }

    /// Integer content of a column.
    pub fn int(&self, column: &str) -> Option<i64> {
        self.get(column).as_int()
    }

    /// Boolean content of a column.
    pub fn bool(&self, column: &str) -> Option<bool> {
        self.get(column).as_bool()
    }

    /// Date content of a column (timestamps truncated).
    pub fn date(&self, column: &str) -> Option<NaiveDate> {
        self.get(column).as_date()
    }

    /// Timestamp content of a column.
    pub fn timestamp(&self, column: &str) -> Option<NaiveDateTime> {
        self.get(column).as_timestamp()
    }

    /// The staging watermark carried by this row.
    pub fn source_loaded_at(&self) -> Option<NaiveDateTime> {
        self.timestamp(SOURCE_LOADED_AT)
    }

    /// Like [`Row::timestamp`] but fails when the column is absent or mistyped.
    ///
    /// # Errors
    ///
    /// - `CoreError::MissingColumn` if the column is absent or null
    /// - `CoreError::TypeMismatch` if the column is not a timestamp
    pub fn require_timestamp(&self, column: &str) -> Result<NaiveDateTime, CoreError> {
        match self.0.get(column) {
            None | Some(Value::Null) => Err(CoreError::MissingColumn(column.to_string())),
            Some(Value::Timestamp(ts)) => Ok(*ts),
            Some(other) => Err(CoreError::TypeMismatch {
                column: column.to_string(),
                expected: "timestamp",
                found: other.type_name(),
            }),
        }
    }

    /// Renders selected columns as `col=value` pairs for log and issue text.
    pub fn describe(&self, columns: &[&str]) -> String {
        columns
            .iter()
            .map(|c| format!("{}={}", c, self.get(c)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
