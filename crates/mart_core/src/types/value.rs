//! Cell values for staged, dimension, history, and fact rows.
//!
//! `Value` is deliberately small: it covers exactly the column types the
//! warehouse models use. Two properties matter to the engine:
//!
//! - **Total order**: `Value` implements `Ord`, so every tie-break in
//!   deduplication can fall back to a deterministic comparison.
//! - **Canonical form**: [`Value::canonical`] renders a value the same way on
//!   every platform and locale, which is what surrogate keys hash.
//!
//! # Examples
//!
//! ```
//! use chrono::NaiveDate;
//! use mart_core::types::Value;
//! use rust_decimal::Decimal;
//!
//! let date = Value::from(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
//! assert_eq!(date.canonical().as_deref(), Some("2024-03-01"));
//!
//! let amount = Value::from(Decimal::new(5000, 2));
//! assert_eq!(amount.canonical().as_deref(), Some("50"));
//!
//! assert_eq!(Value::Null.canonical(), None);
//! ```

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical timestamp rendering (fractional seconds only when non-zero).
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Canonical date rendering.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single typed cell.
///
/// Variant order defines the cross-type ordering: `Null` sorts first.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    /// Absent value
    #[default]
    Null,
    /// Boolean flag
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Fixed-scale decimal
    Decimal(Decimal),
    /// Free text
    Text(String),
    /// Calendar date
    Date(NaiveDate),
    /// Timestamp without time zone
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "timestamp",
        }
    }

    /// Returns the canonical string form, or `None` for null.
    ///
    /// Decimals are normalised (`50.00` and `50` render identically) so a
    /// change of scale never changes a surrogate key.
    pub fn canonical(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(if *b { "true" } else { "false" }.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Decimal(d) => Some(d.normalize().to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Date(d) => Some(d.format(DATE_FORMAT).to_string()),
            Value::Timestamp(ts) => Some(ts.format(TIMESTAMP_FORMAT).to_string()),
        }
    }

    /// Returns the text content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns the decimal content; integers are widened.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(d) => Some(*d),
            Value::Int(i) => Some(Decimal::from(*i)),
            _ => None,
        }
    }

    /// Returns the integer content, if this is an integer value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the boolean content, if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the date content; timestamps are truncated to their date.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Timestamp(ts) => Some(ts.date()),
            _ => None,
        }
    }

    /// Returns the timestamp content, if this is a timestamp value.
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.canonical() {
            Some(s) => write!(f, "{}", s),
            None => write!(f, "NULL"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(ts: NaiveDateTime) -> Self {
        Value::Timestamp(ts)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_null_sorts_first() {
        assert!(Value::Null < Value::Bool(false));
        assert!(Value::Null < Value::from("a"));
    }

    #[test]
    fn test_decimal_canonical_ignores_scale() {
        let a = Value::from(Decimal::new(5000, 2));
        let b = Value::from(Decimal::new(50, 0));
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn test_timestamp_canonical() {
        let v = Value::from(ts("2024-01-02 03:04:05"));
        assert_eq!(v.canonical().as_deref(), Some("2024-01-02 03:04:05"));
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::from("x"));
    }

    #[test]
    fn test_as_date_truncates_timestamp() {
        let v = Value::from(ts("2024-01-02 23:59:59"));
        assert_eq!(v.as_date(), NaiveDate::from_ymd_opt(2024, 1, 2));
    }

    #[test]
    fn test_int_widens_to_decimal() {
        assert_eq!(Value::Int(7).as_decimal(), Some(Decimal::from(7)));
        assert_eq!(Value::from("7").as_decimal(), None);
    }

    #[test]
    fn test_display_null() {
        assert_eq!(Value::Null.to_string(), "NULL");
    }
}
