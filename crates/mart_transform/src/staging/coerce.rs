//! Text-to-type coercions used by staging models.
//!
//! Raw records carry text (or null). Each coercion trims its input and maps
//! blank text to null; anything else that does not parse is a coercion
//! failure.

use chrono::{NaiveDate, NaiveDateTime};
use mart_core::math::round_scale;
use mart_core::Value;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

const DATE_FORMAT: &str = "%Y-%m-%d";

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Target type of a staged field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Trimmed text
    Text,
    /// Trimmed, upper-cased text
    Upper,
    /// Trimmed, lower-cased text
    Lower,
    /// Decimal rounded to a fixed scale
    Decimal(u32),
    /// 64-bit integer
    Int,
    /// Boolean flag (`0/1`, `true/false`, `t/f`, `yes/no`)
    Bool,
    /// Calendar date; timestamps are truncated
    Date,
    /// Timestamp without time zone
    Timestamp,
}

impl Coercion {
    /// Name of the target type for issue messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Coercion::Text | Coercion::Upper | Coercion::Lower => "text",
            Coercion::Decimal(_) => "decimal",
            Coercion::Int => "int",
            Coercion::Bool => "bool",
            Coercion::Date => "date",
            Coercion::Timestamp => "timestamp",
        }
    }

    /// Coerces one raw value. `None` means the value could not be coerced.
    pub fn apply(&self, raw: &Value) -> Option<Value> {
        let text = match raw {
            Value::Null => return Some(Value::Null),
            Value::Text(s) => s.trim(),
            typed => return self.apply_typed(typed),
        };
        if text.is_empty() {
            return Some(Value::Null);
        }
        let value = match self {
            Coercion::Text => Value::from(text),
            Coercion::Upper => Value::from(text.to_uppercase()),
            Coercion::Lower => Value::from(text.to_lowercase()),
            Coercion::Decimal(scale) => Value::from(round_scale(parse_decimal(text), *scale)?),
            Coercion::Int => Value::from(parse_int(text)?),
            Coercion::Bool => Value::from(parse_bool(text)?),
            Coercion::Date => Value::from(parse_date(text)?),
            Coercion::Timestamp => Value::from(parse_timestamp(text)?),
        };
        Some(value)
    }

    /// Already-typed input (e.g. a load timestamp written by ingestion).
    fn apply_typed(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Coercion::Decimal(scale), v) => v
                .as_decimal()
                .and_then(|d| round_scale(Some(d), *scale))
                .map(Value::from),
            (Coercion::Int, Value::Int(_)) | (Coercion::Bool, Value::Bool(_)) => {
                Some(value.clone())
            }
            (Coercion::Date, v) => v.as_date().map(Value::from),
            (Coercion::Timestamp, Value::Timestamp(_)) => Some(value.clone()),
            (Coercion::Timestamp, Value::Date(d)) => d.and_hms_opt(0, 0, 0).map(Value::from),
            (Coercion::Text | Coercion::Upper | Coercion::Lower, v) => v
                .canonical()
                .and_then(|s| self.apply(&Value::from(s))),
            _ => None,
        }
    }
}

/// Parses plain or scientific decimal notation.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Parses an integer, accepting a zero fractional part (`"42.0"`).
pub fn parse_int(text: &str) -> Option<i64> {
    text.parse::<i64>().ok().or_else(|| {
        let d = parse_decimal(text)?;
        if d.fract().is_zero() {
            d.to_i64()
        } else {
            None
        }
    })
}

/// Parses a boolean flag.
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" => Some(true),
        "0" | "false" | "f" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Parses a date, truncating a full timestamp.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .ok()
        .or_else(|| parse_timestamp(text).map(|ts| ts.date()))
}

/// Parses a timestamp in any accepted format.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}
