//! Whole tables: rows plus refresh metadata.

use chrono::NaiveDateTime;
use mart_core::types::{Row, SOURCE_LOADED_AT};
use serde::{Deserialize, Serialize};

/// Bookkeeping stored alongside a table's rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    /// Logical time of the write that produced this version
    pub refreshed_at: Option<NaiveDateTime>,
    /// Maximum `source_loaded_at` of the inputs the table was built from
    pub source_watermark: Option<NaiveDateTime>,
}

/// A complete table as stored and replaced atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Rows in stored order
    pub rows: Vec<Row>,
    /// Refresh metadata
    #[serde(default)]
    pub meta: TableMetadata,
}

impl Table {
    /// Creates a table without metadata.
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            meta: TableMetadata::default(),
        }
    }

    /// Builder-style metadata setter.
    pub fn with_meta(mut self, meta: TableMetadata) -> Self {
        self.meta = meta;
        self
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Maximum non-null timestamp in `column`.
    pub fn max_timestamp(&self, column: &str) -> Option<NaiveDateTime> {
        self.rows.iter().filter_map(|r| r.timestamp(column)).max()
    }

    /// Maximum `source_loaded_at` over the stored rows.
    ///
    /// For a fact table this is its incremental watermark.
    pub fn watermark(&self) -> Option<NaiveDateTime> {
        self.max_timestamp(SOURCE_LOADED_AT)
    }
}

impl From<Vec<Row>> for Table {
    fn from(rows: Vec<Row>) -> Self {
        Table::new(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mart_core::Value;

    #[test]
    fn test_watermark_ignores_nulls() {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let table = Table::new(vec![
            Row::new().with(SOURCE_LOADED_AT, ts),
            Row::new().with(SOURCE_LOADED_AT, Value::Null),
        ]);
        assert_eq!(table.watermark(), Some(ts));
    }

    #[test]
    fn test_empty_table_has_no_watermark() {
        assert_eq!(Table::default().watermark(), None);
    }
}
