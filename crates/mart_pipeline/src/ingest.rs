//! Raw flat-file ingestion.
//!
//! Raw tables keep every source value as text, plus the `_loaded_at` audit
//! timestamp of the load that last wrote the row. Transactions are replaced
//! wholesale on every load; prices and rates are merged on their natural key
//! so a re-delivered day replaces the earlier copy.

use chrono::NaiveDateTime;
use mart_core::{Row, Value};
use mart_store::{Table, TableMetadata, TableName, TableStore};
use mart_transform::staging::RAW_LOADED_AT;
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::PipelineError;

const TRANSACTION_COLUMNS: &[&str] = &[
    "trans_date_trans_time",
    "cc_num",
    "merchant",
    "category",
    "amt",
    "first",
    "last",
    "gender",
    "street",
    "city",
    "state",
    "zip",
    "lat",
    "long",
    "city_pop",
    "job",
    "dob",
    "trans_num",
    "unix_time",
    "merch_lat",
    "merch_long",
    "is_fraud",
];

const PRICE_COLUMNS: &[&str] = &["ticker", "date", "open", "high", "low", "close", "adj_close", "volume"];

const RATE_COLUMNS: &[&str] = &["base_currency", "target_currency", "date", "rate"];

/// A raw source the pipeline can ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawSource {
    /// Credit-card transactions
    Transactions,
    /// Daily market prices
    Prices,
    /// Daily exchange rates
    Rates,
}

impl RawSource {
    /// All raw sources.
    pub const ALL: [RawSource; 3] = [RawSource::Transactions, RawSource::Prices, RawSource::Rates];

    /// Raw table written by this source.
    pub fn table(&self) -> TableName {
        match self {
            Self::Transactions => TableName::raw("credit_card_transactions"),
            Self::Prices => TableName::raw("daily_prices"),
            Self::Rates => TableName::raw("daily_rates"),
        }
    }

    /// Columns kept from the flat file.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Transactions => TRANSACTION_COLUMNS,
            Self::Prices => PRICE_COLUMNS,
            Self::Rates => RATE_COLUMNS,
        }
    }

    /// Merge key, or `None` for truncate-and-load.
    pub fn merge_key(&self) -> Option<&'static [&'static str]> {
        match self {
            Self::Transactions => None,
            Self::Prices => Some(&["ticker", "date"]),
            Self::Rates => Some(&["base_currency", "target_currency", "date"]),
        }
    }
}

impl FromStr for RawSource {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "transactions" | "credit_card_transactions" => Ok(Self::Transactions),
            "prices" | "market_prices" | "daily_prices" => Ok(Self::Prices),
            "rates" | "exchange_rates" | "daily_rates" => Ok(Self::Rates),
            other => Err(PipelineError::UnknownSource(other.to_string())),
        }
    }
}

impl fmt::Display for RawSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transactions => "transactions",
            Self::Prices => "prices",
            Self::Rates => "rates",
        };
        write!(f, "{}", name)
    }
}

/// Result of one load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Raw table written
    pub table: TableName,
    /// Records read from the file
    pub rows_read: usize,
    /// Rows added
    pub inserted: usize,
    /// Existing rows replaced by key
    pub updated: usize,
    /// Rows in the table after the load
    pub total: usize,
}

/// Normalises a header: trimmed, lower-case, spaces as underscores.
fn normalise_header(header: &str) -> String {
    header.trim().to_lowercase().replace(' ', "_")
}

/// Reads CSV records as raw rows of `source`.
///
/// Unknown columns (such as a leading index column) are dropped; empty
/// fields become null. `path` is only used in error messages.
///
/// # Errors
///
/// - `PipelineError::Csv` for malformed input
/// - `PipelineError::MissingColumn` if a merge-key column is absent
pub fn read_csv<R: Read>(source: RawSource, reader: R, path: &Path) -> Result<Vec<Row>, PipelineError> {
    let csv_error = |source: csv::Error| PipelineError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(normalise_header)
        .collect();

    let wanted = source.columns();
    for column in source.merge_key().unwrap_or_default() {
        if !headers.iter().any(|h| h == column) {
            return Err(PipelineError::MissingColumn {
                table: source.table(),
                column: column.to_string(),
            });
        }
    }
    let skipped: Vec<&String> = headers
        .iter()
        .filter(|h| !wanted.contains(&h.as_str()))
        .collect();
    if !skipped.is_empty() {
        warn!(source = %source, columns = ?skipped, "Ignoring unknown columns");
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let mut row = Row::new();
        for column in wanted {
            row.set(*column, Value::Null);
        }
        for (header, field) in headers.iter().zip(record.iter()) {
            if !wanted.contains(&header.as_str()) {
                continue;
            }
            let field = field.trim();
            let value = if field.is_empty() {
                Value::Null
            } else {
                Value::from(field)
            };
            row.set(header.as_str(), value);
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Writes `rows` into the raw table of `source`, stamped with `loaded_at`.
///
/// # Errors
///
/// `PipelineError::Store` if the raw table cannot be read or written.
pub fn ingest_rows(
    store: &dyn TableStore,
    source: RawSource,
    rows: Vec<Row>,
    loaded_at: NaiveDateTime,
) -> Result<IngestOutcome, PipelineError> {
    let name = source.table();
    let rows_read = rows.len();
    let stamped = rows
        .into_iter()
        .map(|r| r.with(RAW_LOADED_AT, loaded_at));

    let (table_rows, inserted, updated) = match source.merge_key() {
        None => {
            let rows: Vec<Row> = stamped.collect();
            let n = rows.len();
            (rows, n, 0)
        }
        Some(key) => {
            let mut existing = store.read_or_empty(&name)?.rows;
            let mut position: HashMap<Vec<Value>, usize> = existing
                .iter()
                .enumerate()
                .map(|(i, r)| (r.project(key), i))
                .collect();
            let (mut inserted, mut updated) = (0, 0);
            for row in stamped {
                let k = row.project(key);
                match position.get(&k) {
                    Some(&i) => {
                        existing[i] = row;
                        updated += 1;
                    }
                    None => {
                        position.insert(k, existing.len());
                        existing.push(row);
                        inserted += 1;
                    }
                }
            }
            (existing, inserted, updated)
        }
    };

    let total = table_rows.len();
    let table = Table::new(table_rows).with_meta(TableMetadata {
        refreshed_at: Some(loaded_at),
        source_watermark: Some(loaded_at),
    });
    store.replace(&name, table)?;

    info!(source = %source, table = %name, rows_read, inserted, updated, total, "Raw load complete");
    Ok(IngestOutcome {
        table: name,
        rows_read,
        inserted,
        updated,
        total,
    })
}

/// Loads a CSV file into the raw table of `source`.
///
/// # Errors
///
/// See [`read_csv`] and [`ingest_rows`].
pub fn ingest_file(
    store: &dyn TableStore,
    source: RawSource,
    path: &Path,
    loaded_at: NaiveDateTime,
) -> Result<IngestOutcome, PipelineError> {
    let file = std::fs::File::open(path).map_err(|e| PipelineError::Csv {
        path: path.to_path_buf(),
        source: csv::Error::from(e),
    })?;
    let rows = read_csv(source, file, path)?;
    ingest_rows(store, source, rows, loaded_at)
}
