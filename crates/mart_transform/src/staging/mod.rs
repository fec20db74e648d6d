//! Staging normalizers.
//!
//! One model per raw source. Each model renames raw columns to canonical
//! names, coerces them to typed values, and applies deterministic cleanup.
//! Every raw row yields exactly one staged row: a value that cannot be
//! coerced is nulled and reported, never dropped.
//!
//! The raw `_loaded_at` column is carried forward as
//! [`SOURCE_LOADED_AT`](mart_core::types::SOURCE_LOADED_AT). A raw row without
//! it is a structural error for the whole source.

pub mod coerce;
mod exchange_rates;
mod market_prices;
mod transactions;

use chrono::NaiveDateTime;
use mart_core::types::SOURCE_LOADED_AT;
use mart_core::{DataQualityIssue, QualityReport, Row, Value};
use mart_store::{Table, TableMetadata, TableName};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::error::TransformError;
use crate::metrics;
use coerce::Coercion;

/// Load timestamp column written by ingestion.
pub const RAW_LOADED_AT: &str = "_loaded_at";

/// Options shared by all staging models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingOptions {
    /// Literal prefix stripped from merchant names
    pub merchant_prefix: String,
}

impl Default for StagingOptions {
    fn default() -> Self {
        Self {
            merchant_prefix: "fraud_".to_string(),
        }
    }
}

/// The staging models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingModel {
    /// Credit-card transactions
    Transactions,
    /// Daily market prices
    MarketPrices,
    /// Daily exchange rates
    ExchangeRates,
}

impl StagingModel {
    /// All staging models.
    pub const ALL: [StagingModel; 3] = [
        StagingModel::Transactions,
        StagingModel::MarketPrices,
        StagingModel::ExchangeRates,
    ];

    /// Raw input table.
    pub fn source(&self) -> TableName {
        match self {
            StagingModel::Transactions => TableName::raw("credit_card_transactions"),
            StagingModel::MarketPrices => TableName::raw("daily_prices"),
            StagingModel::ExchangeRates => TableName::raw("daily_rates"),
        }
    }

    /// Staged output table.
    pub fn target(&self) -> TableName {
        match self {
            StagingModel::Transactions => TableName::staging("stg_transactions"),
            StagingModel::MarketPrices => TableName::staging("stg_market_prices"),
            StagingModel::ExchangeRates => TableName::staging("stg_exchange_rates"),
        }
    }

    fn rules(&self) -> &'static [(&'static str, &'static str, Coercion)] {
        match self {
            StagingModel::Transactions => transactions::RULES,
            StagingModel::MarketPrices => market_prices::RULES,
            StagingModel::ExchangeRates => exchange_rates::RULES,
        }
    }

    /// Raw columns identifying a row in issue reports.
    fn raw_key(&self) -> &'static [&'static str] {
        match self {
            StagingModel::Transactions => transactions::KEY,
            StagingModel::MarketPrices => market_prices::KEY,
            StagingModel::ExchangeRates => exchange_rates::KEY,
        }
    }

    fn finish(&self, row: &mut Row, options: &StagingOptions) {
        if let StagingModel::Transactions = self {
            transactions::finish(row, options);
        }
    }
}

impl fmt::Display for StagingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target().table())
    }
}

/// Result of one staging run.
#[derive(Debug, Clone, Default)]
pub struct StagingOutput {
    /// Staged rows, one per raw row, with `source_watermark` set
    pub table: Table,
    /// Coercion failures
    pub issues: QualityReport,
    /// Rows loaded after the previous watermark (informational)
    pub new_rows: usize,
}

/// Normalises the full contents of one raw table.
///
/// `previous_watermark` only affects the reported `new_rows` count.
///
/// # Errors
///
/// `TransformError::MissingLoadTimestamp` if any raw row lacks a parseable
/// `_loaded_at`.
pub fn stage(
    model: StagingModel,
    raw: &Table,
    previous_watermark: Option<NaiveDateTime>,
    options: &StagingOptions,
) -> Result<StagingOutput, TransformError> {
    let source = model.source();
    let mut issues = QualityReport::default();
    let mut rows = Vec::with_capacity(raw.len());

    for (ordinal, raw_row) in raw.rows.iter().enumerate() {
        let loaded_at = match Coercion::Timestamp.apply(raw_row.get(RAW_LOADED_AT)) {
            Some(Value::Timestamp(ts)) => ts,
            _ => {
                return Err(TransformError::MissingLoadTimestamp {
                    table: source,
                    row: ordinal,
                })
            }
        };

        let mut staged = Row::new();
        for (from, to, coercion) in model.rules() {
            let raw_value = raw_row.get(from);
            let value = match coercion.apply(raw_value) {
                Some(v) => v,
                None => {
                    issues.push(DataQualityIssue::coercion(
                        source.to_string(),
                        ordinal,
                        Some(raw_row.describe(model.raw_key())),
                        *from,
                        &raw_value.to_string(),
                        coercion.type_name(),
                    ));
                    Value::Null
                }
            };
            staged.set(*to, value);
        }
        model.finish(&mut staged, options);
        staged.set(SOURCE_LOADED_AT, loaded_at);
        rows.push(staged);
    }

    let table = Table::new(rows);
    let watermark = table.watermark();
    let new_rows = match previous_watermark {
        Some(prev) => table
            .rows
            .iter()
            .filter(|r| r.source_loaded_at().is_some_and(|ts| ts > prev))
            .count(),
        None => table.len(),
    };

    if !issues.is_empty() {
        warn!(model = %model, failures = issues.len(), "Staged values nulled by failed coercion");
    }
    info!(model = %model, rows = table.len(), new_rows, "Staging model built");
    metrics::record_staging(model.target().table(), table.len(), issues.len());

    Ok(StagingOutput {
        table: table.with_meta(TableMetadata {
            refreshed_at: None,
            source_watermark: watermark,
        }),
        issues,
        new_rows,
    })
}
