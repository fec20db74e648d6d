//! Validation assertions.
//!
//! Each check answers "which rows violate this invariant" and returns those
//! rows; an empty result is a pass. Checks are pure functions over tables so
//! they can be used directly in tests; [`run_assertions`] applies the
//! built-in set to every model of a catalog.

use chrono::NaiveDateTime;
use mart_core::keys::SurrogateKey;
use mart_core::{Row, Value};
use mart_store::{StoreError, Table, TableName, TableStore};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

use crate::catalog::ModelCatalog;
use crate::error::TransformError;
use crate::history::{VALID_FROM, VALID_TO};
use crate::measures::FACT_KEY;

/// Outcome of one named assertion.
#[derive(Debug, Clone, PartialEq)]
pub struct AssertionResult {
    /// Assertion name, e.g. `unique_dim_merchants_merchant_key`
    pub name: String,
    /// Table checked
    pub table: TableName,
    /// Violating rows
    pub failures: Vec<Row>,
}

impl AssertionResult {
    /// Returns `true` if no row violates the assertion.
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Values of `column` occurring more than once, with their counts.
pub fn unique(table: &Table, column: &str) -> Vec<Row> {
    let mut counts: BTreeMap<&Value, i64> = BTreeMap::new();
    for row in &table.rows {
        let value = row.get(column);
        if !value.is_null() {
            *counts.entry(value).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(v, n)| Row::new().with(column, v.clone()).with("occurrences", n))
        .collect()
}

/// Rows where `column` is null.
pub fn not_null(table: &Table, column: &str) -> Vec<Row> {
    table
        .rows
        .iter()
        .filter(|r| r.get(column).is_null())
        .cloned()
        .collect()
}

/// One row describing the sentinel count, unless it is exactly one.
pub fn single_default_member(table: &Table, key_column: &str) -> Vec<Row> {
    let count = table
        .rows
        .iter()
        .filter_map(|r| SurrogateKey::from_value(r.get(key_column)))
        .filter(SurrogateKey::is_default_member)
        .count();
    if count == 1 {
        Vec::new()
    } else {
        vec![Row::new().with("default_members", count as i64)]
    }
}

/// Rows of `child` whose `column` has no match in `parent.parent_column`.
/// Null foreign keys are left to [`not_null`].
pub fn relationships(child: &Table, column: &str, parent: &Table, parent_column: &str) -> Vec<Row> {
    let keys: HashSet<&Value> = parent.rows.iter().map(|r| r.get(parent_column)).collect();
    child
        .rows
        .iter()
        .filter(|r| {
            let value = r.get(column);
            !value.is_null() && !keys.contains(value)
        })
        .cloned()
        .collect()
}

/// Non-null values of `column` outside `accepted`.
pub fn accepted_values(table: &Table, column: &str, accepted: &[Value]) -> Vec<Row> {
    table
        .rows
        .iter()
        .filter(|r| {
            let value = r.get(column);
            !value.is_null() && !accepted.contains(value)
        })
        .cloned()
        .collect()
}

/// Rows where `column` is below `min` (or equal to it when `exclusive`).
/// Nulls pass.
pub fn min_value(table: &Table, column: &str, min: Decimal, exclusive: bool) -> Vec<Row> {
    table
        .rows
        .iter()
        .filter(|r| match r.decimal(column) {
            Some(v) if exclusive => v <= min,
            Some(v) => v < min,
            None => false,
        })
        .cloned()
        .collect()
}

/// Versions violating SCD2 interval integrity.
///
/// Per entity, ordered by `valid_from`:
/// - `valid_to` must be after `valid_from` when set
/// - only the last version may be open
/// - a version must not start before its predecessor ends
///
/// A gap between versions is allowed; it follows a hard delete.
pub fn scd2_integrity(history: &Table, natural_key: &[String]) -> Vec<Row> {
    let mut entities: BTreeMap<Vec<Value>, Vec<&Row>> = BTreeMap::new();
    for row in &history.rows {
        entities
            .entry(row.project_owned(natural_key))
            .or_default()
            .push(row);
    }

    let mut failures = Vec::new();
    for versions in entities.values_mut() {
        versions.sort_by_key(|r| r.timestamp(VALID_FROM));
        let mut previous_end: Option<Option<NaiveDateTime>> = None;
        for (i, version) in versions.iter().enumerate() {
            let from = version.timestamp(VALID_FROM);
            let to = version.timestamp(VALID_TO);
            let last = i + 1 == versions.len();

            let inverted = matches!((from, to), (Some(f), Some(t)) if t <= f);
            let open_before_last = to.is_none() && !last;
            let overlaps = match previous_end {
                Some(Some(end)) => from.map_or(true, |f| f < end),
                Some(None) => true,
                None => false,
            };
            if from.is_none() || inverted || open_before_last || overlaps {
                failures.push((*version).clone());
            }
            previous_end = Some(to);
        }
    }
    failures
}

fn load(store: &dyn TableStore, name: &TableName) -> Result<Table, TransformError> {
    store.read_required(name).map_err(|e| match e {
        StoreError::NotFound(name) => TransformError::MissingSource(name),
        other => TransformError::Store(other),
    })
}

fn result(name: String, table: &TableName, failures: Vec<Row>) -> AssertionResult {
    AssertionResult {
        name,
        table: table.clone(),
        failures,
    }
}

/// Runs the built-in assertions for every model of `catalog`.
///
/// - unique and not-null surrogate key, exactly one default member per
///   dimension
/// - unique and not-null `fact_key`, not-null and referentially intact
///   foreign keys per fact
/// - interval integrity per history table
/// - `is_fraud` accepted values, non-negative prices, positive rates
///
/// # Errors
///
/// `TransformError::MissingSource` if a model's table has never been built.
pub fn run_assertions(catalog: &ModelCatalog, store: &dyn TableStore) -> Result<Vec<AssertionResult>, TransformError> {
    let mut results = Vec::new();

    let mut dimensions: BTreeMap<TableName, (Table, String)> = BTreeMap::new();
    let calendar = std::iter::once((&catalog.calendar.name, &catalog.calendar.key_column));
    let all = catalog
        .dimensions
        .iter()
        .map(|d| (&d.name, &d.key_column))
        .chain(calendar);
    for (name, key) in all {
        let table = load(store, name)?;
        let t = name.table();
        results.push(result(format!("unique_{}_{}", t, key), name, unique(&table, key)));
        results.push(result(format!("not_null_{}_{}", t, key), name, not_null(&table, key)));
        results.push(result(
            format!("single_default_member_{}", t),
            name,
            single_default_member(&table, key),
        ));
        dimensions.insert(name.clone(), (table, key.clone()));
    }

    for snapshot in &catalog.snapshots {
        let table = load(store, &snapshot.name)?;
        results.push(result(
            format!("scd2_integrity_{}", snapshot.name.table()),
            &snapshot.name,
            scd2_integrity(&table, &snapshot.natural_key),
        ));
    }

    for fact in &catalog.facts {
        let table = load(store, &fact.name)?;
        let t = fact.name.table();
        results.push(result(format!("unique_{}_{}", t, FACT_KEY), &fact.name, unique(&table, FACT_KEY)));
        results.push(result(format!("not_null_{}_{}", t, FACT_KEY), &fact.name, not_null(&table, FACT_KEY)));
        for lookup in &fact.lookups {
            let fk = &lookup.foreign_key;
            results.push(result(format!("not_null_{}_{}", t, fk), &fact.name, not_null(&table, fk)));
            if let Some((dimension, key)) = dimensions.get(&lookup.dimension) {
                results.push(result(
                    format!("relationships_{}_{}", t, fk),
                    &fact.name,
                    relationships(&table, fk, dimension, key),
                ));
            }
        }

        for column in &fact.columns {
            let failures = match column.as_str() {
                "is_fraud" => accepted_values(&table, column, &[Value::Bool(false), Value::Bool(true)]),
                "open_price" | "high_price" | "low_price" | "close_price" | "adj_close_price" => {
                    min_value(&table, column, Decimal::ZERO, false)
                }
                "exchange_rate" => min_value(&table, column, Decimal::ZERO, true),
                _ => continue,
            };
            let name = match column.as_str() {
                "is_fraud" => format!("accepted_values_{}_{}", t, column),
                "exchange_rate" => format!("positive_{}_{}", t, column),
                _ => format!("non_negative_{}_{}", t, column),
            };
            results.push(result(name, &fact.name, failures));
        }
    }

    let failed: Vec<&AssertionResult> = results.iter().filter(|r| !r.passed()).collect();
    for r in &failed {
        warn!(assertion = %r.name, table = %r.table, failures = r.failures.len(), "Assertion failed");
    }
    info!(total = results.len(), failed = failed.len(), "Assertions complete");
    Ok(results)
}
