//! Dimension builder.
//!
//! A dimension is rebuilt in full from its staged inputs every run:
//!
//! 1. project each input row onto the dimension's columns
//! 2. group by natural key, setting aside rows whose key is null
//! 3. per attribute, keep the most common non-null value (ties: most recent
//!    `source_loaded_at`, then the greater value)
//! 4. let reference rows add members and override attributes
//! 5. hash the natural key into the surrogate key
//! 6. prepend the default member
//!
//! The output metadata records the newest `source_loaded_at` of the inputs,
//! which fact merges use to detect a stale dimension.

use chrono::NaiveDateTime;
use mart_core::dedup::{group_by_key, most_common_in};
use mart_core::keys::SurrogateKey;
use mart_core::types::SOURCE_LOADED_AT;
use mart_core::{Row, Value};
use mart_store::{Table, TableMetadata};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::catalog::DimensionSpec;
use crate::error::TransformError;

/// Result of one dimension build.
#[derive(Debug, Clone, Default)]
pub struct DimensionOutput {
    /// Dimension rows, default member first
    pub table: Table,
    /// Members excluding the default row
    pub members: usize,
    /// Input rows dropped for a null natural key
    pub excluded_null_keys: usize,
    /// Event dates ignored for lying past the calendar horizon
    pub beyond_horizon: usize,
}

/// Newest watermark across input tables.
pub(crate) fn inputs_watermark(inputs: &[&Table]) -> Option<NaiveDateTime> {
    inputs
        .iter()
        .filter_map(|t| t.meta.source_watermark.max(t.watermark()))
        .max()
}

/// Builds the default member row.
pub(crate) fn default_member(key_column: &str, columns: &[&String], defaults: &[(String, Value)]) -> Row {
    let mut row = Row::new().with(key_column, SurrogateKey::default_member());
    for column in columns {
        row.set(column.as_str(), Value::Null);
    }
    for (column, value) in defaults {
        row.set(column.as_str(), value.clone());
    }
    row
}

/// Rebuilds a dimension. `inputs` lines up with `spec.sources`.
///
/// # Errors
///
/// `TransformError::InvalidModel` if `inputs` and `spec.sources` differ in
/// length.
pub fn build_dimension(spec: &DimensionSpec, inputs: &[&Table]) -> Result<DimensionOutput, TransformError> {
    if inputs.len() != spec.sources.len() {
        return Err(TransformError::InvalidModel {
            model: spec.name.to_string(),
            reason: format!("{} sources defined, {} provided", spec.sources.len(), inputs.len()),
        });
    }

    let mut projected = Vec::new();
    for (source, table) in spec.sources.iter().zip(inputs) {
        for row in &table.rows {
            let mut out = Row::new();
            for (from, to) in &source.columns {
                out.set(to.as_str(), row.get(from).clone());
            }
            out.set(SOURCE_LOADED_AT, row.get(SOURCE_LOADED_AT).clone());
            projected.push(out);
        }
    }

    let grouped = group_by_key(&projected, &spec.natural_key);
    let excluded_null_keys = grouped.null_keys.len();
    if excluded_null_keys > 0 {
        warn!(
            dimension = %spec.name,
            rows = excluded_null_keys,
            "Rows with null natural key excluded from dimension"
        );
    }

    let reference: BTreeMap<Vec<Value>, &Row> = spec
        .reference
        .iter()
        .map(|r| (r.project_owned(&spec.natural_key), r))
        .filter(|(key, _)| !key.iter().any(Value::is_null))
        .collect();

    let mut keys: Vec<&Vec<Value>> = grouped.groups.keys().chain(reference.keys()).collect();
    keys.sort();
    keys.dedup();

    let columns: Vec<&String> = spec.columns().collect();
    let mut rows = vec![default_member(&spec.key_column, &columns, &spec.defaults)];
    let empty = Vec::new();

    for key in keys {
        let group = grouped.groups.get(key).unwrap_or(&empty);
        let mut row = Row::new().with(spec.key_column.as_str(), SurrogateKey::generate(key));
        for (column, value) in spec.natural_key.iter().zip(key) {
            row.set(column.as_str(), value.clone());
        }
        for attribute in &spec.attributes {
            let overridden = reference
                .get(key)
                .map(|r| r.get(attribute))
                .filter(|v| !v.is_null());
            let value = match overridden {
                Some(v) => v.clone(),
                None => most_common_in(group, attribute),
            };
            row.set(attribute.as_str(), value);
        }
        rows.push(row);
    }

    let members = rows.len() - 1;
    info!(dimension = %spec.name, members, "Dimension rebuilt");

    Ok(DimensionOutput {
        table: Table::new(rows).with_meta(TableMetadata {
            refreshed_at: None,
            source_watermark: inputs_watermark(inputs),
        }),
        members,
        excluded_null_keys,
        beyond_horizon: 0,
    })
}
