//! Incremental fact merger.
//!
//! A merge:
//!
//! 1. selects staged rows newer than the fact table's watermark
//!    (`MAX(source_loaded_at)` of stored facts), or all rows in full refresh
//! 2. resolves every foreign key by natural-key lookup, substituting the
//!    dimension's default member on a miss
//! 3. computes derived measures; windowed ones are recomputed over every
//!    partition the batch touches, so late arrivals restate stored rows
//! 4. hashes the event's natural key into `fact_key`
//! 5. upserts by `fact_key`
//!
//! Selecting nothing leaves the table untouched; replaying a batch converges
//! to the same state.

use chrono::NaiveDateTime;
use mart_core::dedup::recency_order;
use mart_core::keys::SurrogateKey;
use mart_core::types::SOURCE_LOADED_AT;
use mart_core::{Row, Value};
use mart_store::{Table, TableMetadata, TableName};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::catalog::{DerivedMeasure, FactSpec, LookupKey, MeasureKind};
use crate::error::TransformError;
use crate::measures::{apply_measures, FACT_KEY};
use crate::metrics;

/// Whether stored watermarks are honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// Process only rows past the stored watermark and upsert them
    #[default]
    Incremental,
    /// Ignore stored facts and rebuild the table from every staged row
    FullRefresh,
}

/// Everything a merge reads.
#[derive(Debug, Clone, Copy)]
pub struct FactInputs<'a> {
    /// Staged source rows
    pub staged: &'a Table,
    /// Currently stored fact table
    pub existing: &'a Table,
    /// Referenced dimensions by name
    pub dimensions: &'a BTreeMap<TableName, Table>,
    /// Dimensions built from the same staged table as this fact
    pub same_source: &'a [TableName],
}

/// Result of one merge.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// Fact table
    pub fact: Option<TableName>,
    /// New table contents; `None` when nothing was selected
    pub table: Option<Table>,
    /// Staged rows past the watermark
    pub selected: usize,
    /// New fact keys
    pub inserted: usize,
    /// Existing fact keys replaced
    pub updated: usize,
    /// Stored rows outside the batch whose windowed measures changed
    pub restated: usize,
    /// Default-member substitutions per foreign key column
    pub substitutions: BTreeMap<String, usize>,
    /// Watermark before the merge
    pub watermark_before: Option<NaiveDateTime>,
    /// Watermark after the merge
    pub watermark_after: Option<NaiveDateTime>,
}

impl MergeOutcome {
    /// Total default-member substitutions.
    pub fn total_substitutions(&self) -> usize {
        self.substitutions.values().sum()
    }
}

/// Natural key → member row, default member excluded.
fn index_dimension<'a>(table: &'a Table, key_column: &str, natural_key: &[String]) -> HashMap<Vec<Value>, &'a Row> {
    table
        .rows
        .iter()
        .filter(|r| {
            SurrogateKey::from_value(r.get(key_column)).is_some_and(|k| !k.is_default_member())
        })
        .map(|r| (r.project_owned(natural_key), r))
        .filter(|(key, _)| !key.iter().any(Value::is_null))
        .collect()
}

/// Merges the staged rows of one grain into its fact table.
///
/// # Errors
///
/// - `TransformError::WatermarkRegression` if the staged source is non-empty
///   and its newest row is older than the stored watermark (incremental only)
/// - `TransformError::StaleDimension` if a same-source dimension was built
///   from older data than the staged source
/// - `TransformError::MissingSource` if a referenced dimension is absent
pub fn merge_facts(spec: &FactSpec, inputs: FactInputs<'_>, mode: MergeMode) -> Result<MergeOutcome, TransformError> {
    let started = Instant::now();
    let source_max = inputs.staged.watermark();
    let stored = match mode {
        MergeMode::Incremental => inputs.existing.watermark(),
        MergeMode::FullRefresh => None,
    };

    if let (Some(source_max), Some(stored)) = (source_max, stored) {
        if source_max < stored {
            return Err(TransformError::WatermarkRegression {
                fact: spec.name.clone(),
                stored,
                source_max,
            });
        }
    }

    let mut indexes = Vec::with_capacity(spec.lookups.len());
    for lookup in &spec.lookups {
        let dimension = inputs
            .dimensions
            .get(&lookup.dimension)
            .ok_or_else(|| TransformError::MissingSource(lookup.dimension.clone()))?;
        if let Some(source_max) = source_max {
            let built_from = dimension.meta.source_watermark;
            if inputs.same_source.contains(&lookup.dimension) && built_from < Some(source_max) {
                return Err(TransformError::StaleDimension {
                    fact: spec.name.clone(),
                    dimension: lookup.dimension.clone(),
                    dimension_watermark: built_from,
                    source_max,
                });
            }
        }
        indexes.push(index_dimension(dimension, &lookup.dimension_key, &lookup.dimension_natural_key));
    }

    let mut outcome = MergeOutcome {
        fact: Some(spec.name.clone()),
        watermark_before: stored,
        ..MergeOutcome::default()
    };

    // Newest staged row per fact key; older duplicates lose.
    let mut batch: BTreeMap<SurrogateKey, &Row> = BTreeMap::new();
    for row in &inputs.staged.rows {
        let past_watermark = match (stored, row.source_loaded_at()) {
            (None, _) => true,
            (Some(w), Some(ts)) => ts > w,
            (Some(_), None) => false,
        };
        if !past_watermark {
            continue;
        }
        outcome.selected += 1;
        let key = SurrogateKey::generate(&row.project_owned(&spec.natural_key));
        batch
            .entry(key)
            .and_modify(|kept| {
                if recency_order(row, kept).is_lt() {
                    *kept = row;
                }
            })
            .or_insert(row);
    }

    if outcome.selected == 0 {
        info!(fact = %spec.name, watermark = ?stored, "No new rows past watermark");
        outcome.watermark_after = stored;
        return Ok(outcome);
    }

    let mut new_rows = Vec::with_capacity(batch.len());
    for (fact_key, staged) in &batch {
        let mut fact = Row::new().with(FACT_KEY, fact_key);
        let mut matched: HashMap<&str, &Row> = HashMap::new();

        for (lookup, index) in spec.lookups.iter().zip(&indexes) {
            let natural = match &lookup.from {
                LookupKey::Columns(columns) => staged.project_owned(columns),
                LookupKey::Through { foreign_key, column } => vec![matched
                    .get(foreign_key.as_str())
                    .map(|member| member.get(column).clone())
                    .unwrap_or(Value::Null)],
            };
            let member = if natural.iter().any(Value::is_null) {
                None
            } else {
                index.get(&natural).copied()
            };
            let key = match member {
                Some(m) => {
                    matched.insert(lookup.foreign_key.as_str(), m);
                    m.get(&lookup.dimension_key).clone()
                }
                None => {
                    *outcome.substitutions.entry(lookup.foreign_key.clone()).or_insert(0) += 1;
                    Value::from(SurrogateKey::default_member())
                }
            };
            fact.set(lookup.foreign_key.as_str(), key);
        }

        for column in &spec.columns {
            fact.set(column.as_str(), staged.get(column).clone());
        }
        fact.set(SOURCE_LOADED_AT, staged.get(SOURCE_LOADED_AT).clone());
        new_rows.push(fact);
    }

    let row_level: Vec<DerivedMeasure> = spec
        .measures
        .iter()
        .filter(|m| !m.kind.is_windowed())
        .cloned()
        .collect();
    apply_measures(&row_level, &mut new_rows, &[]);

    let mut rows: Vec<Row> = match mode {
        MergeMode::Incremental => inputs.existing.rows.clone(),
        MergeMode::FullRefresh => Vec::new(),
    };
    let position: HashMap<Value, usize> = rows
        .iter()
        .enumerate()
        .map(|(i, r)| (r.get(FACT_KEY).clone(), i))
        .collect();
    for row in new_rows {
        match position.get(row.get(FACT_KEY)) {
            Some(&i) => {
                rows[i] = row;
                outcome.updated += 1;
            }
            None => {
                rows.push(row);
                outcome.inserted += 1;
            }
        }
    }
    outcome.restated = refresh_windows(&spec.measures, &mut rows, &batch);
    if outcome.restated > 0 {
        debug!(fact = %spec.name, restated = outcome.restated, "Stored rows restated by late arrivals");
    }

    for (lookup, count) in &outcome.substitutions {
        let dimension = spec
            .lookups
            .iter()
            .find(|l| &l.foreign_key == lookup)
            .map(|l| l.dimension.table())
            .unwrap_or_default();
        metrics::record_default_substitutions(spec.name.table(), dimension, *count);
        warn!(fact = %spec.name, foreign_key = %lookup, count, "Foreign keys resolved to default member");
    }

    let table = Table::new(rows);
    outcome.watermark_after = table.watermark();
    let elapsed = started.elapsed().as_secs_f64();
    metrics::record_fact_merge(spec.name.table(), outcome.selected, outcome.inserted + outcome.updated, elapsed);
    info!(
        fact = %spec.name,
        mode = ?mode,
        selected = outcome.selected,
        inserted = outcome.inserted,
        updated = outcome.updated,
        restated = outcome.restated,
        watermark = ?outcome.watermark_after,
        "Fact merged"
    );
    debug!(fact = %spec.name, rows = table.len(), elapsed_secs = elapsed, "Fact table size");

    outcome.table = Some(table.with_meta(TableMetadata {
        refreshed_at: None,
        source_watermark: outcome.watermark_after,
    }));
    Ok(outcome)
}

/// Recomputes windowed measures over every partition the batch touches.
///
/// A late row shifts the "previous value" of every stored row ordered after
/// it, so the whole partition is recomputed rather than just the batch.
/// Returns how many stored rows outside the batch changed.
fn refresh_windows(
    measures: &[DerivedMeasure],
    rows: &mut [Row],
    batch: &BTreeMap<SurrogateKey, &Row>,
) -> usize {
    let in_batch = |row: &Row| {
        SurrogateKey::from_value(row.get(FACT_KEY)).is_some_and(|k| batch.contains_key(&k))
    };
    let mut restated = BTreeSet::new();

    for measure in measures {
        let (MeasureKind::Delta { partition, .. } | MeasureKind::PercentChange { partition, .. }) =
            &measure.kind
        else {
            continue;
        };
        let touched: HashSet<Vec<Value>> = rows
            .iter()
            .filter(|r| in_batch(*r))
            .map(|r| r.project_owned(partition))
            .collect();
        let members: Vec<usize> = (0..rows.len())
            .filter(|&i| touched.contains(&rows[i].project_owned(partition)))
            .collect();

        let mut window: Vec<Row> = members.iter().map(|&i| rows[i].clone()).collect();
        apply_measures(std::slice::from_ref(measure), &mut window, &[]);
        for (&i, row) in members.iter().zip(window) {
            if !in_batch(&rows[i]) && rows[i].get(&measure.name) != row.get(&measure.name) {
                restated.insert(i);
            }
            rows[i] = row;
        }
    }
    restated.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::build_calendar;
    use crate::catalog::{CatalogSettings, ModelCatalog};
    use crate::dimension::build_dimension;
    use chrono::NaiveDate;
    use mart_core::keys::DEFAULT_MEMBER_KEY;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use rust_decimal::Decimal;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn txn(id: &str, card: &str, merchant: &str, amount: i64, loaded: NaiveDateTime) -> Row {
        Row::new()
            .with("transaction_id", id)
            .with("card_number", card)
            .with("merchant_name", merchant)
            .with("category", "misc")
            .with("amount", Decimal::new(amount, 2))
            .with("transaction_date", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .with(SOURCE_LOADED_AT, loaded)
    }

    fn catalog() -> ModelCatalog {
        let settings = CatalogSettings {
            calendar_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            ..CatalogSettings::default()
        };
        ModelCatalog::standard(&settings)
    }

    /// Builds every dimension the transactions fact needs from `dim_source`.
    fn dimensions(catalog: &ModelCatalog, dim_source: &Table) -> BTreeMap<TableName, Table> {
        let mut dims = BTreeMap::new();
        for spec in &catalog.dimensions {
            let inputs: Vec<&Table> = spec.sources.iter().map(|_| dim_source).collect();
            dims.insert(spec.name.clone(), build_dimension(spec, &inputs).unwrap().table);
        }
        let empty = Table::default();
        let calendar = build_calendar(&catalog.calendar, &[dim_source, &empty, &empty]).unwrap();
        dims.insert(catalog.calendar.name.clone(), calendar.table);
        dims
    }

    fn merge(
        catalog: &ModelCatalog,
        staged: &Table,
        existing: &Table,
        dims: &BTreeMap<TableName, Table>,
        mode: MergeMode,
    ) -> Result<MergeOutcome, TransformError> {
        let spec = catalog.fact("fact_transactions").unwrap();
        let same_source = catalog.dimensions_reading(&spec.source);
        merge_facts(
            spec,
            FactInputs {
                staged,
                existing,
                dimensions: dims,
                same_source: &same_source,
            },
            mode,
        )
    }

    #[test]
    fn test_first_load_resolves_keys() {
        let catalog = catalog();
        let staged = Table::new(vec![
            txn("t1", "4111", "Acme", 1050, at(1, 0)),
            txn("t2", "4222", "Globex", 900, at(1, 0)),
        ]);
        let dims = dimensions(&catalog, &staged);
        let out = merge(&catalog, &staged, &Table::default(), &dims, MergeMode::Incremental).unwrap();

        assert_eq!(out.inserted, 2);
        assert_eq!(out.total_substitutions(), 0);
        let table = out.table.unwrap();
        assert_eq!(table.meta.source_watermark, Some(at(1, 0)));
        let t1 = table
            .rows
            .iter()
            .find(|r| r.text("transaction_id") == Some("t1"))
            .unwrap();
        assert_eq!(
            t1.text("merchant_key"),
            Some(SurrogateKey::generate(&[Value::from("Acme")]).as_str())
        );
        assert_eq!(
            t1.text(FACT_KEY),
            Some(SurrogateKey::generate(&[Value::from("t1")]).as_str())
        );
        assert_ne!(t1.text("transaction_date_key"), Some(DEFAULT_MEMBER_KEY));
    }

    #[test]
    fn test_orphan_resolves_to_default_member() {
        let catalog = catalog();
        let known = Table::new(vec![txn("t1", "4111", "Acme", 100, at(1, 0))]);
        let dims = dimensions(&catalog, &known);
        let staged = Table::new(vec![
            txn("t1", "4111", "Acme", 100, at(1, 0)),
            txn("t2", "4111", "Initech", 100, at(1, 0)),
        ]);
        let out = merge(&catalog, &staged, &Table::default(), &dims, MergeMode::Incremental).unwrap();

        assert_eq!(out.substitutions.get("merchant_key"), Some(&1));
        let table = out.table.unwrap();
        assert_eq!(table.len(), 2);
        let orphan = table
            .rows
            .iter()
            .find(|r| r.text("transaction_id") == Some("t2"))
            .unwrap();
        assert_eq!(orphan.text("merchant_key"), Some(DEFAULT_MEMBER_KEY));
    }

    #[test]
    fn test_orphan_substitution_recorded_as_metric() {
        let catalog = catalog();
        let known = Table::new(vec![txn("t1", "4111", "Acme", 100, at(1, 0))]);
        let dims = dimensions(&catalog, &known);
        let staged = Table::new(vec![
            txn("t1", "4111", "Acme", 100, at(1, 0)),
            txn("t2", "4111", "Initech", 100, at(1, 0)),
        ]);

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        ::metrics::with_local_recorder(&recorder, || {
            merge(&catalog, &staged, &Table::default(), &dims, MergeMode::Incremental).unwrap()
        });

        let merchants = catalog
            .fact("fact_transactions")
            .unwrap()
            .lookups
            .iter()
            .find(|l| l.foreign_key == "merchant_key")
            .unwrap()
            .dimension
            .table()
            .to_string();
        let counted: Vec<(Vec<(String, String)>, u64)> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter(|(key, _, _, _)| key.key().name() == crate::metrics::FACT_DEFAULT_KEY_SUBSTITUTIONS)
            .filter_map(|(key, _, _, value)| match value {
                DebugValue::Counter(n) => Some((
                    key.key()
                        .labels()
                        .map(|l| (l.key().to_string(), l.value().to_string()))
                        .collect(),
                    n,
                )),
                _ => None,
            })
            .collect();

        assert_eq!(
            counted,
            vec![(
                vec![
                    ("fact".to_string(), "fact_transactions".to_string()),
                    ("dimension".to_string(), merchants),
                ],
                1
            )]
        );
    }

    #[test]
    fn test_nothing_past_watermark_is_noop() {
        let catalog = catalog();
        let staged = Table::new(vec![txn("t1", "4111", "Acme", 100, at(1, 0))]);
        let dims = dimensions(&catalog, &staged);
        let first = merge(&catalog, &staged, &Table::default(), &dims, MergeMode::Incremental).unwrap();
        let stored = first.table.unwrap();

        let second = merge(&catalog, &staged, &stored, &dims, MergeMode::Incremental).unwrap();
        assert_eq!(second.selected, 0);
        assert!(second.table.is_none());
        assert_eq!(second.watermark_after, Some(at(1, 0)));
    }

    #[test]
    fn test_later_batch_updates_in_place() {
        let catalog = catalog();
        let batch1 = Table::new(vec![
            txn("t1", "4111", "Acme", 100, at(1, 0)),
            txn("t2", "4111", "Acme", 200, at(1, 0)),
        ]);
        let dims = dimensions(&catalog, &batch1);
        let stored = merge(&catalog, &batch1, &Table::default(), &dims, MergeMode::Incremental)
            .unwrap()
            .table
            .unwrap();

        let mut rows = batch1.rows.clone();
        rows.push(txn("t2", "4111", "Acme", 250, at(2, 0)));
        rows.push(txn("t3", "4111", "Acme", 300, at(2, 0)));
        let batch2 = Table::new(rows);
        let dims = dimensions(&catalog, &batch2);
        let out = merge(&catalog, &batch2, &stored, &dims, MergeMode::Incremental).unwrap();

        assert_eq!(out.selected, 2);
        assert_eq!(out.updated, 1);
        assert_eq!(out.inserted, 1);
        let table = out.table.unwrap();
        assert_eq!(table.len(), 3);
        let t2 = table
            .rows
            .iter()
            .find(|r| r.text("transaction_id") == Some("t2"))
            .unwrap();
        assert_eq!(t2.decimal("amount"), Some(Decimal::new(250, 2)));
    }

    #[test]
    fn test_full_refresh_matches_incremental_history() {
        let catalog = catalog();
        let batch1 = Table::new(vec![txn("t1", "4111", "Acme", 100, at(1, 0))]);
        let dims1 = dimensions(&catalog, &batch1);
        let stored = merge(&catalog, &batch1, &Table::default(), &dims1, MergeMode::Incremental)
            .unwrap()
            .table
            .unwrap();

        let mut rows = batch1.rows.clone();
        rows.push(txn("t2", "4222", "Globex", 300, at(2, 0)));
        let all = Table::new(rows);
        let dims = dimensions(&catalog, &all);
        let incremental = merge(&catalog, &all, &stored, &dims, MergeMode::Incremental)
            .unwrap()
            .table
            .unwrap();
        let refreshed = merge(&catalog, &all, &stored, &dims, MergeMode::FullRefresh)
            .unwrap()
            .table
            .unwrap();

        let mut a = incremental.rows;
        let mut b = refreshed.rows;
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicate_event_keeps_latest_load() {
        let catalog = catalog();
        let staged = Table::new(vec![
            txn("t1", "4111", "Acme", 100, at(1, 0)),
            txn("t1", "4111", "Acme", 175, at(1, 6)),
        ]);
        let dims = dimensions(&catalog, &staged);
        let out = merge(&catalog, &staged, &Table::default(), &dims, MergeMode::Incremental).unwrap();
        let table = out.table.unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0].decimal("amount"), Some(Decimal::new(175, 2)));
    }

    #[test]
    fn test_watermark_regression() {
        let catalog = catalog();
        let newer = Table::new(vec![txn("t1", "4111", "Acme", 100, at(5, 0))]);
        let dims = dimensions(&catalog, &newer);
        let stored = merge(&catalog, &newer, &Table::default(), &dims, MergeMode::Incremental)
            .unwrap()
            .table
            .unwrap();

        let older = Table::new(vec![txn("t9", "4111", "Acme", 100, at(2, 0))]);
        let err = merge(&catalog, &older, &stored, &dims, MergeMode::Incremental).unwrap_err();
        assert!(matches!(err, TransformError::WatermarkRegression { .. }));

        // An empty source is not a regression.
        let out = merge(&catalog, &Table::default(), &stored, &dims, MergeMode::Incremental).unwrap();
        assert_eq!(out.selected, 0);
    }

    #[test]
    fn test_stale_dimension_rejected() {
        let catalog = catalog();
        let old = Table::new(vec![txn("t1", "4111", "Acme", 100, at(1, 0))]);
        let dims = dimensions(&catalog, &old);
        let staged = Table::new(vec![
            txn("t1", "4111", "Acme", 100, at(1, 0)),
            txn("t2", "4111", "Acme", 100, at(3, 0)),
        ]);
        let err = merge(&catalog, &staged, &Table::default(), &dims, MergeMode::Incremental).unwrap_err();
        assert!(matches!(err, TransformError::StaleDimension { .. }));
    }

    #[test]
    fn test_missing_dimension() {
        let catalog = catalog();
        let staged = Table::new(vec![txn("t1", "4111", "Acme", 100, at(1, 0))]);
        let err = merge(&catalog, &staged, &Table::default(), &BTreeMap::new(), MergeMode::Incremental)
            .unwrap_err();
        assert!(matches!(err, TransformError::MissingSource(_)));
    }

    fn price_catalog() -> ModelCatalog {
        let settings = CatalogSettings {
            calendar_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            securities: vec![Row::new().with("ticker", "AAPL").with("currency_code", "USD")],
            currencies: vec![Row::new().with("currency_code", "USD")],
            ..CatalogSettings::default()
        };
        ModelCatalog::standard(&settings)
    }

    fn price(day: u32, open: i64, close: i64, loaded: NaiveDateTime) -> Row {
        Row::new()
            .with("ticker", "AAPL")
            .with("price_date", NaiveDate::from_ymd_opt(2024, 1, day).unwrap())
            .with("open_price", Decimal::new(open, 0))
            .with("high_price", Decimal::new(close.max(open) + 1, 0))
            .with("low_price", Decimal::new(close.min(open) - 1, 0))
            .with("close_price", Decimal::new(close, 0))
            .with(SOURCE_LOADED_AT, loaded)
    }

    fn price_dims(catalog: &ModelCatalog, staged: &Table) -> BTreeMap<TableName, Table> {
        let mut dims = BTreeMap::new();
        for d in &catalog.dimensions {
            let inputs: Vec<&Table> = d.sources.iter().map(|_| staged).collect();
            dims.insert(d.name.clone(), build_dimension(d, &inputs).unwrap().table);
        }
        let empty = Table::default();
        dims.insert(
            catalog.calendar.name.clone(),
            build_calendar(&catalog.calendar, &[&empty, staged, &empty]).unwrap().table,
        );
        dims
    }

    fn merge_prices(
        catalog: &ModelCatalog,
        staged: &Table,
        existing: &Table,
        dims: &BTreeMap<TableName, Table>,
        mode: MergeMode,
    ) -> MergeOutcome {
        let spec = catalog.fact("fact_daily_prices").unwrap();
        let same_source = catalog.dimensions_reading(&spec.source);
        merge_facts(
            spec,
            FactInputs {
                staged,
                existing,
                dimensions: dims,
                same_source: &same_source,
            },
            mode,
        )
        .unwrap()
    }

    #[test]
    fn test_price_measures_and_currency_through_security() {
        let catalog = price_catalog();
        let staged = Table::new(vec![price(1, 0, 100, at(1, 0)), price(2, 100, 110, at(2, 0))]);
        let dims = price_dims(&catalog, &staged);
        let out = merge_prices(&catalog, &staged, &Table::default(), &dims, MergeMode::Incremental);
        let mut rows = out.table.unwrap().rows;
        rows.sort_by_key(|r| r.date("price_date"));

        assert_eq!(
            rows[0].text("currency_key"),
            Some(SurrogateKey::generate(&[Value::from("USD")]).as_str())
        );
        // Zero open price: ratio is null, not an error.
        assert!(rows[0].get("close_to_open_ratio").is_null());
        assert!(rows[0].get("daily_return_pct").is_null());
        assert_eq!(rows[1].decimal("price_change"), Some(Decimal::new(1000, 2)));
        assert_eq!(rows[1].decimal("daily_return_pct"), Some(Decimal::new(10_000_000, 6)));
        assert_eq!(rows[1].decimal("daily_range"), Some(Decimal::new(1200, 2)));
    }

    #[test]
    fn test_late_price_restates_later_days() {
        let catalog = price_catalog();
        let first = Table::new(vec![price(1, 100, 100, at(10, 0)), price(3, 130, 130, at(10, 0))]);
        let dims = price_dims(&catalog, &first);
        let stored = merge_prices(&catalog, &first, &Table::default(), &dims, MergeMode::Incremental)
            .table
            .unwrap();

        // Day 2 arrives after day 3 was already merged.
        let mut rows = first.rows.clone();
        rows.push(price(2, 120, 120, at(11, 0)));
        let all = Table::new(rows);
        let dims = price_dims(&catalog, &all);
        let out = merge_prices(&catalog, &all, &stored, &dims, MergeMode::Incremental);
        assert_eq!((out.selected, out.inserted, out.updated), (1, 1, 0));
        assert_eq!(out.restated, 1);

        let mut incremental = out.table.unwrap().rows;
        incremental.sort_by_key(|r| r.date("price_date"));
        assert_eq!(incremental[1].decimal("price_change"), Some(Decimal::new(2000, 2)));
        assert_eq!(incremental[2].decimal("price_change"), Some(Decimal::new(1000, 2)));

        let mut refreshed = merge_prices(&catalog, &all, &stored, &dims, MergeMode::FullRefresh)
            .table
            .unwrap()
            .rows;
        refreshed.sort_by_key(|r| r.date("price_date"));
        assert_eq!(incremental, refreshed);
    }
}
