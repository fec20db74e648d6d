//! SCD2 history tracker.
//!
//! Per entity (keyed by natural key) the history moves through
//! *no history* → *current v1* → *current v2* → … and optionally *closed*
//! when hard deletes are enabled and the entity disappears from the source.
//!
//! Each run compares the latest staged row of every entity with its persisted
//! open version, looking only at tracked columns. A change closes the open
//! version at the run's logical time and opens a new one from that same
//! instant, so intervals are contiguous. Comparing against persisted state
//! makes a re-run over unchanged input a no-op.

use chrono::NaiveDateTime;
use mart_core::dedup::{group_by_key, latest};
use mart_core::keys::SurrogateKey;
use mart_core::{DataQualityIssue, QualityReport, Row, Value};
use mart_store::{Table, TableMetadata};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::catalog::SnapshotSpec;
use crate::error::TransformError;
use crate::metrics;

/// Start of a version's validity (inclusive).
pub const VALID_FROM: &str = "valid_from";

/// End of a version's validity (exclusive); null while current.
pub const VALID_TO: &str = "valid_to";

/// Hash of natural key and `valid_from`.
pub const VERSION_ID: &str = "version_id";

/// Result of one snapshot capture.
#[derive(Debug, Clone, Default)]
pub struct SnapshotOutcome {
    /// Full history table after the run
    pub table: Table,
    /// Logical timestamp used for every transition
    pub run_at: Option<NaiveDateTime>,
    /// Versions opened (new entities, changes, reappearances)
    pub opened: usize,
    /// Versions closed because tracked columns changed
    pub superseded: usize,
    /// Versions closed with no successor
    pub deleted: usize,
    /// Entities whose tracked columns did not change
    pub unchanged: usize,
    /// Rows excluded for a null natural key
    pub issues: QualityReport,
}

impl SnapshotOutcome {
    /// Returns `true` if the run changed nothing.
    pub fn is_noop(&self) -> bool {
        self.opened == 0 && self.superseded == 0 && self.deleted == 0
    }
}

/// Logical timestamp of a snapshot run.
///
/// An explicit `as_of` wins; otherwise the newest staged `source_loaded_at`;
/// otherwise `now` (empty input).
pub fn run_timestamp(staged: &Table, as_of: Option<NaiveDateTime>, now: NaiveDateTime) -> NaiveDateTime {
    as_of.or_else(|| staged.watermark()).unwrap_or(now)
}

fn describe_key(spec: &SnapshotSpec, key: &[Value]) -> String {
    spec.natural_key
        .iter()
        .zip(key)
        .map(|(c, v)| format!("{}={}", c, v))
        .collect::<Vec<_>>()
        .join(", ")
}

fn open_version(spec: &SnapshotSpec, key: &[Value], source: &Row, run_at: NaiveDateTime) -> Row {
    let mut version_key = key.to_vec();
    version_key.push(Value::from(run_at));

    let mut row = Row::new();
    for (column, value) in spec.natural_key.iter().zip(key) {
        row.set(column.as_str(), value.clone());
    }
    for column in &spec.tracked {
        row.set(column.as_str(), source.get(column).clone());
    }
    row.with(VALID_FROM, run_at)
        .with(VALID_TO, Value::Null)
        .with(VERSION_ID, SurrogateKey::generate(&version_key))
}

/// Captures one snapshot against the persisted history.
///
/// Nothing is returned for writing when an error occurs, so a failed capture
/// leaves the stored history untouched.
///
/// # Errors
///
/// `TransformError::NonMonotonicRunTime` if a transition would be recorded
/// at or before a boundary already present for the entity.
pub fn capture_snapshot(
    spec: &SnapshotSpec,
    staged: &Table,
    history: &Table,
    run_at: NaiveDateTime,
) -> Result<SnapshotOutcome, TransformError> {
    let mut outcome = SnapshotOutcome {
        run_at: Some(run_at),
        ..SnapshotOutcome::default()
    };

    let grouped = group_by_key(&staged.rows, &spec.natural_key);
    let tracked: Vec<&str> = spec.tracked.iter().map(String::as_str).collect();
    for row in &grouped.null_keys {
        outcome.issues.push(DataQualityIssue::null_natural_key(
            spec.source.to_string(),
            format!("row excluded from {}: {}", spec.name, row.describe(&tracked)),
        ));
    }

    let mut rows = history.rows.clone();

    // Latest version index per entity.
    let mut latest_version: BTreeMap<Vec<Value>, usize> = BTreeMap::new();
    for (idx, row) in rows.iter().enumerate() {
        let key = row.project_owned(&spec.natural_key);
        let newer = match latest_version.get(&key) {
            Some(&prev) => rows[prev].timestamp(VALID_FROM) < row.timestamp(VALID_FROM),
            None => true,
        };
        if newer {
            latest_version.insert(key, idx);
        }
    }

    let boundary_of = |row: &Row| row.timestamp(VALID_TO).max(row.timestamp(VALID_FROM));
    let check_monotonic = |key: &[Value], boundary: Option<NaiveDateTime>| match boundary {
        Some(b) if run_at <= b => Err(TransformError::NonMonotonicRunTime {
            snapshot: spec.name.clone(),
            run_at,
            boundary: b,
            entity: describe_key(spec, key),
        }),
        _ => Ok(()),
    };

    let mut seen: BTreeSet<&Vec<Value>> = BTreeSet::new();
    let mut appended = Vec::new();

    for (key, group) in &grouped.groups {
        seen.insert(key);
        let Some(current) = latest(group.iter().copied()) else {
            continue;
        };

        match latest_version.get(key).map(|&i| (i, &rows[i])) {
            Some((idx, open)) if open.get(VALID_TO).is_null() => {
                let unchanged = spec
                    .tracked
                    .iter()
                    .all(|c| open.get(c) == current.get(c));
                if unchanged {
                    outcome.unchanged += 1;
                    continue;
                }
                check_monotonic(key.as_slice(), boundary_of(open))?;
                rows[idx].set(VALID_TO, run_at);
                appended.push(open_version(spec, key, current, run_at));
                outcome.superseded += 1;
                outcome.opened += 1;
                debug!(snapshot = %spec.name, entity = %describe_key(spec, key), "Version superseded");
            }
            Some((_, closed)) => {
                // Previously deleted entity reappears.
                check_monotonic(key.as_slice(), boundary_of(closed))?;
                appended.push(open_version(spec, key, current, run_at));
                outcome.opened += 1;
            }
            None => {
                appended.push(open_version(spec, key, current, run_at));
                outcome.opened += 1;
            }
        }
    }

    if spec.hard_deletes {
        for (key, &idx) in &latest_version {
            if seen.contains(key) || !rows[idx].get(VALID_TO).is_null() {
                continue;
            }
            check_monotonic(key.as_slice(), boundary_of(&rows[idx]))?;
            rows[idx].set(VALID_TO, run_at);
            outcome.deleted += 1;
            debug!(snapshot = %spec.name, entity = %describe_key(spec, key), "Version closed by hard delete");
        }
    }

    rows.extend(appended);
    rows.sort_by(|a, b| {
        a.project_owned(&spec.natural_key)
            .cmp(&b.project_owned(&spec.natural_key))
            .then_with(|| a.timestamp(VALID_FROM).cmp(&b.timestamp(VALID_FROM)))
    });

    info!(
        snapshot = %spec.name,
        run_at = %run_at,
        opened = outcome.opened,
        superseded = outcome.superseded,
        deleted = outcome.deleted,
        unchanged = outcome.unchanged,
        "Snapshot captured"
    );
    metrics::record_snapshot(spec.name.table(), outcome.opened, outcome.superseded + outcome.deleted);

    outcome.table = Table::new(rows).with_meta(TableMetadata {
        refreshed_at: Some(run_at),
        source_watermark: staged.watermark().max(history.meta.source_watermark),
    });
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mart_core::types::SOURCE_LOADED_AT;
    use mart_core::IssueKind;
    use mart_store::TableName;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn spec(hard_deletes: bool) -> SnapshotSpec {
        SnapshotSpec {
            name: TableName::snapshots("customers_snapshot"),
            source: TableName::staging("stg_transactions"),
            natural_key: vec!["card_number".into()],
            tracked: vec!["city".into(), "state".into(), "zip".into(), "job".into()],
            hard_deletes,
        }
    }

    fn customer(card: &str, city: &str, day: u32) -> Row {
        Row::new()
            .with("card_number", card)
            .with("city", city)
            .with("state", "NY")
            .with("zip", "10001")
            .with("job", "Engineer")
            .with("first_name", "Ada")
            .with(SOURCE_LOADED_AT, at(day))
    }

    fn capture(spec: &SnapshotSpec, staged: Vec<Row>, history: &Table) -> SnapshotOutcome {
        let staged = Table::new(staged);
        let run_at = run_timestamp(&staged, None, at(28));
        capture_snapshot(spec, &staged, history, run_at).unwrap()
    }

    #[test]
    fn test_first_capture_opens_versions() {
        let out = capture(&spec(false), vec![customer("C1", "Paris", 1), customer("C2", "Rome", 1)], &Table::default());
        assert_eq!(out.opened, 2);
        assert_eq!(out.table.len(), 2);
        let v = &out.table.rows[0];
        assert_eq!(v.timestamp(VALID_FROM), Some(at(1)));
        assert!(v.get(VALID_TO).is_null());
        assert!(!v.contains("first_name"));
        assert_eq!(v.text(VERSION_ID).map(str::len), Some(32));
    }

    #[test]
    fn test_change_closes_and_opens_contiguously() {
        let s = spec(false);
        let first = capture(&s, vec![customer("C1", "Paris", 1)], &Table::default());
        let second = capture(&s, vec![customer("C1", "Berlin", 2)], &first.table);

        assert_eq!(second.superseded, 1);
        assert_eq!(second.opened, 1);
        let rows = &second.table.rows;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text("city"), Some("Paris"));
        assert_eq!(rows[0].timestamp(VALID_TO), Some(at(2)));
        assert_eq!(rows[1].text("city"), Some("Berlin"));
        assert_eq!(rows[1].timestamp(VALID_FROM), Some(at(2)));
        assert!(rows[1].get(VALID_TO).is_null());
        assert_ne!(rows[0].get(VERSION_ID), rows[1].get(VERSION_ID));
    }

    #[test]
    fn test_rerun_is_noop() {
        let s = spec(false);
        let staged = vec![customer("C1", "Paris", 1)];
        let first = capture(&s, staged.clone(), &Table::default());
        let second = capture(&s, staged, &first.table);
        assert!(second.is_noop());
        assert_eq!(second.unchanged, 1);
        assert_eq!(second.table.rows, first.table.rows);
    }

    #[test]
    fn test_untracked_change_is_noop() {
        let s = spec(false);
        let first = capture(&s, vec![customer("C1", "Paris", 1)], &Table::default());
        let renamed = customer("C1", "Paris", 2).with("first_name", "Grace");
        let second = capture(&s, vec![renamed], &first.table);
        assert!(second.is_noop());
    }

    #[test]
    fn test_latest_staged_row_wins() {
        let out = capture(
            &spec(false),
            vec![customer("C1", "Berlin", 3), customer("C1", "Paris", 1)],
            &Table::default(),
        );
        assert_eq!(out.table.rows[0].text("city"), Some("Berlin"));
    }

    #[test]
    fn test_hard_delete_and_reappearance() {
        let s = spec(true);
        let first = capture(&s, vec![customer("C1", "Paris", 1), customer("C2", "Rome", 1)], &Table::default());
        let second = capture(&s, vec![customer("C2", "Rome", 2)], &first.table);
        assert_eq!(second.deleted, 1);
        let c1 = &second.table.rows[0];
        assert_eq!(c1.timestamp(VALID_TO), Some(at(2)));

        let third = capture(&s, vec![customer("C1", "Paris", 3), customer("C2", "Rome", 3)], &second.table);
        assert_eq!(third.opened, 1);
        let c1_versions: Vec<_> = third
            .table
            .rows
            .iter()
            .filter(|r| r.text("card_number") == Some("C1"))
            .collect();
        assert_eq!(c1_versions.len(), 2);
        assert!(c1_versions[1].get(VALID_TO).is_null());
    }

    #[test]
    fn test_absent_entity_kept_without_hard_deletes() {
        let s = spec(false);
        let first = capture(&s, vec![customer("C1", "Paris", 1)], &Table::default());
        let second = capture(&s, vec![customer("C2", "Rome", 2)], &first.table);
        assert_eq!(second.deleted, 0);
        assert!(second.table.rows[0].get(VALID_TO).is_null());
    }

    #[test]
    fn test_non_monotonic_run_time() {
        let s = spec(false);
        let first = capture(&s, vec![customer("C1", "Paris", 5)], &Table::default());
        let staged = Table::new(vec![customer("C1", "Berlin", 5)]);
        let err = capture_snapshot(&s, &staged, &first.table, at(5)).unwrap_err();
        assert!(matches!(err, TransformError::NonMonotonicRunTime { .. }));
    }

    #[test]
    fn test_null_natural_key_reported() {
        let mut orphan = customer("X", "Paris", 1);
        orphan.set("card_number", Value::Null);
        let out = capture(&spec(false), vec![orphan, customer("C1", "Paris", 1)], &Table::default());
        assert_eq!(out.opened, 1);
        assert_eq!(out.issues.count(IssueKind::NullNaturalKey), 1);
    }

    #[test]
    fn test_run_timestamp_precedence() {
        let staged = Table::new(vec![customer("C1", "Paris", 3)]);
        assert_eq!(run_timestamp(&staged, Some(at(9)), at(20)), at(9));
        assert_eq!(run_timestamp(&staged, None, at(20)), at(3));
        assert_eq!(run_timestamp(&Table::default(), None, at(20)), at(20));
    }
}
