//! Tie-break comparators for deduplication.
//!
//! Two policies are used across the engine:
//!
//! - **Latest row wins** (history snapshots): rows are ranked by descending
//!   `source_loaded_at`; rows without a watermark rank last; remaining ties
//!   fall back to the total order of the row content.
//! - **Most common value wins** (dimension attributes): per attribute, the
//!   most frequent non-null value; ties broken by the most recent
//!   `source_loaded_at` at which the value was observed, then by the greater
//!   value.
//!
//! Both policies are total, so the outcome never depends on input order.

use chrono::NaiveDateTime;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::types::{Row, Value};

/// Orders rows most-recent first.
///
/// Returns `Ordering::Less` when `a` should be preferred over `b`.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use mart_core::dedup::recency_order;
/// use mart_core::types::{Row, SOURCE_LOADED_AT};
/// use std::cmp::Ordering;
///
/// let t0 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
/// let t1 = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(0, 0, 0).unwrap();
/// let old = Row::new().with(SOURCE_LOADED_AT, t0);
/// let new = Row::new().with(SOURCE_LOADED_AT, t1);
/// assert_eq!(recency_order(&new, &old), Ordering::Less);
/// ```
pub fn recency_order(a: &Row, b: &Row) -> Ordering {
    b.source_loaded_at()
        .cmp(&a.source_loaded_at())
        .then_with(|| b.cmp(a))
}

/// Returns the preferred row under [`recency_order`].
pub fn latest<'a, I>(rows: I) -> Option<&'a Row>
where
    I: IntoIterator<Item = &'a Row>,
{
    rows.into_iter().min_by(|a, b| recency_order(a, b))
}

/// Result of grouping rows by a natural key.
#[derive(Debug, Default)]
pub struct KeyedGroups<'a> {
    /// Rows per non-null natural key, keys in ascending order
    pub groups: BTreeMap<Vec<Value>, Vec<&'a Row>>,
    /// Rows excluded because a key component was null
    pub null_keys: Vec<&'a Row>,
}

/// Groups rows by the given natural-key columns.
///
/// A row whose key has any null component cannot be matched to anything and
/// is set aside in `null_keys`.
pub fn group_by_key<'a>(rows: &'a [Row], key_columns: &[String]) -> KeyedGroups<'a> {
    let mut out = KeyedGroups::default();
    for row in rows {
        let key = row.project_owned(key_columns);
        if key.iter().any(Value::is_null) {
            out.null_keys.push(row);
        } else {
            out.groups.entry(key).or_default().push(row);
        }
    }
    out
}

/// Occurrence statistics of one candidate attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueTally {
    /// Candidate value
    pub value: Value,
    /// Number of rows carrying it
    pub count: usize,
    /// Most recent watermark among those rows
    pub last_seen: Option<NaiveDateTime>,
}

/// Orders tallies best-first: frequency, then recency, then value.
pub fn tally_order(a: &ValueTally, b: &ValueTally) -> Ordering {
    b.count
        .cmp(&a.count)
        .then_with(|| b.last_seen.cmp(&a.last_seen))
        .then_with(|| b.value.cmp(&a.value))
}

/// Counts non-null observations of an attribute.
pub fn tally<'a, I>(observations: I) -> Vec<ValueTally>
where
    I: IntoIterator<Item = (&'a Value, Option<NaiveDateTime>)>,
{
    let mut stats: BTreeMap<&Value, (usize, Option<NaiveDateTime>)> = BTreeMap::new();
    for (value, seen) in observations {
        if value.is_null() {
            continue;
        }
        let entry = stats.entry(value).or_insert((0, None));
        entry.0 += 1;
        entry.1 = entry.1.max(seen);
    }
    stats
        .into_iter()
        .map(|(value, (count, last_seen))| ValueTally {
            value: value.clone(),
            count,
            last_seen,
        })
        .collect()
}

/// Picks the representative value of an attribute (null if never observed).
pub fn most_common<'a, I>(observations: I) -> Value
where
    I: IntoIterator<Item = (&'a Value, Option<NaiveDateTime>)>,
{
    tally(observations)
        .into_iter()
        .min_by(tally_order)
        .map(|t| t.value)
        .unwrap_or(Value::Null)
}

/// Picks the representative value of `column` across a group of rows.
pub fn most_common_in(rows: &[&Row], column: &str) -> Value {
    most_common(rows.iter().map(|r| (r.get(column), r.source_loaded_at())))
}
