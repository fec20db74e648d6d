//! Row-level data-quality issues.
//!
//! Row-level defects never abort a batch: the offending field is nulled (or
//! the row excluded from the component that cannot use it) and an issue is
//! recorded here. Structural defects are errors, not issues.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Category of a row-level issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    /// A raw value could not be coerced to its staged type.
    CoercionFailure,
    /// A row carries a null natural key and cannot be tracked or joined.
    NullNaturalKey,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::CoercionFailure => write!(f, "CoercionFailure"),
            IssueKind::NullNaturalKey => write!(f, "NullNaturalKey"),
        }
    }
}

/// One row-level defect with enough context to find the source row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQualityIssue {
    /// Issue category
    pub kind: IssueKind,
    /// Table the row came from
    pub table: String,
    /// Zero-based row ordinal within that table
    pub row: Option<usize>,
    /// Natural key of the row, when it could be determined
    pub natural_key: Option<String>,
    /// Offending column
    pub column: Option<String>,
    /// Free-form detail (e.g. the raw text that failed to parse)
    pub detail: String,
}

impl DataQualityIssue {
    /// A coercion failure for `column` of row `row` in `table`.
    pub fn coercion(
        table: impl Into<String>,
        row: usize,
        natural_key: Option<String>,
        column: impl Into<String>,
        raw: &str,
        expected: &str,
    ) -> Self {
        Self {
            kind: IssueKind::CoercionFailure,
            table: table.into(),
            row: Some(row),
            natural_key,
            column: Some(column.into()),
            detail: format!("cannot coerce {:?} to {}", raw, expected),
        }
    }

    /// A row excluded because its natural key is null.
    pub fn null_natural_key(table: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::NullNaturalKey,
            table: table.into(),
            row: None,
            natural_key: None,
            column: None,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for DataQualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.table)?;
        if let Some(row) = self.row {
            write!(f, " row {}", row)?;
        }
        if let Some(key) = &self.natural_key {
            write!(f, " key {}", key)?;
        }
        if let Some(column) = &self.column {
            write!(f, " column {}", column)?;
        }
        write!(f, ": {}", self.detail)
    }
}

/// Accumulated issues of one component run (or of a whole pipeline run).
///
/// # Examples
///
/// ```
/// use mart_core::quality::{DataQualityIssue, IssueKind, QualityReport};
///
/// let mut report = QualityReport::default();
/// report.push(DataQualityIssue::coercion(
///     "raw.daily_prices", 3, Some("AAPL".into()), "close", "n/a", "decimal",
/// ));
/// assert_eq!(report.count(IssueKind::CoercionFailure), 1);
/// assert_eq!(report.count(IssueKind::NullNaturalKey), 0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    issues: Vec<DataQualityIssue>,
}

impl QualityReport {
    /// Records one issue.
    pub fn push(&mut self, issue: DataQualityIssue) {
        self.issues.push(issue);
    }

    /// Appends every issue of another report.
    pub fn merge(&mut self, other: QualityReport) {
        self.issues.extend(other.issues);
    }

    /// All recorded issues in insertion order.
    pub fn issues(&self) -> &[DataQualityIssue] {
        &self.issues
    }

    /// Total number of issues.
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Number of issues of one kind.
    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    /// Issue counts keyed by (table, kind).
    pub fn counts_by_table(&self) -> BTreeMap<(String, IssueKind), usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry((issue.table.clone(), issue.kind)).or_insert(0) += 1;
        }
        counts
    }

    /// One line per (table, kind) pair, for logs and run summaries.
    pub fn summary(&self) -> Vec<String> {
        self.counts_by_table()
            .into_iter()
            .map(|((table, kind), n)| format!("{}: {} x {}", table, n, kind))
            .collect()
    }
}

impl Extend<DataQualityIssue> for QualityReport {
    fn extend<I: IntoIterator<Item = DataQualityIssue>>(&mut self, iter: I) {
        self.issues.extend(iter);
    }
}
