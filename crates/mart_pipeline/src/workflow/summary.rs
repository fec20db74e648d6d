//! Row counts and cross-layer reconciliation.

use mart_core::keys::SurrogateKey;
use mart_store::{TableName, TableStore};
use mart_transform::ModelCatalog;
use std::collections::HashSet;
use std::fmt;

use crate::error::PipelineError;

/// Row count of one stored table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCount {
    /// Table
    pub table: TableName,
    /// Rows stored
    pub rows: usize,
}

/// Staged events vs fact rows for one grain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationCheck {
    /// Check description
    pub name: String,
    /// Staged table
    pub source: TableName,
    /// Fact table
    pub target: TableName,
    /// Distinct events in the staged table
    pub source_count: usize,
    /// Rows in the fact table
    pub target_count: usize,
}

impl ReconciliationCheck {
    /// Returns `true` if every staged event has exactly one fact row.
    pub fn passed(&self) -> bool {
        self.source_count == self.target_count
    }
}

/// Row counts across all layers plus reconciliation checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarehouseSummary {
    /// Counts ordered by layer then name
    pub counts: Vec<TableCount>,
    /// One check per fact grain
    pub reconciliation: Vec<ReconciliationCheck>,
}

impl WarehouseSummary {
    /// Collects counts for every stored table and reconciles each fact with
    /// its staged source.
    ///
    /// # Errors
    ///
    /// `PipelineError::Store` if a table cannot be read.
    pub fn collect(store: &dyn TableStore, catalog: &ModelCatalog) -> Result<Self, PipelineError> {
        let mut counts = Vec::new();
        for table in store.list()? {
            let rows = store.read_or_empty(&table)?.len();
            counts.push(TableCount { table, rows });
        }

        let mut reconciliation = Vec::new();
        for fact in &catalog.facts {
            let staged = store.read_or_empty(&fact.source)?;
            let events: HashSet<SurrogateKey> = staged
                .rows
                .iter()
                .map(|r| SurrogateKey::generate(&r.project_owned(&fact.natural_key)))
                .collect();
            reconciliation.push(ReconciliationCheck {
                name: format!("{} events match {}", fact.source.table(), fact.name.table()),
                source: fact.source.clone(),
                target: fact.name.clone(),
                source_count: events.len(),
                target_count: store.read_or_empty(&fact.name)?.len(),
            });
        }

        Ok(Self {
            counts,
            reconciliation,
        })
    }

    /// Returns `true` if every reconciliation check passed.
    pub fn reconciled(&self) -> bool {
        self.reconciliation.iter().all(ReconciliationCheck::passed)
    }

    /// Count of one table, if stored.
    pub fn rows(&self, table: &TableName) -> Option<usize> {
        self.counts.iter().find(|c| &c.table == table).map(|c| c.rows)
    }
}

impl fmt::Display for WarehouseSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ROW COUNTS")?;
        for count in &self.counts {
            writeln!(
                f,
                "  [{:<9}] {:<45} {:>12} rows",
                count.table.layer().as_str(),
                count.table.to_string(),
                count.rows
            )?;
        }
        writeln!(f, "RECONCILIATION")?;
        for check in &self.reconciliation {
            writeln!(
                f,
                "  {} | {} | source={} target={}",
                if check.passed() { "PASS" } else { "FAIL" },
                check.name,
                check.source_count,
                check.target_count
            )?;
        }
        let status = if self.reconciled() {
            "ALL CHECKS PASSED"
        } else {
            "SOME CHECKS FAILED"
        };
        write!(f, "Reconciliation: {}", status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mart_core::Row;
    use mart_store::{MemoryStore, Table};
    use mart_transform::CatalogSettings;

    #[test]
    fn test_reconciliation_counts_distinct_events() {
        let store = MemoryStore::new();
        let catalog = ModelCatalog::standard(&CatalogSettings::default());
        let staged = Table::new(vec![
            Row::new().with("transaction_id", "t1"),
            Row::new().with("transaction_id", "t1"),
            Row::new().with("transaction_id", "t2"),
        ]);
        store.replace(&TableName::staging("stg_transactions"), staged).unwrap();
        store
            .replace(
                &TableName::marts("fact_transactions"),
                Table::new(vec![Row::new(), Row::new()]),
            )
            .unwrap();

        let summary = WarehouseSummary::collect(&store, &catalog).unwrap();
        let txns = &summary.reconciliation[0];
        assert_eq!((txns.source_count, txns.target_count), (2, 2));
        assert!(txns.passed());
        assert_eq!(summary.rows(&TableName::staging("stg_transactions")), Some(3));
        // Prices and rates: both sides empty.
        assert!(summary.reconciled());
        assert!(summary.to_string().contains("ALL CHECKS PASSED"));
    }

    #[test]
    fn test_missing_fact_rows_fail() {
        let check = ReconciliationCheck {
            name: "x".into(),
            source: TableName::staging("stg_market_prices"),
            target: TableName::marts("fact_daily_prices"),
            source_count: 3,
            target_count: 2,
        };
        assert!(!check.passed());
    }
}
