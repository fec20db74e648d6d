//! In-process table store.

use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;
use crate::name::TableName;
use crate::store::TableStore;
use crate::table::Table;

/// Tables held in memory under a single `RwLock`.
///
/// Used by tests and by one-shot pipeline runs that do not persist.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<BTreeMap<TableName, Table>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TableStore for MemoryStore {
    fn read(&self, name: &TableName) -> Result<Option<Table>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.get(name).cloned())
    }

    fn replace(&self, name: &TableName, table: Table) -> Result<(), StoreError> {
        let rows = table.len();
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        tables.insert(name.clone(), table);
        debug!(table = %name, rows, "Table replaced");
        Ok(())
    }

    fn list(&self) -> Result<Vec<TableName>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.keys().cloned().collect())
    }
}
