//! The storage seam every pipeline component writes through.

use crate::error::StoreError;
use crate::name::{Layer, TableName};
use crate::table::Table;

/// A store of named tables.
///
/// Writes are whole-table replaces: a reader sees either the previous or the
/// new version of a table, never a partial one. Implementations must be
/// shareable across the threads that merge independent fact grains.
pub trait TableStore: Send + Sync {
    /// Reads a table, `None` if it has never been written.
    fn read(&self, name: &TableName) -> Result<Option<Table>, StoreError>;

    /// Atomically replaces (or creates) a table.
    fn replace(&self, name: &TableName, table: Table) -> Result<(), StoreError>;

    /// Lists every stored table, ordered by layer then name.
    fn list(&self) -> Result<Vec<TableName>, StoreError>;

    /// Reads a table that must exist.
    fn read_required(&self, name: &TableName) -> Result<Table, StoreError> {
        self.read(name)?
            .ok_or_else(|| StoreError::NotFound(name.clone()))
    }

    /// Reads a table, treating a missing one as empty.
    fn read_or_empty(&self, name: &TableName) -> Result<Table, StoreError> {
        Ok(self.read(name)?.unwrap_or_default())
    }

    /// Returns `true` if the table has been written.
    fn exists(&self, name: &TableName) -> Result<bool, StoreError> {
        Ok(self.read(name)?.is_some())
    }

    /// Lists the tables of one layer.
    fn list_layer(&self, layer: Layer) -> Result<Vec<TableName>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|n| n.layer() == layer)
            .collect())
    }
}

impl<S: TableStore + ?Sized> TableStore for &S {
    fn read(&self, name: &TableName) -> Result<Option<Table>, StoreError> {
        (**self).read(name)
    }

    fn replace(&self, name: &TableName, table: Table) -> Result<(), StoreError> {
        (**self).replace(name, table)
    }

    fn list(&self) -> Result<Vec<TableName>, StoreError> {
        (**self).list()
    }
}

impl<S: TableStore + ?Sized> TableStore for Box<S> {
    fn read(&self, name: &TableName) -> Result<Option<Table>, StoreError> {
        (**self).read(name)
    }

    fn replace(&self, name: &TableName, table: Table) -> Result<(), StoreError> {
        (**self).replace(name, table)
    }

    fn list(&self) -> Result<Vec<TableName>, StoreError> {
        (**self).list()
    }
}
