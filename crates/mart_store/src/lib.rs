//! # mart_store: Storage Layer for finmart
//!
//! ## Layer Role
//!
//! mart_store holds every table the pipeline reads and writes:
//! - Qualified names in four layers: `raw`, `staging`, `snapshots`, `marts`
//! - [`Table`]: rows plus [`TableMetadata`] (refresh time, source watermark)
//! - [`TableStore`]: the read / atomic-replace seam
//! - [`MemoryStore`]: `RwLock`-guarded in-process store
//! - [`FileStore`]: JSON files with write-to-temp + rename
//!
//! ## Usage Examples
//!
//! ```rust
//! use mart_core::Row;
//! use mart_store::{MemoryStore, Table, TableName, TableStore};
//!
//! let store = MemoryStore::new();
//! let name = TableName::marts("dim_currencies");
//! store.replace(&name, Table::new(vec![Row::new().with("currency_code", "EUR")])).unwrap();
//! assert_eq!(store.read_required(&name).unwrap().len(), 1);
//! ```

#![deny(missing_docs)]

pub mod error;
pub mod file;
pub mod memory;
pub mod name;
pub mod store;
pub mod table;

pub use error::StoreError;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use name::{Layer, TableName};
pub use store::TableStore;
pub use table::{Table, TableMetadata};
