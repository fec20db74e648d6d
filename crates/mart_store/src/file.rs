//! Directory-backed table store.
//!
//! Layout: `<root>/<layer>/<table>.json`. Each write goes to a sibling
//! temporary file which is then renamed over the target, so readers never
//! observe a half-written table.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::name::{Layer, TableName};
use crate::store::TableStore;
use crate::table::Table;

const EXTENSION: &str = "json";
const TEMP_SUFFIX: &str = ".tmp";

/// Table store rooted at a warehouse directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens (creating if needed) a warehouse directory.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the directory cannot be created.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        info!(root = %root.display(), "Opened warehouse directory");
        Ok(Self { root })
    }

    /// Warehouse root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a table's file.
    pub fn path_of(&self, name: &TableName) -> PathBuf {
        self.root
            .join(name.layer().as_str())
            .join(format!("{}.{}", name.table(), EXTENSION))
    }
}

impl TableStore for FileStore {
    fn read(&self, name: &TableName) -> Result<Option<Table>, StoreError> {
        let path = self.path_of(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        let table = serde_json::from_slice(&bytes).map_err(|source| StoreError::Serialisation {
            table: name.clone(),
            source,
        })?;
        Ok(Some(table))
    }

    fn replace(&self, name: &TableName, table: Table) -> Result<(), StoreError> {
        let path = self.path_of(name);
        let dir = path.parent().unwrap_or(&self.root).to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let bytes = serde_json::to_vec(&table).map_err(|source| StoreError::Serialisation {
            table: name.clone(),
            source,
        })?;

        let mut tmp = path.clone().into_os_string();
        tmp.push(TEMP_SUFFIX);
        let tmp = PathBuf::from(tmp);
        {
            let mut file = fs::File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
            file.write_all(&bytes).map_err(|e| StoreError::io(&tmp, e))?;
            file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
        }
        fs::rename(&tmp, &path).map_err(|e| StoreError::io(&path, e))?;

        debug!(
            table = %name,
            rows = table.len(),
            size = bytes.len(),
            path = %path.display(),
            "Table written"
        );
        Ok(())
    }

    fn list(&self) -> Result<Vec<TableName>, StoreError> {
        let mut names = Vec::new();
        for layer in Layer::ALL {
            let dir = self.root.join(layer.as_str());
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::io(&dir, e)),
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(TableName::new(layer, stem));
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
