//! Qualified table names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// Storage layer (schema) a table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Layer {
    /// Immutable extracted records
    Raw,
    /// Normalised source rows
    Staging,
    /// SCD2 history tables
    Snapshots,
    /// Dimensions and facts
    Marts,
}

impl Layer {
    /// All layers in pipeline order.
    pub const ALL: [Layer; 4] = [Layer::Raw, Layer::Staging, Layer::Snapshots, Layer::Marts];

    /// Schema prefix of the layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Raw => "raw",
            Layer::Staging => "staging",
            Layer::Snapshots => "snapshots",
            Layer::Marts => "marts",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Layer {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(Layer::Raw),
            "staging" => Ok(Layer::Staging),
            "snapshots" => Ok(Layer::Snapshots),
            "marts" => Ok(Layer::Marts),
            other => Err(StoreError::InvalidName(format!("unknown layer '{}'", other))),
        }
    }
}

/// A `layer.table` name.
///
/// # Examples
///
/// ```
/// use mart_store::{Layer, TableName};
///
/// let name: TableName = "marts.dim_merchants".parse().unwrap();
/// assert_eq!(name.layer(), Layer::Marts);
/// assert_eq!(name.table(), "dim_merchants");
/// assert_eq!(name, TableName::marts("dim_merchants"));
/// assert!("dim_merchants".parse::<TableName>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableName {
    layer: Layer,
    table: String,
}

impl TableName {
    /// Creates a name in the given layer.
    pub fn new(layer: Layer, table: impl Into<String>) -> Self {
        Self {
            layer,
            table: table.into(),
        }
    }

    /// A `raw.*` table.
    pub fn raw(table: impl Into<String>) -> Self {
        Self::new(Layer::Raw, table)
    }

    /// A `staging.*` table.
    pub fn staging(table: impl Into<String>) -> Self {
        Self::new(Layer::Staging, table)
    }

    /// A `snapshots.*` table.
    pub fn snapshots(table: impl Into<String>) -> Self {
        Self::new(Layer::Snapshots, table)
    }

    /// A `marts.*` table.
    pub fn marts(table: impl Into<String>) -> Self {
        Self::new(Layer::Marts, table)
    }

    /// The layer.
    pub fn layer(&self) -> Layer {
        self.layer
    }

    /// The unqualified table name.
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.layer, self.table)
    }
}

impl FromStr for TableName {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (layer, table) = s
            .split_once('.')
            .ok_or_else(|| StoreError::InvalidName(format!("'{}' is not layer.table", s)))?;
        let valid = !table.is_empty()
            && table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(StoreError::InvalidName(format!("invalid table name '{}'", table)));
        }
        Ok(Self::new(layer.parse()?, table))
    }
}
