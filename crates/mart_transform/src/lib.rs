//! # mart_transform: Warehouse Models
//!
//! Turns raw tables into staged rows, history tables, dimensions, and fact
//! tables.
//!
//! This crate provides:
//! - Staging normalizers with row-level coercion reporting
//! - A model catalog describing every dimension, snapshot, and fact
//! - Dimension builder (most-common attribute, default member) and calendar
//! - SCD2 history tracker with hard-delete handling
//! - Incremental fact merger with watermark and freshness guards
//! - Validation assertions returning violating rows
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          mart_transform                 │
//! ├─────────────────────────────────────────┤
//! │  staging/    - raw → staged rows        │
//! │  history     - SCD2 snapshots           │
//! │  dimension   - dedup + default member   │
//! │  calendar    - generated date dimension │
//! │  fact        - incremental upsert       │
//! │  measures    - derived fact columns     │
//! │  assertions  - invariant checks         │
//! └─────────────────────────────────────────┘
//!          ↓
//! ┌──────────────────┐ ┌────────────────────┐
//! │    mart_store    │ │     mart_core      │
//! │  tables, names   │ │ rows, keys, dedup  │
//! └──────────────────┘ └────────────────────┘
//! ```
//!
//! Every model is a pure function from input tables to an output table;
//! reading and writing the store is left to the caller.
//!
//! ## Example
//!
//! ```
//! use mart_transform::catalog::{CatalogSettings, ModelCatalog};
//! use mart_transform::dimension::build_dimension;
//! use mart_core::Row;
//! use mart_core::types::SOURCE_LOADED_AT;
//! use mart_store::Table;
//! use chrono::NaiveDate;
//!
//! let catalog = ModelCatalog::standard(&CatalogSettings::default());
//! catalog.validate().unwrap();
//!
//! let loaded = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
//! let staged = Table::new(vec![Row::new()
//!     .with("merchant_name", "Acme")
//!     .with("category", "grocery_pos")
//!     .with(SOURCE_LOADED_AT, loaded)]);
//!
//! let merchants = catalog.dimensions.iter().find(|d| d.name.table() == "dim_merchants").unwrap();
//! let out = build_dimension(merchants, &[&staged]).unwrap();
//! assert_eq!(out.table.len(), 2); // Acme + default member
//! ```

#![deny(missing_docs)]

pub mod assertions;
pub mod calendar;
pub mod catalog;
pub mod dimension;
pub mod error;
pub mod fact;
pub mod history;
pub mod measures;
pub mod metrics;
pub mod staging;

pub use assertions::{run_assertions, AssertionResult};
pub use calendar::build_calendar;
pub use catalog::{CatalogSettings, DimensionSpec, FactSpec, ModelCatalog, SnapshotSpec};
pub use dimension::{build_dimension, DimensionOutput};
pub use error::TransformError;
pub use fact::{merge_facts, FactInputs, MergeMode, MergeOutcome};
pub use history::{capture_snapshot, run_timestamp, SnapshotOutcome};
pub use staging::{stage, StagingModel, StagingOptions, StagingOutput};
