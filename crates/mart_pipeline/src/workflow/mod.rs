//! Pipeline workflow definitions.
//!
//! Provides the ordered pipeline run and its reporting types:
//! - [`Pipeline`]: the individual steps and the full run
//! - [`WarehouseSummary`]: row counts and reconciliation checks

mod pipeline;
mod summary;

pub use pipeline::{DimensionReport, FactsReport, GrainReport, Pipeline, StageReport};
pub use summary::{ReconciliationCheck, TableCount, WarehouseSummary};

use mart_core::QualityReport;
use mart_transform::AssertionResult;
use std::sync::Arc;

/// Pipeline processing step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    /// Normalising raw tables
    Staging,
    /// Capturing history snapshots
    Snapshots,
    /// Rebuilding dimensions
    Dimensions,
    /// Merging fact grains
    Facts,
    /// Running validation assertions
    Assertions,
    /// Reconciling row counts
    Reconciliation,
    /// Run completed
    Completed,
}

impl PipelineStep {
    /// Get the step name for display
    pub fn name(&self) -> &'static str {
        match self {
            Self::Staging => "Staging",
            Self::Snapshots => "Snapshots",
            Self::Dimensions => "Dimensions",
            Self::Facts => "Facts",
            Self::Assertions => "Assertions",
            Self::Reconciliation => "Reconciliation",
            Self::Completed => "Completed",
        }
    }
}

/// Progress callback type for reporting pipeline progress
pub type ProgressCallback = Arc<dyn Fn(PipelineStep, f64) + Send + Sync>;

/// Pipeline run result
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Whether every step completed and every assertion passed
    pub success: bool,
    /// Execution duration in milliseconds
    pub duration_ms: u64,
    /// Row-level data-quality issues from staging and snapshots
    pub quality: QualityReport,
    /// Per-grain fact results
    pub facts: Vec<GrainReport>,
    /// Assertion results (empty if the run stopped before assertions)
    pub assertions: Vec<AssertionResult>,
    /// Row counts and reconciliation (absent if the run stopped early)
    pub summary: Option<WarehouseSummary>,
    /// Failures that marked the run unsuccessful
    pub errors: Vec<String>,
}

impl RunReport {
    /// Assertions that found violating rows.
    pub fn failed_assertions(&self) -> impl Iterator<Item = &AssertionResult> {
        self.assertions.iter().filter(|a| !a.passed())
    }

    /// Add an error to the report
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self.success = false;
        self
    }
}
