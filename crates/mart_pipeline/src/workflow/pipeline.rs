//! The ordered pipeline.
//!
//! A full run executes, in order:
//! 0. stage every raw source
//! 1. capture history snapshots
//! 2. rebuild every dimension
//! 3. merge every fact grain (in parallel)
//! 4. run validation assertions
//! 5. reconcile row counts
//!
//! A failure in steps 0-2 aborts the run. A failing grain in step 3 does not
//! stop the other grains, but the run is reported as failed and steps 4-5
//! are skipped.

use chrono::{NaiveDateTime, Utc};
use mart_core::QualityReport;
use mart_store::{StoreError, Table, TableName, TableStore};
use mart_transform::{
    build_calendar, build_dimension, capture_snapshot, merge_facts, run_assertions, run_timestamp, stage,
    AssertionResult, FactInputs, FactSpec, MergeMode, ModelCatalog, SnapshotOutcome, StagingOptions,
    TransformError,
};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{error, info, warn};

use super::{PipelineStep, ProgressCallback, RunReport, WarehouseSummary};
use crate::config::PipelineConfig;
use crate::error::PipelineError;

/// Result of the staging step.
#[derive(Debug, Clone, Default)]
pub struct StageReport {
    /// Staged tables with their row counts
    pub tables: Vec<(TableName, usize)>,
    /// Coercion failures
    pub quality: QualityReport,
}

/// Result of one dimension rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionReport {
    /// Dimension table
    pub dimension: TableName,
    /// Members, default row excluded
    pub members: usize,
    /// Input rows dropped for a null natural key
    pub excluded_null_keys: usize,
    /// Event dates past the calendar horizon
    pub beyond_horizon: usize,
}

/// Result of one fact grain merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrainReport {
    /// Fact table
    pub fact: TableName,
    /// Staged rows past the watermark
    pub selected: usize,
    /// New fact rows
    pub inserted: usize,
    /// Replaced fact rows
    pub updated: usize,
    /// Stored rows whose windowed measures were recomputed
    pub restated: usize,
    /// Default-member substitutions per foreign key
    pub substitutions: BTreeMap<String, usize>,
    /// Watermark after the merge
    pub watermark: Option<NaiveDateTime>,
}

/// Result of the facts step.
#[derive(Debug, Default)]
pub struct FactsReport {
    /// Grains merged successfully
    pub grains: Vec<GrainReport>,
    /// Grains that failed
    pub failures: Vec<(TableName, PipelineError)>,
}

impl FactsReport {
    /// Converts grain failures into a single error.
    ///
    /// # Errors
    ///
    /// `PipelineError::GrainsFailed` if any grain failed.
    pub fn into_result(self) -> Result<Vec<GrainReport>, PipelineError> {
        if self.failures.is_empty() {
            Ok(self.grains)
        } else {
            Err(PipelineError::GrainsFailed {
                failed: self.failures.len(),
                grains: self.failures.iter().map(|(f, _)| f.table().to_string()).collect(),
            })
        }
    }
}

/// The warehouse pipeline over one table store.
pub struct Pipeline<S: TableStore> {
    store: S,
    catalog: ModelCatalog,
    options: StagingOptions,
}

impl<S: TableStore> Pipeline<S> {
    /// Creates a pipeline after validating the catalog.
    ///
    /// # Errors
    ///
    /// `TransformError::InvalidModel` if the catalog references do not
    /// resolve.
    pub fn new(store: S, catalog: ModelCatalog, options: StagingOptions) -> Result<Self, PipelineError> {
        catalog.validate()?;
        mart_transform::metrics::register_metrics();
        Ok(Self {
            store,
            catalog,
            options,
        })
    }

    /// Creates a pipeline with the standard models configured by `config`.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::new`].
    pub fn from_config(store: S, config: &PipelineConfig) -> Result<Self, PipelineError> {
        Self::new(
            store,
            ModelCatalog::standard(&config.catalog_settings()),
            config.staging_options(),
        )
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The model catalog.
    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    fn read_required(&self, name: &TableName) -> Result<Table, PipelineError> {
        self.store.read_required(name).map_err(|e| match e {
            StoreError::NotFound(name) => TransformError::MissingSource(name).into(),
            other => other.into(),
        })
    }

    fn write(&self, name: &TableName, mut table: Table, now: NaiveDateTime) -> Result<(), PipelineError> {
        table.meta.refreshed_at = Some(now);
        self.store.replace(name, table)?;
        Ok(())
    }

    /// Rebuilds every staging model from its raw table.
    ///
    /// # Errors
    ///
    /// - `TransformError::MissingSource` if a raw table was never ingested
    /// - `TransformError::MissingLoadTimestamp` if a raw row lacks `_loaded_at`
    pub fn stage(&self) -> Result<StageReport, PipelineError> {
        let now = Utc::now().naive_utc();
        let mut report = StageReport::default();
        for model in &self.catalog.staging {
            let raw = self.read_required(&model.source())?;
            let previous = self
                .store
                .read(&model.target())?
                .and_then(|t| t.meta.source_watermark);
            let out = stage(*model, &raw, previous, &self.options)?;
            report.tables.push((model.target(), out.table.len()));
            report.quality.merge(out.issues);
            self.write(&model.target(), out.table, now)?;
        }
        Ok(report)
    }

    /// Captures every history snapshot.
    ///
    /// `as_of` overrides the run's logical timestamp.
    ///
    /// # Errors
    ///
    /// - `TransformError::MissingSource` if a staged table is missing
    /// - `TransformError::NonMonotonicRunTime` (nothing written for that
    ///   snapshot)
    pub fn snapshot(&self, as_of: Option<NaiveDateTime>) -> Result<Vec<SnapshotOutcome>, PipelineError> {
        let now = Utc::now().naive_utc();
        let mut outcomes = Vec::with_capacity(self.catalog.snapshots.len());
        for spec in &self.catalog.snapshots {
            let staged = self.read_required(&spec.source)?;
            let history = self.store.read_or_empty(&spec.name)?;
            let run_at = run_timestamp(&staged, as_of, now);
            let mut outcome = capture_snapshot(spec, &staged, &history, run_at)?;
            let table = std::mem::take(&mut outcome.table);
            self.store.replace(&spec.name, table)?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Rebuilds every dimension, calendar included.
    ///
    /// # Errors
    ///
    /// `TransformError::MissingSource` if a staged input is missing.
    pub fn build_dimensions(&self) -> Result<Vec<DimensionReport>, PipelineError> {
        let now = Utc::now().naive_utc();
        let mut reports = Vec::new();

        for spec in &self.catalog.dimensions {
            let inputs = spec
                .sources
                .iter()
                .map(|s| self.read_required(&s.table))
                .collect::<Result<Vec<_>, _>>()?;
            let refs: Vec<&Table> = inputs.iter().collect();
            let out = build_dimension(spec, &refs)?;
            reports.push(DimensionReport {
                dimension: spec.name.clone(),
                members: out.members,
                excluded_null_keys: out.excluded_null_keys,
                beyond_horizon: 0,
            });
            self.write(&spec.name, out.table, now)?;
        }

        let calendar = &self.catalog.calendar;
        let inputs = calendar
            .sources
            .iter()
            .map(|(t, _)| self.read_required(t))
            .collect::<Result<Vec<_>, _>>()?;
        let refs: Vec<&Table> = inputs.iter().collect();
        let out = build_calendar(calendar, &refs)?;
        reports.push(DimensionReport {
            dimension: calendar.name.clone(),
            members: out.members,
            excluded_null_keys: 0,
            beyond_horizon: out.beyond_horizon,
        });
        self.write(&calendar.name, out.table, now)?;

        Ok(reports)
    }

    fn merge_grain(
        &self,
        spec: &FactSpec,
        dimensions: &BTreeMap<TableName, Table>,
        mode: MergeMode,
        now: NaiveDateTime,
    ) -> Result<GrainReport, PipelineError> {
        let staged = self.read_required(&spec.source)?;
        let existing = self.store.read(&spec.name)?;
        let stored = existing.clone().unwrap_or_default();
        let same_source = self.catalog.dimensions_reading(&spec.source);

        let outcome = merge_facts(
            spec,
            FactInputs {
                staged: &staged,
                existing: &stored,
                dimensions,
                same_source: &same_source,
            },
            mode,
        )?;

        match outcome.table {
            Some(table) => self.write(&spec.name, table, now)?,
            // First run over an empty source still publishes the table.
            None if existing.is_none() => self.write(&spec.name, stored, now)?,
            None => {}
        }

        Ok(GrainReport {
            fact: spec.name.clone(),
            selected: outcome.selected,
            inserted: outcome.inserted,
            updated: outcome.updated,
            restated: outcome.restated,
            substitutions: outcome.substitutions,
            watermark: outcome.watermark_after,
        })
    }

    /// Merges one grain (`Some(name)`) or all grains in parallel.
    ///
    /// Grain failures are collected in the report; other grains still
    /// complete.
    ///
    /// # Errors
    ///
    /// - `TransformError::UnknownModel` for an unknown grain name
    /// - `TransformError::MissingSource` if a dimension was never built
    pub fn merge_facts(&self, grain: Option<&str>, mode: MergeMode) -> Result<FactsReport, PipelineError> {
        let now = Utc::now().naive_utc();
        let specs: Vec<&FactSpec> = match grain {
            Some(name) => vec![self.catalog.fact(name)?],
            None => self.catalog.facts.iter().collect(),
        };

        let mut dimensions = BTreeMap::new();
        for name in self.catalog.dimension_names() {
            let table = self.read_required(&name)?;
            dimensions.insert(name, table);
        }

        let results: Vec<(TableName, Result<GrainReport, PipelineError>)> = specs
            .par_iter()
            .map(|spec| (spec.name.clone(), self.merge_grain(spec, &dimensions, mode, now)))
            .collect();

        let mut report = FactsReport::default();
        for (fact, result) in results {
            match result {
                Ok(grain) => report.grains.push(grain),
                Err(e) => {
                    error!(fact = %fact, error = %e, "Fact grain failed");
                    report.failures.push((fact, e));
                }
            }
        }
        Ok(report)
    }

    /// Runs every validation assertion.
    ///
    /// # Errors
    ///
    /// `TransformError::MissingSource` if a model has never been built.
    pub fn test(&self) -> Result<Vec<AssertionResult>, PipelineError> {
        Ok(run_assertions(&self.catalog, &self.store)?)
    }

    /// Row counts and reconciliation.
    ///
    /// # Errors
    ///
    /// `PipelineError::Store` if a table cannot be read.
    pub fn summary(&self) -> Result<WarehouseSummary, PipelineError> {
        WarehouseSummary::collect(&self.store, &self.catalog)
    }

    /// Executes the full ordered pipeline.
    ///
    /// # Errors
    ///
    /// Any error from staging, snapshots, or dimensions. Fact grain failures
    /// are reported in the returned [`RunReport`] instead.
    pub fn run(
        &self,
        mode: MergeMode,
        as_of: Option<NaiveDateTime>,
        progress: Option<ProgressCallback>,
    ) -> Result<RunReport, PipelineError> {
        let start = Instant::now();
        let report_progress = |step: PipelineStep, pct: f64| {
            if let Some(cb) = &progress {
                cb(step, pct);
            }
        };
        let mut report = RunReport::default();

        info!(mode = ?mode, "Starting pipeline run");

        report_progress(PipelineStep::Staging, 0.0);
        let staged = self.stage()?;
        report.quality.merge(staged.quality);
        report_progress(PipelineStep::Staging, 1.0);

        report_progress(PipelineStep::Snapshots, 0.0);
        for outcome in self.snapshot(as_of)? {
            report.quality.merge(outcome.issues);
        }
        report_progress(PipelineStep::Snapshots, 1.0);

        report_progress(PipelineStep::Dimensions, 0.0);
        let dimensions = self.build_dimensions()?;
        info!(dimensions = dimensions.len(), "Dimensions rebuilt");
        report_progress(PipelineStep::Dimensions, 1.0);

        report_progress(PipelineStep::Facts, 0.0);
        let facts = self.merge_facts(None, mode)?;
        report.facts = facts.grains;
        report_progress(PipelineStep::Facts, 1.0);

        if !facts.failures.is_empty() {
            for (fact, e) in &facts.failures {
                report.errors.push(format!("{}: {}", fact, e));
            }
            report.duration_ms = start.elapsed().as_millis() as u64;
            warn!(failed = facts.failures.len(), "Pipeline stopped after fact failures");
            return Ok(report);
        }

        report_progress(PipelineStep::Assertions, 0.0);
        report.assertions = self.test()?;
        let failed: Vec<String> = report
            .failed_assertions()
            .map(|a| format!("assertion {} failed on {} ({} rows)", a.name, a.table, a.failures.len()))
            .collect();
        report.errors.extend(failed);
        report_progress(PipelineStep::Assertions, 1.0);

        report_progress(PipelineStep::Reconciliation, 0.0);
        let summary = self.summary()?;
        if !summary.reconciled() {
            warn!("Row-count reconciliation found mismatches");
        }
        report.summary = Some(summary);
        report_progress(PipelineStep::Reconciliation, 1.0);

        report_progress(PipelineStep::Completed, 1.0);
        report.success = report.errors.is_empty();
        report.duration_ms = start.elapsed().as_millis() as u64;

        for line in report.quality.summary() {
            warn!(issues = %line, "Data quality");
        }
        info!(
            success = report.success,
            duration_ms = report.duration_ms,
            quality_issues = report.quality.len(),
            "Pipeline run finished"
        );
        Ok(report)
    }
}
