//! Transformation metrics.
//!
//! Recorded through the `metrics` facade; without an installed recorder every
//! call is a no-op. The `finmart` binary installs a Prometheus recorder. These
//! complement the structured `tracing` events emitted by each model.

use metrics::{counter, describe_counter, describe_histogram, histogram};

// ============================================================================
// Staging Metrics
// ============================================================================

/// Rows produced by staging models.
pub const STAGED_ROWS: &str = "finmart_staged_rows_total";

/// Values that could not be coerced during staging.
pub const COERCION_FAILURES: &str = "finmart_coercion_failures_total";

// ============================================================================
// Snapshot Metrics
// ============================================================================

/// SCD2 versions opened.
pub const SNAPSHOT_VERSIONS_OPENED: &str = "finmart_snapshot_versions_opened_total";

/// SCD2 versions closed (superseded or hard-deleted).
pub const SNAPSHOT_VERSIONS_CLOSED: &str = "finmart_snapshot_versions_closed_total";

// ============================================================================
// Fact Metrics
// ============================================================================

/// Staged rows selected past the watermark.
pub const FACT_ROWS_SELECTED: &str = "finmart_fact_rows_selected_total";

/// Fact rows written (inserted or replaced).
pub const FACT_ROWS_UPSERTED: &str = "finmart_fact_rows_upserted_total";

/// Foreign keys resolved to the default member.
pub const FACT_DEFAULT_KEY_SUBSTITUTIONS: &str = "finmart_fact_default_key_substitutions_total";

/// Fact merge duration.
pub const FACT_MERGE_DURATION: &str = "finmart_fact_merge_duration_seconds";

// ============================================================================
// Metric Registration
// ============================================================================

/// Registers all transformation metric descriptions.
///
/// Call this once at startup after installing a metrics recorder.
pub fn register_metrics() {
    describe_counter!(STAGED_ROWS, "Total rows produced by staging models");
    describe_counter!(COERCION_FAILURES, "Total staged values nulled by failed coercion");
    describe_counter!(SNAPSHOT_VERSIONS_OPENED, "Total SCD2 versions opened");
    describe_counter!(SNAPSHOT_VERSIONS_CLOSED, "Total SCD2 versions closed");
    describe_counter!(FACT_ROWS_SELECTED, "Total staged rows selected past the fact watermark");
    describe_counter!(FACT_ROWS_UPSERTED, "Total fact rows inserted or replaced");
    describe_counter!(
        FACT_DEFAULT_KEY_SUBSTITUTIONS,
        "Total foreign keys resolved to the default dimension member"
    );
    describe_histogram!(FACT_MERGE_DURATION, "Duration of fact merges in seconds");
}

// ============================================================================
// Recording
// ============================================================================

/// Records a staging run.
pub fn record_staging(model: &str, rows: usize, coercion_failures: usize) {
    counter!(STAGED_ROWS, "model" => model.to_string()).increment(rows as u64);
    if coercion_failures > 0 {
        counter!(COERCION_FAILURES, "model" => model.to_string())
            .increment(coercion_failures as u64);
    }
}

/// Records a snapshot run.
pub fn record_snapshot(snapshot: &str, opened: usize, closed: usize) {
    let labels = [("snapshot", snapshot.to_string())];
    counter!(SNAPSHOT_VERSIONS_OPENED, &labels).increment(opened as u64);
    counter!(SNAPSHOT_VERSIONS_CLOSED, &labels).increment(closed as u64);
}

/// Records a fact merge.
pub fn record_fact_merge(fact: &str, selected: usize, upserted: usize, duration_secs: f64) {
    let labels = [("fact", fact.to_string())];
    counter!(FACT_ROWS_SELECTED, &labels).increment(selected as u64);
    counter!(FACT_ROWS_UPSERTED, &labels).increment(upserted as u64);
    histogram!(FACT_MERGE_DURATION, &labels).record(duration_secs);
}

/// Records default-key substitutions for one (fact, dimension) pair.
pub fn record_default_substitutions(fact: &str, dimension: &str, count: usize) {
    if count == 0 {
        return;
    }
    counter!(
        FACT_DEFAULT_KEY_SUBSTITUTIONS,
        "fact" => fact.to_string(),
        "dimension" => dimension.to_string()
    )
    .increment(count as u64);
}
