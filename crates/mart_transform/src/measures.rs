//! Derived fact measures.
//!
//! Row-level measures (difference, ratio, reciprocal) read the row itself.
//! Windowed measures (delta, percent change) read the previous observation
//! of the same partition ordered by a temporal column; the first observation
//! of a partition yields null. All arithmetic is null-propagating.

use mart_core::math::{percent_change, reciprocal, round_scale, safe_divide, safe_subtract};
use mart_core::{Row, Value};
use rust_decimal::Decimal;

use crate::catalog::{DerivedMeasure, MeasureKind};

/// Column used to break ordering ties inside a partition.
pub const FACT_KEY: &str = "fact_key";

fn row_level(kind: &MeasureKind, row: &Row) -> Option<Decimal> {
    match kind {
        MeasureKind::Difference { left, right } => safe_subtract(row.decimal(left), row.decimal(right)),
        MeasureKind::Ratio {
            numerator,
            denominator,
        } => safe_divide(row.decimal(numerator), row.decimal(denominator)),
        MeasureKind::Reciprocal { column } => reciprocal(row.decimal(column)),
        MeasureKind::Delta { .. } | MeasureKind::PercentChange { .. } => None,
    }
}

fn rescale(value: Option<Decimal>, scale: Option<u32>) -> Option<Decimal> {
    match scale {
        Some(scale) => round_scale(value, scale),
        None => value,
    }
}

fn windowed(kind: &MeasureKind, current: Option<Decimal>, previous: Option<Decimal>) -> Option<Decimal> {
    match kind {
        MeasureKind::Delta { .. } => safe_subtract(current, previous),
        MeasureKind::PercentChange { .. } => percent_change(current, previous),
        _ => None,
    }
}

/// Computes every measure for `targets`.
///
/// `context` holds already-stored rows of the same table; they supply previous
/// observations for windowed measures but are never modified.
pub fn apply_measures(measures: &[DerivedMeasure], targets: &mut [Row], context: &[&Row]) {
    for measure in measures {
        match &measure.kind {
            MeasureKind::Delta {
                column,
                partition,
                order_by,
            }
            | MeasureKind::PercentChange {
                column,
                partition,
                order_by,
            } => apply_window(measure, column, partition, order_by, targets, context),
            kind => {
                for row in targets.iter_mut() {
                    let value = rescale(row_level(kind, row), measure.scale);
                    row.set(measure.name.as_str(), value);
                }
            }
        }
    }
}

struct Observation {
    partition: Vec<Value>,
    order: Value,
    tie: Value,
    value: Option<Decimal>,
    target: Option<usize>,
}

fn apply_window(
    measure: &DerivedMeasure,
    column: &str,
    partition: &[String],
    order_by: &str,
    targets: &mut [Row],
    context: &[&Row],
) {
    let observe = |row: &Row, target: Option<usize>| Observation {
        partition: row.project_owned(partition),
        order: row.get(order_by).clone(),
        tie: row.get(FACT_KEY).clone(),
        value: row.decimal(column),
        target,
    };

    let mut observations: Vec<Observation> = context
        .iter()
        .map(|r| observe(*r, None))
        .chain(targets.iter().enumerate().map(|(i, r)| observe(r, Some(i))))
        .collect();
    observations.sort_by(|a, b| {
        a.partition
            .cmp(&b.partition)
            .then_with(|| a.order.cmp(&b.order))
            .then_with(|| a.tie.cmp(&b.tie))
    });

    let mut previous: Option<&Observation> = None;
    let mut results = Vec::new();
    for obs in &observations {
        let prev_value = previous
            .filter(|p| p.partition == obs.partition)
            .and_then(|p| p.value);
        let first_in_partition = previous.map_or(true, |p| p.partition != obs.partition);
        if let Some(i) = obs.target {
            let value = if first_in_partition {
                None
            } else {
                windowed(&measure.kind, obs.value, prev_value)
            };
            results.push((i, value));
        }
        previous = Some(obs);
    }

    for (i, value) in results {
        targets[i].set(measure.name.as_str(), rescale(value, measure.scale));
    }
}
