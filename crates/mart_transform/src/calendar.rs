//! Calendar dimension.
//!
//! Generated rather than deduplicated: one member per day from the configured
//! start date to the later of the configured end date and the latest event
//! date observed in the staged sources.
//!
//! Extension stops at a horizon of `max_extension_days` past the configured
//! end. Dates beyond it are counted and left to resolve to the default date
//! member, so a mistyped year cannot blow the calendar up.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use mart_core::keys::SurrogateKey;
use mart_core::{Row, Value};
use mart_store::{Table, TableMetadata};
use tracing::{info, warn};

use crate::catalog::CalendarSpec;
use crate::dimension::{default_member, inputs_watermark, DimensionOutput};
use crate::error::TransformError;

/// Columns of the calendar dimension after the surrogate key.
pub const CALENDAR_COLUMNS: [&str; 10] = [
    "date_day",
    "year",
    "quarter",
    "month",
    "month_name",
    "day_of_month",
    "day_of_week",
    "day_name",
    "week_of_year",
    "is_weekend",
];

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

fn day_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Builds the calendar row of one day.
pub fn calendar_row(key_column: &str, date: NaiveDate) -> Row {
    let weekday = date.weekday();
    let month_index = date.month0() as usize;
    Row::new()
        .with(key_column, SurrogateKey::generate(&[Value::from(date)]))
        .with("date_day", date)
        .with("year", i64::from(date.year()))
        .with("quarter", i64::from(date.month0() / 3 + 1))
        .with("month", i64::from(date.month()))
        .with("month_name", MONTH_NAMES[month_index])
        .with("day_of_month", i64::from(date.day()))
        .with("day_of_week", i64::from(weekday.number_from_monday()))
        .with("day_name", day_name(weekday))
        .with("week_of_year", i64::from(date.iso_week().week()))
        .with("is_weekend", matches!(weekday, Weekday::Sat | Weekday::Sun))
}

/// Generates the calendar. `inputs` lines up with `spec.sources`.
///
/// # Errors
///
/// `TransformError::InvalidModel` if `inputs` and `spec.sources` differ in
/// length.
pub fn build_calendar(spec: &CalendarSpec, inputs: &[&Table]) -> Result<DimensionOutput, TransformError> {
    if inputs.len() != spec.sources.len() {
        return Err(TransformError::InvalidModel {
            model: spec.name.to_string(),
            reason: format!("{} sources defined, {} provided", spec.sources.len(), inputs.len()),
        });
    }

    let base = spec.end.unwrap_or(spec.start);
    let horizon = base
        .checked_add_days(Days::new(u64::from(spec.max_extension_days)))
        .unwrap_or(NaiveDate::MAX);

    let mut observed: Option<NaiveDate> = None;
    let mut beyond_horizon = 0;
    let dates = spec
        .sources
        .iter()
        .zip(inputs)
        .flat_map(|((_, column), table)| table.rows.iter().filter_map(move |r| r.date(column)));
    for date in dates {
        if date > horizon {
            beyond_horizon += 1;
        } else {
            observed = observed.max(Some(date));
        }
    }
    if beyond_horizon > 0 {
        warn!(
            dimension = %spec.name,
            rows = beyond_horizon,
            horizon = %horizon,
            "Event dates past the calendar horizon left unextended"
        );
    }
    let end = spec.end.max(observed).unwrap_or(spec.start);

    let columns: Vec<String> = CALENDAR_COLUMNS.iter().map(|c| c.to_string()).collect();
    let column_refs: Vec<&String> = columns.iter().collect();
    let defaults = [
        ("month_name".to_string(), Value::from("Unknown")),
        ("day_name".to_string(), Value::from("Unknown")),
    ];
    let mut rows = vec![default_member(&spec.key_column, &column_refs, &defaults)];
    rows.extend(
        spec.start
            .iter_days()
            .take_while(|d| *d <= end)
            .map(|d| calendar_row(&spec.key_column, d)),
    );

    let members = rows.len() - 1;
    info!(dimension = %spec.name, start = %spec.start, end = %end, members, "Calendar generated");

    Ok(DimensionOutput {
        table: Table::new(rows).with_meta(TableMetadata {
            refreshed_at: None,
            source_watermark: inputs_watermark(inputs),
        }),
        members,
        excluded_null_keys: 0,
        beyond_horizon,
    })
}
