//! `raw.daily_rates` → `staging.stg_exchange_rates`.

use super::coerce::Coercion::{self, *};

pub(super) const KEY: &[&str] = &["base_currency", "target_currency", "date"];

pub(super) const RULES: &[(&str, &str, Coercion)] = &[
    ("base_currency", "base_currency", Upper),
    ("target_currency", "target_currency", Upper),
    ("date", "rate_date", Date),
    ("rate", "exchange_rate", Decimal(6)),
];
