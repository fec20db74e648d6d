//! `raw.daily_prices` → `staging.stg_market_prices`.

use super::coerce::Coercion::{self, *};

pub(super) const KEY: &[&str] = &["ticker", "date"];

pub(super) const RULES: &[(&str, &str, Coercion)] = &[
    ("ticker", "ticker", Upper),
    ("date", "price_date", Date),
    ("open", "open_price", Decimal(2)),
    ("high", "high_price", Decimal(2)),
    ("low", "low_price", Decimal(2)),
    ("close", "close_price", Decimal(2)),
    ("adj_close", "adj_close_price", Decimal(6)),
    ("volume", "volume", Int),
];
