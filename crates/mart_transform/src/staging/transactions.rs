//! `raw.credit_card_transactions` → `staging.stg_transactions`.

use mart_core::Row;

use super::coerce::Coercion::{self, *};
use super::StagingOptions;

pub(super) const KEY: &[&str] = &["trans_num"];

pub(super) const RULES: &[(&str, &str, Coercion)] = &[
    ("trans_num", "transaction_id", Text),
    ("trans_date_trans_time", "transaction_at", Timestamp),
    ("cc_num", "card_number", Text),
    ("merchant", "merchant_name", Text),
    ("category", "category", Lower),
    ("amt", "amount", Decimal(2)),
    ("first", "first_name", Text),
    ("last", "last_name", Text),
    ("gender", "gender", Upper),
    ("street", "street", Text),
    ("city", "city", Text),
    ("state", "state", Upper),
    ("zip", "zip", Text),
    ("lat", "customer_latitude", Decimal(6)),
    ("long", "customer_longitude", Decimal(6)),
    ("city_pop", "city_population", Int),
    ("job", "job", Text),
    ("dob", "date_of_birth", Date),
    ("unix_time", "unix_time", Int),
    ("merch_lat", "merchant_latitude", Decimal(6)),
    ("merch_long", "merchant_longitude", Decimal(6)),
    ("is_fraud", "is_fraud", Bool),
];

/// Derives `transaction_date` and strips the generator's merchant prefix.
pub(super) fn finish(row: &mut Row, options: &StagingOptions) {
    let date = row.date("transaction_at");
    row.set("transaction_date", date);

    if options.merchant_prefix.is_empty() {
        return;
    }
    let stripped = row
        .text("merchant_name")
        .and_then(|name| name.strip_prefix(options.merchant_prefix.as_str()))
        .map(str::to_string);
    if let Some(name) = stripped {
        let name = name.trim();
        row.set("merchant_name", (!name.is_empty()).then(|| name.to_string()));
    }
}
