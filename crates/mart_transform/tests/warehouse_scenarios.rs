//! End-to-end model scenarios: raw rows through staging, history,
//! dimensions, and facts, checked with the built-in assertions.

use chrono::{NaiveDate, NaiveDateTime};
use mart_core::keys::{SurrogateKey, DEFAULT_MEMBER_KEY};
use mart_core::{IssueKind, Row, Value};
use mart_store::{MemoryStore, Table, TableName, TableStore};
use mart_transform::history::{VALID_FROM, VALID_TO};
use mart_transform::staging::RAW_LOADED_AT;
use mart_transform::{
    build_calendar, build_dimension, capture_snapshot, merge_facts, run_assertions, run_timestamp, stage,
    CatalogSettings, FactInputs, MergeMode, ModelCatalog, StagingOptions,
};

fn loaded(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .unwrap()
        .and_hms_opt(6, 0, 0)
        .unwrap()
}

fn raw_txn(id: &str, card: &str, merchant: &str, city: &str, amount: &str, day: u32) -> Row {
    Row::new()
        .with("trans_num", id)
        .with("trans_date_trans_time", format!("2024-03-{:02} 12:00:00", day))
        .with("cc_num", card)
        .with("merchant", merchant)
        .with("category", "Grocery_POS")
        .with("amt", amount)
        .with("first", "Jane")
        .with("last", "Doe")
        .with("gender", "f")
        .with("street", "1 Main St")
        .with("city", city)
        .with("state", "ny")
        .with("zip", "10001")
        .with("lat", "40.7128")
        .with("long", "-74.0060")
        .with("city_pop", "8000000")
        .with("job", "Analyst")
        .with("dob", "1990-05-17")
        .with("unix_time", "1709294400")
        .with("merch_lat", "40.7")
        .with("merch_long", "-74.0")
        .with("is_fraud", "0")
        .with(RAW_LOADED_AT, loaded(day).format("%Y-%m-%d %H:%M:%S").to_string())
}

fn raw_price(ticker: &str, day: u32, open: &str, close: &str) -> Row {
    Row::new()
        .with("ticker", ticker)
        .with("date", format!("2024-03-{:02}", day))
        .with("open", open)
        .with("high", close)
        .with("low", open)
        .with("close", close)
        .with("adj_close", close)
        .with("volume", "1000")
        .with(RAW_LOADED_AT, loaded(day).format("%Y-%m-%d %H:%M:%S").to_string())
}

struct Warehouse {
    catalog: ModelCatalog,
    store: MemoryStore,
}

impl Warehouse {
    fn new() -> Self {
        let settings = CatalogSettings {
            calendar_start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            securities: vec![Row::new()
                .with("ticker", "AAPL")
                .with("security_name", "Apple Inc.")
                .with("currency_code", "USD")],
            currencies: vec![Row::new().with("currency_code", "USD").with("currency_name", "US Dollar")],
            ..CatalogSettings::default()
        };
        Self {
            catalog: ModelCatalog::standard(&settings),
            store: MemoryStore::new(),
        }
    }

    fn load_raw(&self, name: TableName, rows: Vec<Row>) {
        self.store.replace(&name, Table::new(rows)).unwrap();
    }

    /// Stage, snapshot, rebuild dimensions, merge every fact.
    fn run(&self, mode: MergeMode) -> Vec<usize> {
        for model in &self.catalog.staging {
            let raw = self.store.read_or_empty(&model.source()).unwrap();
            let out = stage(*model, &raw, None, &StagingOptions::default()).unwrap();
            self.store.replace(&model.target(), out.table).unwrap();
        }

        for spec in &self.catalog.snapshots {
            let staged = self.store.read_or_empty(&spec.source).unwrap();
            let history = self.store.read_or_empty(&spec.name).unwrap();
            let run_at = run_timestamp(&staged, None, loaded(28));
            let out = capture_snapshot(spec, &staged, &history, run_at).unwrap();
            self.store.replace(&spec.name, out.table).unwrap();
        }

        for spec in &self.catalog.dimensions {
            let inputs: Vec<Table> = spec
                .sources
                .iter()
                .map(|s| self.store.read_or_empty(&s.table).unwrap())
                .collect();
            let refs: Vec<&Table> = inputs.iter().collect();
            let out = build_dimension(spec, &refs).unwrap();
            self.store.replace(&spec.name, out.table).unwrap();
        }
        let calendar_inputs: Vec<Table> = self
            .catalog
            .calendar
            .sources
            .iter()
            .map(|(t, _)| self.store.read_or_empty(t).unwrap())
            .collect();
        let refs: Vec<&Table> = calendar_inputs.iter().collect();
        let calendar = build_calendar(&self.catalog.calendar, &refs).unwrap();
        self.store.replace(&self.catalog.calendar.name, calendar.table).unwrap();

        let dimensions = self
            .catalog
            .dimension_names()
            .into_iter()
            .map(|n| {
                let t = self.store.read_required(&n).unwrap();
                (n, t)
            })
            .collect();

        let mut selected = Vec::new();
        for spec in &self.catalog.facts {
            let staged = self.store.read_or_empty(&spec.source).unwrap();
            let existing = self.store.read_or_empty(&spec.name).unwrap();
            let same_source = self.catalog.dimensions_reading(&spec.source);
            let out = merge_facts(
                spec,
                FactInputs {
                    staged: &staged,
                    existing: &existing,
                    dimensions: &dimensions,
                    same_source: &same_source,
                },
                mode,
            )
            .unwrap();
            selected.push(out.selected);
            if let Some(table) = out.table {
                self.store.replace(&spec.name, table).unwrap();
            } else if !self.store.exists(&spec.name).unwrap() {
                self.store.replace(&spec.name, existing).unwrap();
            }
        }
        selected
    }

    fn table(&self, name: TableName) -> Table {
        self.store.read_required(&name).unwrap()
    }

    fn assert_all_pass(&self) {
        let results = run_assertions(&self.catalog, &self.store).unwrap();
        let failed: Vec<_> = results.iter().filter(|r| !r.passed()).collect();
        assert!(failed.is_empty(), "failed assertions: {:?}", failed);
    }
}

#[test]
fn test_first_load_builds_every_table() {
    let wh = Warehouse::new();
    wh.load_raw(
        TableName::raw("credit_card_transactions"),
        vec![
            raw_txn("t1", "4111", "fraud_Kirlin and Sons", "New York", "10.50", 1),
            raw_txn("t2", "4222", "fraud_Acme", "Boston", "9.00", 1),
        ],
    );
    wh.load_raw(
        TableName::raw("daily_prices"),
        vec![raw_price("aapl", 1, "100", "101"), raw_price("AAPL", 2, "101", "103.02")],
    );
    wh.load_raw(TableName::raw("daily_rates"), Vec::new());

    let selected = wh.run(MergeMode::Incremental);
    assert_eq!(selected, vec![2, 2, 0]);

    let merchants = wh.table(TableName::marts("dim_merchants"));
    assert_eq!(merchants.len(), 3);
    assert!(merchants
        .rows
        .iter()
        .any(|r| r.text("merchant_name") == Some("Kirlin and Sons")));

    let facts = wh.table(TableName::marts("fact_transactions"));
    assert_eq!(facts.len(), 2);
    assert!(facts
        .rows
        .iter()
        .all(|r| r.text("merchant_key") != Some(DEFAULT_MEMBER_KEY)));

    let prices = wh.table(TableName::marts("fact_daily_prices"));
    let usd = SurrogateKey::generate(&[Value::from("USD")]);
    assert!(prices.rows.iter().all(|r| r.text("currency_key") == Some(usd.as_str())));
    let day2 = prices
        .rows
        .iter()
        .find(|r| r.date("price_date") == NaiveDate::from_ymd_opt(2024, 3, 2))
        .unwrap();
    assert_eq!(day2.decimal("daily_return_pct").unwrap().to_string(), "2.000000");

    wh.assert_all_pass();
}

#[test]
fn test_rerun_without_new_data_is_noop() {
    let wh = Warehouse::new();
    wh.load_raw(
        TableName::raw("credit_card_transactions"),
        vec![raw_txn("t1", "4111", "Acme", "New York", "10.00", 1)],
    );
    wh.run(MergeMode::Incremental);
    let facts_before = wh.table(TableName::marts("fact_transactions"));
    let history_before = wh.table(TableName::snapshots("customers_snapshot"));

    let selected = wh.run(MergeMode::Incremental);
    assert_eq!(selected, vec![0, 0, 0]);
    assert_eq!(wh.table(TableName::marts("fact_transactions")).rows, facts_before.rows);
    assert_eq!(wh.table(TableName::snapshots("customers_snapshot")).rows, history_before.rows);
    wh.assert_all_pass();
}

#[test]
fn test_customer_move_opens_new_version() {
    let wh = Warehouse::new();
    let raw = TableName::raw("credit_card_transactions");
    wh.load_raw(raw.clone(), vec![raw_txn("t1", "4111", "Acme", "Paris", "10.00", 1)]);
    wh.run(MergeMode::Incremental);

    wh.load_raw(
        raw,
        vec![
            raw_txn("t1", "4111", "Acme", "Paris", "10.00", 1),
            raw_txn("t2", "4111", "Acme", "Berlin", "12.00", 5),
        ],
    );
    wh.run(MergeMode::Incremental);

    let history = wh.table(TableName::snapshots("customers_snapshot"));
    assert_eq!(history.len(), 2);
    let paris = history.rows.iter().find(|r| r.text("city") == Some("Paris")).unwrap();
    let berlin = history.rows.iter().find(|r| r.text("city") == Some("Berlin")).unwrap();
    assert_eq!(paris.timestamp(VALID_TO), Some(loaded(5)));
    assert_eq!(berlin.timestamp(VALID_FROM), Some(loaded(5)));
    assert!(berlin.get(VALID_TO).is_null());

    assert_eq!(wh.table(TableName::marts("fact_transactions")).len(), 2);
    wh.assert_all_pass();
}

#[test]
fn test_unknown_merchant_keeps_the_fact() {
    let wh = Warehouse::new();
    let mut orphan = raw_txn("t9", "4111", "", "Paris", "1.00", 1);
    orphan.set("merchant", Value::Null);
    wh.load_raw(
        TableName::raw("credit_card_transactions"),
        vec![raw_txn("t1", "4111", "Acme", "Paris", "10.00", 1), orphan],
    );
    wh.run(MergeMode::Incremental);

    let facts = wh.table(TableName::marts("fact_transactions"));
    assert_eq!(facts.len(), 2);
    let t9 = facts
        .rows
        .iter()
        .find(|r| r.text("transaction_id") == Some("t9"))
        .unwrap();
    assert_eq!(t9.text("merchant_key"), Some(DEFAULT_MEMBER_KEY));
    wh.assert_all_pass();
}

#[test]
fn test_bad_amount_is_nulled_and_reported() {
    let raw = Table::new(vec![raw_txn("t1", "4111", "Acme", "Paris", "ten", 1)]);
    let out = stage(
        mart_transform::StagingModel::Transactions,
        &raw,
        None,
        &StagingOptions::default(),
    )
    .unwrap();
    assert_eq!(out.table.len(), 1);
    assert!(out.table.rows[0].get("amount").is_null());
    assert_eq!(out.issues.count(IssueKind::CoercionFailure), 1);
}

#[test]
fn test_full_refresh_converges_with_incremental() {
    let incremental = Warehouse::new();
    let refreshed = Warehouse::new();
    let raw = TableName::raw("daily_prices");
    let batch1 = vec![raw_price("AAPL", 1, "100", "100"), raw_price("AAPL", 2, "100", "0")];
    let mut batch2 = batch1.clone();
    batch2.push(raw_price("AAPL", 3, "0", "50"));

    incremental.load_raw(raw.clone(), batch1);
    incremental.run(MergeMode::Incremental);
    incremental.load_raw(raw.clone(), batch2.clone());
    incremental.run(MergeMode::Incremental);

    refreshed.load_raw(raw, batch2);
    refreshed.run(MergeMode::FullRefresh);

    let mut a = incremental.table(TableName::marts("fact_daily_prices")).rows;
    let mut b = refreshed.table(TableName::marts("fact_daily_prices")).rows;
    a.sort();
    b.sort();
    assert_eq!(a, b);

    // Previous close of zero: percent change is null, not an error.
    let day3 = a
        .iter()
        .find(|r| r.date("price_date") == NaiveDate::from_ymd_opt(2024, 3, 3))
        .unwrap();
    assert!(day3.get("daily_return_pct").is_null());
    assert!(day3.get("close_to_open_ratio").is_null());
}
