//! Model definitions.
//!
//! Every dimension, snapshot, and fact is described by an explicit spec value
//! instead of naming conventions. [`ModelCatalog::standard`] assembles the
//! warehouse's models; [`ModelCatalog::validate`] checks that every reference
//! between them resolves.

use chrono::NaiveDate;
use mart_core::{Row, Value};
use mart_store::TableName;
use std::collections::HashSet;

use crate::error::TransformError;
use crate::staging::StagingModel;

/// One staged input of a dimension, with its column mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionSource {
    /// Staged table
    pub table: TableName,
    /// `(staged column, dimension column)` pairs
    pub columns: Vec<(String, String)>,
}

impl DimensionSource {
    /// Creates a source from `(staged, dimension)` column pairs.
    pub fn new(table: TableName, columns: &[(&str, &str)]) -> Self {
        Self {
            table,
            columns: columns
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        }
    }
}

/// A deduplicated dimension rebuilt in full every run.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionSpec {
    /// Output table
    pub name: TableName,
    /// Surrogate key column (e.g. `merchant_key`)
    pub key_column: String,
    /// Natural key columns
    pub natural_key: Vec<String>,
    /// Descriptive attribute columns
    pub attributes: Vec<String>,
    /// Staged inputs
    pub sources: Vec<DimensionSource>,
    /// Placeholder values of the default member
    pub defaults: Vec<(String, Value)>,
    /// Reference rows keyed by natural key; they add members and override
    /// attributes
    pub reference: Vec<Row>,
}

impl DimensionSpec {
    /// All output columns except the surrogate key.
    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.natural_key.iter().chain(self.attributes.iter())
    }

    /// Returns `true` if `table` is one of the dimension's inputs.
    pub fn reads(&self, table: &TableName) -> bool {
        self.sources.iter().any(|s| &s.table == table)
    }
}

/// The generated calendar dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarSpec {
    /// Output table
    pub name: TableName,
    /// Surrogate key column
    pub key_column: String,
    /// First calendar day
    pub start: NaiveDate,
    /// Last calendar day, extended to the latest observed event date
    pub end: Option<NaiveDate>,
    /// Furthest the range may extend past `end` (or `start` without one)
    pub max_extension_days: u32,
    /// `(staged table, date column)` pairs whose dates extend the range
    pub sources: Vec<(TableName, String)>,
}

impl CalendarSpec {
    /// Returns `true` if `table` is one of the calendar's inputs.
    pub fn reads(&self, table: &TableName) -> bool {
        self.sources.iter().any(|(t, _)| t == table)
    }
}

/// An SCD2 history table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSpec {
    /// Output table
    pub name: TableName,
    /// Staged input
    pub source: TableName,
    /// Natural key columns
    pub natural_key: Vec<String>,
    /// Columns whose change opens a new version
    pub tracked: Vec<String>,
    /// Close entities that disappear from the source
    pub hard_deletes: bool,
}

/// How a fact row finds the natural key of a dimension member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupKey {
    /// Staged columns, in dimension natural-key order
    Columns(Vec<String>),
    /// A column of the member matched by an earlier lookup
    Through {
        /// Foreign key column of the earlier lookup
        foreign_key: String,
        /// Column of that member holding this dimension's natural key
        column: String,
    },
}

/// Resolution of one foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionLookup {
    /// Referenced dimension
    pub dimension: TableName,
    /// Foreign key column written to the fact
    pub foreign_key: String,
    /// Surrogate key column of the dimension
    pub dimension_key: String,
    /// Natural key columns of the dimension
    pub dimension_natural_key: Vec<String>,
    /// Where the natural key comes from
    pub from: LookupKey,
}

/// Kind of derived measure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeasureKind {
    /// `value - previous value` within a partition
    Delta {
        /// Measured column
        column: String,
        /// Partition columns
        partition: Vec<String>,
        /// Temporal ordering column
        order_by: String,
    },
    /// Percent change against the previous value within a partition
    PercentChange {
        /// Measured column
        column: String,
        /// Partition columns
        partition: Vec<String>,
        /// Temporal ordering column
        order_by: String,
    },
    /// `left - right` on the same row
    Difference {
        /// Minuend column
        left: String,
        /// Subtrahend column
        right: String,
    },
    /// `numerator / denominator` on the same row
    Ratio {
        /// Numerator column
        numerator: String,
        /// Denominator column
        denominator: String,
    },
    /// `1 / column` on the same row
    Reciprocal {
        /// Inverted column
        column: String,
    },
}

impl MeasureKind {
    /// Returns `true` for measures that need ordered context.
    pub fn is_windowed(&self) -> bool {
        matches!(self, MeasureKind::Delta { .. } | MeasureKind::PercentChange { .. })
    }
}

/// A computed fact column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedMeasure {
    /// Output column
    pub name: String,
    /// Computation
    pub kind: MeasureKind,
    /// Fixed output scale
    pub scale: Option<u32>,
}

/// An incrementally merged fact table at one grain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactSpec {
    /// Output table
    pub name: TableName,
    /// Staged input
    pub source: TableName,
    /// Staged columns identifying one event (hashed into `fact_key`)
    pub natural_key: Vec<String>,
    /// Foreign keys, resolved in order
    pub lookups: Vec<DimensionLookup>,
    /// Staged columns copied verbatim
    pub columns: Vec<String>,
    /// Computed measures, evaluated in order
    pub measures: Vec<DerivedMeasure>,
}

/// Default cap on calendar extension to observed event dates.
pub const DEFAULT_CALENDAR_EXTENSION_DAYS: u32 = 3660;

/// Tunables of the standard model set.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSettings {
    /// Columns tracked by the customer snapshot
    pub tracked_columns: Vec<String>,
    /// Close customers that disappear from the source
    pub hard_deletes: bool,
    /// First calendar day
    pub calendar_start: NaiveDate,
    /// Last calendar day (before extension to observed dates)
    pub calendar_end: Option<NaiveDate>,
    /// Cap on extension to observed dates, in days
    pub calendar_max_extension_days: u32,
    /// Security reference rows (`ticker`, `security_name`, `exchange`,
    /// `currency_code`, `sector`, `country`)
    pub securities: Vec<Row>,
    /// Currency reference rows (`currency_code`, `currency_name`,
    /// `currency_symbol`)
    pub currencies: Vec<Row>,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            tracked_columns: ["city", "state", "zip", "job"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            hard_deletes: false,
            calendar_start: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap_or_default(),
            calendar_end: None,
            calendar_max_extension_days: DEFAULT_CALENDAR_EXTENSION_DAYS,
            securities: Vec::new(),
            currencies: Vec::new(),
        }
    }
}

/// All models of a warehouse.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCatalog {
    /// Staging models
    pub staging: Vec<StagingModel>,
    /// History tables
    pub snapshots: Vec<SnapshotSpec>,
    /// Deduplicated dimensions
    pub dimensions: Vec<DimensionSpec>,
    /// Calendar dimension
    pub calendar: CalendarSpec,
    /// Fact tables
    pub facts: Vec<FactSpec>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn lookup(dimension: &str, foreign_key: &str, key: &str, natural: &[&str], from: &[&str]) -> DimensionLookup {
    DimensionLookup {
        dimension: TableName::marts(dimension),
        foreign_key: foreign_key.to_string(),
        dimension_key: key.to_string(),
        dimension_natural_key: strings(natural),
        from: LookupKey::Columns(strings(from)),
    }
}

fn window(name: &str, delta: bool, column: &str, partition: &[&str], order_by: &str, scale: u32) -> DerivedMeasure {
    let (column, partition, order_by) = (column.to_string(), strings(partition), order_by.to_string());
    DerivedMeasure {
        name: name.to_string(),
        kind: if delta {
            MeasureKind::Delta { column, partition, order_by }
        } else {
            MeasureKind::PercentChange { column, partition, order_by }
        },
        scale: Some(scale),
    }
}

impl ModelCatalog {
    /// The warehouse's standard models.
    pub fn standard(settings: &CatalogSettings) -> Self {
        let transactions = StagingModel::Transactions.target();
        let prices = StagingModel::MarketPrices.target();
        let rates = StagingModel::ExchangeRates.target();

        let customer_attributes = [
            "first_name",
            "last_name",
            "gender",
            "street",
            "city",
            "state",
            "zip",
            "customer_latitude",
            "customer_longitude",
            "city_population",
            "job",
            "date_of_birth",
        ];
        let mut customer_columns = vec![("card_number", "card_number")];
        customer_columns.extend(customer_attributes.iter().map(|c| (*c, *c)));

        let dim_customers = DimensionSpec {
            name: TableName::marts("dim_customers"),
            key_column: "customer_key".into(),
            natural_key: strings(&["card_number"]),
            attributes: strings(&customer_attributes),
            sources: vec![DimensionSource::new(transactions.clone(), &customer_columns)],
            defaults: vec![
                ("first_name".into(), Value::from("Unknown")),
                ("last_name".into(), Value::from("Customer")),
                ("city".into(), Value::from("Unknown")),
                ("state".into(), Value::from("Unknown")),
                ("job".into(), Value::from("Unknown")),
            ],
            reference: Vec::new(),
        };

        let dim_merchants = DimensionSpec {
            name: TableName::marts("dim_merchants"),
            key_column: "merchant_key".into(),
            natural_key: strings(&["merchant_name"]),
            attributes: strings(&["category", "merchant_latitude", "merchant_longitude"]),
            sources: vec![DimensionSource::new(
                transactions.clone(),
                &[
                    ("merchant_name", "merchant_name"),
                    ("category", "category"),
                    ("merchant_latitude", "merchant_latitude"),
                    ("merchant_longitude", "merchant_longitude"),
                ],
            )],
            defaults: vec![
                ("merchant_name".into(), Value::from("Unknown Merchant")),
                ("category".into(), Value::from("unknown")),
            ],
            reference: Vec::new(),
        };

        let dim_securities = DimensionSpec {
            name: TableName::marts("dim_securities"),
            key_column: "security_key".into(),
            natural_key: strings(&["ticker"]),
            attributes: strings(&["security_name", "exchange", "currency_code", "sector", "country"]),
            sources: vec![DimensionSource::new(prices.clone(), &[("ticker", "ticker")])],
            defaults: vec![
                ("ticker".into(), Value::from("UNKNOWN")),
                ("security_name".into(), Value::from("Unknown Security")),
            ],
            reference: settings.securities.clone(),
        };

        // Currencies quoted by securities are members even without rates.
        let mut currency_reference = settings.currencies.clone();
        for security in &settings.securities {
            let code = security.get("currency_code");
            if !code.is_null() && !currency_reference.iter().any(|c| c.get("currency_code") == code) {
                currency_reference.push(Row::new().with("currency_code", code.clone()));
            }
        }

        let dim_currencies = DimensionSpec {
            name: TableName::marts("dim_currencies"),
            key_column: "currency_key".into(),
            natural_key: strings(&["currency_code"]),
            attributes: strings(&["currency_name", "currency_symbol"]),
            sources: vec![
                DimensionSource::new(rates.clone(), &[("base_currency", "currency_code")]),
                DimensionSource::new(rates.clone(), &[("target_currency", "currency_code")]),
            ],
            defaults: vec![
                ("currency_code".into(), Value::from("UNK")),
                ("currency_name".into(), Value::from("Unknown Currency")),
            ],
            reference: currency_reference,
        };

        let calendar = CalendarSpec {
            name: TableName::marts("dim_dates"),
            key_column: "date_key".into(),
            start: settings.calendar_start,
            end: settings.calendar_end,
            max_extension_days: settings.calendar_max_extension_days,
            sources: vec![
                (transactions.clone(), "transaction_date".into()),
                (prices.clone(), "price_date".into()),
                (rates.clone(), "rate_date".into()),
            ],
        };

        let customers_snapshot = SnapshotSpec {
            name: TableName::snapshots("customers_snapshot"),
            source: transactions.clone(),
            natural_key: strings(&["card_number"]),
            tracked: settings.tracked_columns.clone(),
            hard_deletes: settings.hard_deletes,
        };

        let fact_transactions = FactSpec {
            name: TableName::marts("fact_transactions"),
            source: transactions,
            natural_key: strings(&["transaction_id"]),
            lookups: vec![
                lookup("dim_customers", "customer_key", "customer_key", &["card_number"], &["card_number"]),
                lookup("dim_merchants", "merchant_key", "merchant_key", &["merchant_name"], &["merchant_name"]),
                lookup("dim_dates", "transaction_date_key", "date_key", &["date_day"], &["transaction_date"]),
            ],
            columns: strings(&[
                "transaction_id",
                "transaction_at",
                "transaction_date",
                "category",
                "amount",
                "is_fraud",
                "unix_time",
            ]),
            measures: Vec::new(),
        };

        let fact_daily_prices = FactSpec {
            name: TableName::marts("fact_daily_prices"),
            source: prices,
            natural_key: strings(&["ticker", "price_date"]),
            lookups: vec![
                lookup("dim_securities", "security_key", "security_key", &["ticker"], &["ticker"]),
                DimensionLookup {
                    dimension: TableName::marts("dim_currencies"),
                    foreign_key: "currency_key".into(),
                    dimension_key: "currency_key".into(),
                    dimension_natural_key: strings(&["currency_code"]),
                    from: LookupKey::Through {
                        foreign_key: "security_key".into(),
                        column: "currency_code".into(),
                    },
                },
                lookup("dim_dates", "price_date_key", "date_key", &["date_day"], &["price_date"]),
            ],
            columns: strings(&[
                "ticker",
                "price_date",
                "open_price",
                "high_price",
                "low_price",
                "close_price",
                "adj_close_price",
                "volume",
            ]),
            measures: vec![
                DerivedMeasure {
                    name: "daily_range".into(),
                    kind: MeasureKind::Difference {
                        left: "high_price".into(),
                        right: "low_price".into(),
                    },
                    scale: Some(2),
                },
                DerivedMeasure {
                    name: "close_to_open_ratio".into(),
                    kind: MeasureKind::Ratio {
                        numerator: "close_price".into(),
                        denominator: "open_price".into(),
                    },
                    scale: Some(6),
                },
                window("price_change", true, "close_price", &["ticker"], "price_date", 2),
                window("daily_return_pct", false, "close_price", &["ticker"], "price_date", 6),
            ],
        };

        let fact_exchange_rates = FactSpec {
            name: TableName::marts("fact_exchange_rates"),
            source: rates,
            natural_key: strings(&["base_currency", "target_currency", "rate_date"]),
            lookups: vec![
                lookup("dim_currencies", "base_currency_key", "currency_key", &["currency_code"], &["base_currency"]),
                lookup("dim_currencies", "target_currency_key", "currency_key", &["currency_code"], &["target_currency"]),
                lookup("dim_dates", "rate_date_key", "date_key", &["date_day"], &["rate_date"]),
            ],
            columns: strings(&["base_currency", "target_currency", "rate_date", "exchange_rate"]),
            measures: vec![
                DerivedMeasure {
                    name: "inverse_rate".into(),
                    kind: MeasureKind::Reciprocal {
                        column: "exchange_rate".into(),
                    },
                    scale: Some(6),
                },
                window("rate_change", true, "exchange_rate", &["base_currency", "target_currency"], "rate_date", 6),
                window(
                    "rate_change_pct",
                    false,
                    "exchange_rate",
                    &["base_currency", "target_currency"],
                    "rate_date",
                    6,
                ),
            ],
        };

        Self {
            staging: StagingModel::ALL.to_vec(),
            snapshots: vec![customers_snapshot],
            dimensions: vec![dim_customers, dim_merchants, dim_securities, dim_currencies],
            calendar,
            facts: vec![fact_transactions, fact_daily_prices, fact_exchange_rates],
        }
    }

    /// Finds a fact by table name, qualified (`marts.fact_x`) or not.
    ///
    /// # Errors
    ///
    /// `TransformError::UnknownModel` if no fact matches.
    pub fn fact(&self, name: &str) -> Result<&FactSpec, TransformError> {
        self.facts
            .iter()
            .find(|f| f.name.table() == name || f.name.to_string() == name)
            .ok_or_else(|| TransformError::UnknownModel(name.to_string()))
    }

    /// Names of all dimensions, calendar included.
    pub fn dimension_names(&self) -> Vec<TableName> {
        let mut names: Vec<TableName> = self.dimensions.iter().map(|d| d.name.clone()).collect();
        names.push(self.calendar.name.clone());
        names
    }

    /// Surrogate key column of a dimension.
    pub fn dimension_key(&self, dimension: &TableName) -> Option<&str> {
        if &self.calendar.name == dimension {
            return Some(self.calendar.key_column.as_str());
        }
        self.dimensions
            .iter()
            .find(|d| &d.name == dimension)
            .map(|d| d.key_column.as_str())
    }

    /// Dimensions built (at least partly) from the given staged table.
    pub fn dimensions_reading(&self, source: &TableName) -> Vec<TableName> {
        let mut names: Vec<TableName> = self
            .dimensions
            .iter()
            .filter(|d| d.reads(source))
            .map(|d| d.name.clone())
            .collect();
        if self.calendar.reads(source) {
            names.push(self.calendar.name.clone());
        }
        names
    }

    /// Checks that all model references resolve.
    ///
    /// # Validation
    ///
    /// - No duplicate output table names
    /// - Every dimension and snapshot has a non-empty natural key
    /// - Every fact lookup references a known dimension and its key column
    /// - `Through` lookups reference an earlier foreign key of the same fact
    /// - Every snapshot tracks at least one column
    ///
    /// # Errors
    ///
    /// `TransformError::InvalidModel` for the first violation found.
    pub fn validate(&self) -> Result<(), TransformError> {
        let invalid = |model: &TableName, reason: String| TransformError::InvalidModel {
            model: model.to_string(),
            reason,
        };

        let mut names = HashSet::new();
        let outputs = self
            .snapshots
            .iter()
            .map(|s| &s.name)
            .chain(self.dimensions.iter().map(|d| &d.name))
            .chain(std::iter::once(&self.calendar.name))
            .chain(self.facts.iter().map(|f| &f.name));
        for name in outputs {
            if !names.insert(name.clone()) {
                return Err(invalid(name, "defined more than once".into()));
            }
        }

        for dim in &self.dimensions {
            if dim.natural_key.is_empty() {
                return Err(invalid(&dim.name, "empty natural key".into()));
            }
        }

        for snap in &self.snapshots {
            if snap.natural_key.is_empty() {
                return Err(invalid(&snap.name, "empty natural key".into()));
            }
            if snap.tracked.is_empty() {
                return Err(invalid(&snap.name, "no tracked columns".into()));
            }
        }

        for fact in &self.facts {
            if fact.natural_key.is_empty() {
                return Err(invalid(&fact.name, "empty natural key".into()));
            }
            let mut resolved: Vec<&str> = Vec::new();
            for l in &fact.lookups {
                match self.dimension_key(&l.dimension) {
                    None => {
                        return Err(invalid(
                            &fact.name,
                            format!("unknown dimension {}", l.dimension),
                        ))
                    }
                    Some(key) if key != l.dimension_key => {
                        return Err(invalid(
                            &fact.name,
                            format!("{} has no key column {}", l.dimension, l.dimension_key),
                        ))
                    }
                    Some(_) => {}
                }
                match &l.from {
                    LookupKey::Columns(cols) if cols.len() != l.dimension_natural_key.len() => {
                        return Err(invalid(
                            &fact.name,
                            format!("{} maps {} columns onto a {}-column key", l.foreign_key, cols.len(), l.dimension_natural_key.len()),
                        ))
                    }
                    LookupKey::Through { foreign_key, .. } if !resolved.contains(&foreign_key.as_str()) => {
                        return Err(invalid(
                            &fact.name,
                            format!("{} resolves through unknown key {}", l.foreign_key, foreign_key),
                        ))
                    }
                    _ => {}
                }
                resolved.push(l.foreign_key.as_str());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_is_valid() {
        let catalog = ModelCatalog::standard(&CatalogSettings::default());
        catalog.validate().unwrap();
        assert_eq!(catalog.facts.len(), 3);
        assert_eq!(catalog.dimension_names().len(), 5);
    }

    #[test]
    fn test_fact_lookup_by_name() {
        let catalog = ModelCatalog::standard(&CatalogSettings::default());
        assert!(catalog.fact("fact_daily_prices").is_ok());
        assert!(catalog.fact("marts.fact_exchange_rates").is_ok());
        assert!(matches!(
            catalog.fact("fact_nothing"),
            Err(TransformError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_dimensions_reading_transactions() {
        let catalog = ModelCatalog::standard(&CatalogSettings::default());
        let names = catalog.dimensions_reading(&TableName::staging("stg_transactions"));
        assert_eq!(
            names,
            vec![
                TableName::marts("dim_customers"),
                TableName::marts("dim_merchants"),
                TableName::marts("dim_dates"),
            ]
        );
    }

    #[test]
    fn test_through_lookup_must_follow_its_source() {
        let mut catalog = ModelCatalog::standard(&CatalogSettings::default());
        let prices = catalog
            .facts
            .iter_mut()
            .find(|f| f.name.table() == "fact_daily_prices")
            .unwrap();
        prices.lookups.swap(0, 1);
        assert!(matches!(
            catalog.validate(),
            Err(TransformError::InvalidModel { .. })
        ));
    }

    #[test]
    fn test_unknown_dimension_rejected() {
        let mut catalog = ModelCatalog::standard(&CatalogSettings::default());
        catalog.facts[0].lookups[0].dimension = TableName::marts("dim_nothing");
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_security_currencies_become_reference_members() {
        let settings = CatalogSettings {
            securities: vec![Row::new().with("ticker", "HSBA.L").with("currency_code", "GBP")],
            currencies: vec![Row::new().with("currency_code", "USD")],
            ..CatalogSettings::default()
        };
        let catalog = ModelCatalog::standard(&settings);
        let currencies = catalog
            .dimensions
            .iter()
            .find(|d| d.name.table() == "dim_currencies")
            .unwrap();
        let codes: Vec<_> = currencies
            .reference
            .iter()
            .filter_map(|r| r.text("currency_code"))
            .collect();
        assert_eq!(codes, vec!["USD", "GBP"]);
    }

    #[test]
    fn test_empty_tracked_set_rejected() {
        let settings = CatalogSettings {
            tracked_columns: Vec::new(),
            ..CatalogSettings::default()
        };
        assert!(ModelCatalog::standard(&settings).validate().is_err());
    }
}
