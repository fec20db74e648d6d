//! Pipeline configuration management.
//!
//! Handles loading of the warehouse configuration from TOML files with
//! environment variable override support.

use chrono::NaiveDate;
use mart_core::Row;
use mart_transform::catalog::DEFAULT_CALENDAR_EXTENSION_DAYS;
use mart_transform::{CatalogSettings, StagingOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Reference data for one security
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRef {
    /// Exchange ticker
    pub ticker: String,
    /// Display name
    pub security_name: String,
    /// Listing exchange
    pub exchange: String,
    /// Quote currency (ISO 4217)
    pub currency_code: String,
    /// Sector
    #[serde(default)]
    pub sector: Option<String>,
    /// Country of listing (ISO 3166 alpha-2)
    #[serde(default)]
    pub country: Option<String>,
}

impl SecurityRef {
    fn new(ticker: &str, name: &str, exchange: &str, ccy: &str, sector: &str, country: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            security_name: name.to_string(),
            exchange: exchange.to_string(),
            currency_code: ccy.to_string(),
            sector: Some(sector.to_string()),
            country: Some(country.to_string()),
        }
    }

    /// Reference row keyed by `ticker`.
    pub fn to_row(&self) -> Row {
        Row::new()
            .with("ticker", self.ticker.to_uppercase())
            .with("security_name", self.security_name.as_str())
            .with("exchange", self.exchange.as_str())
            .with("currency_code", self.currency_code.to_uppercase())
            .with("sector", self.sector.clone())
            .with("country", self.country.clone())
    }
}

/// Reference data for one currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyRef {
    /// ISO 4217 code
    pub currency_code: String,
    /// Display name
    pub currency_name: String,
    /// Symbol
    #[serde(default)]
    pub currency_symbol: Option<String>,
}

impl CurrencyRef {
    fn new(code: &str, name: &str, symbol: &str) -> Self {
        Self {
            currency_code: code.to_string(),
            currency_name: name.to_string(),
            currency_symbol: Some(symbol.to_string()),
        }
    }

    /// Reference row keyed by `currency_code`.
    pub fn to_row(&self) -> Row {
        Row::new()
            .with("currency_code", self.currency_code.to_uppercase())
            .with("currency_name", self.currency_name.as_str())
            .with("currency_symbol", self.currency_symbol.clone())
    }
}

/// Calendar dimension range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// First calendar day
    #[serde(default = "default_calendar_start")]
    pub start: NaiveDate,
    /// Last calendar day; extended to the latest observed event date
    #[serde(default)]
    pub end: Option<NaiveDate>,
    /// Cap on that extension, in days past `end` (or `start`)
    #[serde(default = "default_max_extension_days")]
    pub max_extension_days: u32,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            start: default_calendar_start(),
            end: None,
            max_extension_days: default_max_extension_days(),
        }
    }
}

/// Customer history settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Columns whose change opens a new version
    #[serde(default = "default_tracked_columns")]
    pub tracked_columns: Vec<String>,
    /// Close customers that disappear from the source
    #[serde(default)]
    pub hard_deletes: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            tracked_columns: default_tracked_columns(),
            hard_deletes: false,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory holding the warehouse tables
    #[serde(default = "default_warehouse_dir")]
    pub warehouse_dir: PathBuf,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus text file written at the end of every command
    #[serde(default)]
    pub metrics_file: Option<PathBuf>,

    /// Literal prefix stripped from merchant names during staging
    #[serde(default = "default_merchant_prefix")]
    pub merchant_prefix: String,

    /// Calendar dimension range
    #[serde(default)]
    pub calendar: CalendarConfig,

    /// Customer history settings
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Security reference data
    #[serde(default = "default_securities")]
    pub securities: Vec<SecurityRef>,

    /// Currency reference data
    #[serde(default = "default_currencies")]
    pub currencies: Vec<CurrencyRef>,
}

fn default_warehouse_dir() -> PathBuf {
    PathBuf::from("warehouse")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_merchant_prefix() -> String {
    "fraud_".to_string()
}

fn default_calendar_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 1, 1).unwrap_or_default()
}

fn default_max_extension_days() -> u32 {
    DEFAULT_CALENDAR_EXTENSION_DAYS
}

fn default_tracked_columns() -> Vec<String> {
    ["city", "state", "zip", "job"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn default_securities() -> Vec<SecurityRef> {
    vec![
        SecurityRef::new("AAPL", "Apple Inc.", "NASDAQ", "USD", "Technology", "US"),
        SecurityRef::new("MSFT", "Microsoft Corporation", "NASDAQ", "USD", "Technology", "US"),
        SecurityRef::new("JPM", "JPMorgan Chase & Co.", "NYSE", "USD", "Financials", "US"),
        SecurityRef::new("GS", "The Goldman Sachs Group, Inc.", "NYSE", "USD", "Financials", "US"),
        SecurityRef::new("HSBA.L", "HSBC Holdings plc", "LSE", "GBP", "Financials", "GB"),
        SecurityRef::new("BNP.PA", "BNP Paribas SA", "Euronext Paris", "EUR", "Financials", "FR"),
        SecurityRef::new("SAP.DE", "SAP SE", "XETRA", "EUR", "Technology", "DE"),
        SecurityRef::new("NOVN.SW", "Novartis AG", "SIX", "CHF", "Health Care", "CH"),
    ]
}

fn default_currencies() -> Vec<CurrencyRef> {
    vec![
        CurrencyRef::new("EUR", "Euro", "€"),
        CurrencyRef::new("USD", "US Dollar", "$"),
        CurrencyRef::new("GBP", "British Pound", "£"),
        CurrencyRef::new("CHF", "Swiss Franc", "CHF"),
        CurrencyRef::new("JPY", "Japanese Yen", "¥"),
        CurrencyRef::new("CAD", "Canadian Dollar", "C$"),
        CurrencyRef::new("AUD", "Australian Dollar", "A$"),
    ]
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            warehouse_dir: default_warehouse_dir(),
            log_level: default_log_level(),
            metrics_file: None,
            merchant_prefix: default_merchant_prefix(),
            calendar: CalendarConfig::default(),
            snapshot: SnapshotConfig::default(),
            securities: default_securities(),
            currencies: default_currencies(),
        }
    }
}

fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from `path` if it exists, otherwise the defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply environment variable overrides
    pub fn with_env_override(mut self) -> Self {
        if let Ok(dir) = std::env::var("FINMART_WAREHOUSE_DIR") {
            self.warehouse_dir = PathBuf::from(dir);
        }

        if let Ok(log_level) = std::env::var("FINMART_LOG_LEVEL") {
            self.log_level = log_level;
        }

        if let Ok(path) = std::env::var("FINMART_METRICS_FILE") {
            self.metrics_file = Some(PathBuf::from(path));
        }

        if let Ok(flag) = std::env::var("FINMART_HARD_DELETES") {
            self.snapshot.hard_deletes = match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => self.snapshot.hard_deletes,
            };
        }

        if let Ok(start) = std::env::var("FINMART_CALENDAR_START") {
            if let Ok(date) = NaiveDate::parse_from_str(&start, "%Y-%m-%d") {
                self.calendar.start = date;
            }
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.to_lowercase().as_str()) {
            errors.push(format!(
                "Invalid log_level '{}'. Valid values: {:?}",
                self.log_level, valid_log_levels
            ));
        }

        if self.warehouse_dir.as_os_str().is_empty() {
            errors.push("warehouse_dir cannot be empty".to_string());
        }

        if let Some(end) = self.calendar.end {
            if end < self.calendar.start {
                errors.push(format!(
                    "calendar.end {} is before calendar.start {}",
                    end, self.calendar.start
                ));
            }
        }

        if self.snapshot.tracked_columns.is_empty() {
            errors.push("snapshot.tracked_columns must name at least one column".to_string());
        }

        let mut tickers = HashSet::new();
        for security in &self.securities {
            if security.ticker.trim().is_empty() {
                errors.push("securities: ticker cannot be empty".to_string());
            } else if !tickers.insert(security.ticker.to_uppercase()) {
                errors.push(format!("securities: duplicate ticker '{}'", security.ticker));
            }
            if !is_currency_code(&security.currency_code.to_uppercase()) {
                errors.push(format!(
                    "securities: '{}' has invalid currency_code '{}'",
                    security.ticker, security.currency_code
                ));
            }
        }

        let mut codes = HashSet::new();
        for currency in &self.currencies {
            let code = currency.currency_code.to_uppercase();
            if !is_currency_code(&code) {
                errors.push(format!("currencies: invalid currency_code '{}'", currency.currency_code));
            } else if !codes.insert(code) {
                errors.push(format!("currencies: duplicate currency_code '{}'", currency.currency_code));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load from file with environment overrides and validate
    pub fn load_with_env_and_validate(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load_or_default(path)?.with_env_override();
        config.validate()?;
        Ok(config)
    }

    /// Model catalog settings derived from this configuration
    pub fn catalog_settings(&self) -> CatalogSettings {
        CatalogSettings {
            tracked_columns: self.snapshot.tracked_columns.clone(),
            hard_deletes: self.snapshot.hard_deletes,
            calendar_start: self.calendar.start,
            calendar_end: self.calendar.end,
            calendar_max_extension_days: self.calendar.max_extension_days,
            securities: self.securities.iter().map(SecurityRef::to_row).collect(),
            currencies: self.currencies.iter().map(CurrencyRef::to_row).collect(),
        }
    }

    /// Staging options derived from this configuration
    pub fn staging_options(&self) -> StagingOptions {
        StagingOptions {
            merchant_prefix: self.merchant_prefix.clone(),
        }
    }
}

/// Configuration error type
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// IO error reading config file
    Io(String),
    /// Parse error in config file
    Parse(String),
    /// Validation error
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "IO error: {}", msg),
            Self::Parse(msg) => write!(f, "Parse error: {}", msg),
            Self::Validation(errors) => write!(f, "Validation errors: {}", errors.join("; ")),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.warehouse_dir, PathBuf::from("warehouse"));
        assert_eq!(config.securities.len(), 8);
        assert_eq!(config.currencies.len(), 7);
        assert!(!config.snapshot.hard_deletes);
    }

    #[test]
    fn test_default_config_validates() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("FINMART_HARD_DELETES", "true");
        std::env::set_var("FINMART_CALENDAR_START", "2020-06-01");
        let config = PipelineConfig::default().with_env_override();
        assert!(config.snapshot.hard_deletes);
        assert_eq!(config.calendar.start, NaiveDate::from_ymd_opt(2020, 6, 1).unwrap());
        std::env::remove_var("FINMART_HARD_DELETES");
        std::env::remove_var("FINMART_CALENDAR_START");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            warehouse_dir = "/tmp/finmart"

            [calendar]
            start = "2024-01-01"
            end = "2024-12-31"

            [snapshot]
            hard_deletes = true
            "#,
        )
        .unwrap();
        assert_eq!(config.warehouse_dir, PathBuf::from("/tmp/finmart"));
        assert_eq!(config.calendar.end, NaiveDate::from_ymd_opt(2024, 12, 31));
        assert!(config.snapshot.hard_deletes);
        assert_eq!(config.snapshot.tracked_columns, default_tracked_columns());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.securities.len(), 8);
    }

    #[test]
    fn test_reference_tables_in_toml() {
        let config = PipelineConfig::from_toml(
            r#"
            [[securities]]
            ticker = "7203.T"
            security_name = "Toyota Motor Corporation"
            exchange = "TSE"
            currency_code = "JPY"

            [[currencies]]
            currency_code = "JPY"
            currency_name = "Japanese Yen"
            "#,
        )
        .unwrap();
        assert_eq!(config.securities.len(), 1);
        assert_eq!(config.securities[0].sector, None);
        let settings = config.catalog_settings();
        assert_eq!(settings.securities[0].text("currency_code"), Some("JPY"));
        assert!(settings.currencies[0].get("currency_symbol").is_null());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = PipelineConfig::default();
        config.log_level = "verbose".to_string();

        if let Err(ConfigError::Validation(errors)) = config.validate() {
            assert!(errors.iter().any(|e| e.contains("log_level")));
        } else {
            panic!("Expected validation error");
        }
    }

    #[test]
    fn test_validate_multiple_errors() {
        let mut config = PipelineConfig::default();
        config.calendar.end = NaiveDate::from_ymd_opt(2018, 1, 1);
        config.snapshot.tracked_columns.clear();
        config.securities.push(config.securities[0].clone());
        config.currencies.push(CurrencyRef::new("euro", "Euro", "€"));

        if let Err(ConfigError::Validation(errors)) = config.validate() {
            assert_eq!(errors.len(), 4, "{:?}", errors);
        } else {
            panic!("Expected validation error");
        }
    }

    #[test]
    fn test_calendar_horizon_and_metrics_file() {
        let config = PipelineConfig::from_toml(
            "metrics_file = \"out/finmart.prom\"\n[calendar]\nstart = \"2024-01-01\"\nmax_extension_days = 90\n",
        )
        .unwrap();
        assert_eq!(config.metrics_file, Some(PathBuf::from("out/finmart.prom")));
        assert_eq!(config.catalog_settings().calendar_max_extension_days, 90);
        assert_eq!(
            PipelineConfig::default().calendar.max_extension_days,
            DEFAULT_CALENDAR_EXTENSION_DAYS
        );
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            PipelineConfig::from_toml("warehouse_dir = ["),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = PipelineConfig::load_or_default(Path::new("/nonexistent/finmart.toml")).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_sample_config_matches_defaults() {
        let config = PipelineConfig::from_toml(include_str!("../../../finmart.toml")).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }
}
