//! Environment configuration

use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Backend base URL, e.g. `https://api.example.com`.
    pub api_url: String,
    pub store_dir: PathBuf,
    pub port: u16,
    /// Tax estimate shown at checkout, as a fraction (0.05 = 5%).
    pub tax_rate: Decimal,
    pub catalog_timeout: Duration,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not valid: {value:?}")]
    Invalid { name: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".into(),
            store_dir: PathBuf::from(".storefront"),
            port: 8084,
            tax_rate: Decimal::new(5, 2),
            catalog_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            api_url: lookup("API_URL").map(|u| u.trim_end_matches('/').to_string()).unwrap_or(defaults.api_url),
            store_dir: lookup("STORE_DIR").map(PathBuf::from).unwrap_or(defaults.store_dir),
            port: parse(&lookup, "PORT")?.unwrap_or(defaults.port),
            tax_rate: parse(&lookup, "TAX_RATE")?.unwrap_or(defaults.tax_rate),
            catalog_timeout: parse(&lookup, "CATALOG_TIMEOUT_SECS")?.map(Duration::from_secs).unwrap_or(defaults.catalog_timeout),
        })
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<T>, ConfigError> {
    lookup(name)
        .map(|value| value.trim().parse().map_err(|_| ConfigError::Invalid { name, value }))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Config::from_lookup(lookup(&[])).unwrap(), Config::default());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[("API_URL", "https://api.shop.in/"), ("PORT", "9000"), ("TAX_RATE", "0.18"), ("CATALOG_TIMEOUT_SECS", "3")])).unwrap();
        assert_eq!(config.api_url, "https://api.shop.in");
        assert_eq!(config.port, 9000);
        assert_eq!(config.tax_rate, Decimal::new(18, 2));
        assert_eq!(config.catalog_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_malformed_number() {
        let err = Config::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert_eq!(err, ConfigError::Invalid { name: "PORT", value: "eighty".into() });
    }
}
