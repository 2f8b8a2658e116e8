//! Application configuration loaded from environment variables.

use std::time::Duration;

use payments::{Currency, DEFAULT_TOLERANCE, HttpGatewayConfig};
use thiserror::Error;

/// Signing secret used with the in-memory gateway when none is configured.
pub const DEV_WEBHOOK_SECRET: &str = "whsec_local_development";

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed.
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    /// A variable is required by another setting.
    #[error("{key} must be set when {required_by} is configured")]
    Missing {
        key: &'static str,
        required_by: &'static str,
    },
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` bind address (default: `"0.0.0.0"`)
/// - `PORT` listen port (default: `3000`)
/// - `RUST_LOG` tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` Postgres connection string; unset runs on the in-memory store
/// - `PAYMENT_WEBHOOK_SECRET` shared secret for webhook signatures; required
///   with the HTTP gateway, otherwise falls back to [`DEV_WEBHOOK_SECRET`]
/// - `PAYMENT_WEBHOOK_TOLERANCE_SECS` accepted signature age (default: `300`)
/// - `PAYMENT_GATEWAY_URL` and `PAYMENT_GATEWAY_SECRET_KEY` hosted checkout API;
///   unless both are set the in-memory gateway is used
/// - `STORE_CURRENCY` ISO code (default: `"usd"`)
/// - `STORE_CURRENCY_ZERO_DECIMAL` overrides the zero-decimal lookup
/// - `PUBLIC_BASE_URL` storefront root used in links (default: `"http://localhost:3000"`)
/// - `RESTOCK_QUEUE_CAPACITY` pending restock jobs kept in memory (default: `1024`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub webhook_tolerance_secs: u64,
    pub gateway_url: Option<String>,
    pub gateway_secret_key: Option<String>,
    pub currency_code: String,
    pub currency_zero_decimal: Option<bool>,
    pub public_base_url: String,
    pub restock_queue_capacity: usize,
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config = Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT")?.unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: non_empty("DATABASE_URL"),
            webhook_secret: non_empty("PAYMENT_WEBHOOK_SECRET"),
            webhook_tolerance_secs: parsed(&lookup, "PAYMENT_WEBHOOK_TOLERANCE_SECS")?
                .unwrap_or(defaults.webhook_tolerance_secs),
            gateway_url: non_empty("PAYMENT_GATEWAY_URL"),
            gateway_secret_key: non_empty("PAYMENT_GATEWAY_SECRET_KEY"),
            currency_code: lookup("STORE_CURRENCY").unwrap_or(defaults.currency_code),
            currency_zero_decimal: parsed(&lookup, "STORE_CURRENCY_ZERO_DECIMAL")?,
            public_base_url: lookup("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url),
            restock_queue_capacity: parsed(&lookup, "RESTOCK_QUEUE_CAPACITY")?
                .filter(|capacity: &usize| *capacity > 0)
                .unwrap_or(defaults.restock_queue_capacity),
        };

        if config.webhook_secret.is_none() && config.gateway().is_some() {
            return Err(ConfigError::Missing {
                key: "PAYMENT_WEBHOOK_SECRET",
                required_by: "PAYMENT_GATEWAY_URL",
            });
        }
        Ok(config)
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn currency(&self) -> Currency {
        match self.currency_zero_decimal {
            Some(zero_decimal) => Currency::new(&self.currency_code, zero_decimal),
            None => Currency::from_code(&self.currency_code),
        }
    }

    /// Secret used to verify webhook signatures.
    ///
    /// Without a configured secret only the in-memory gateway can be in use
    /// (see [`Config::from_lookup`]), so the development secret is returned.
    pub fn webhook_secret(&self) -> &str {
        match &self.webhook_secret {
            Some(secret) => secret,
            None => {
                tracing::warn!("PAYMENT_WEBHOOK_SECRET not set, using the development secret");
                DEV_WEBHOOK_SECRET
            }
        }
    }

    pub fn webhook_tolerance(&self) -> Duration {
        Duration::from_secs(self.webhook_tolerance_secs)
    }

    /// Settings for the HTTP gateway, if one is configured.
    pub fn gateway(&self) -> Option<HttpGatewayConfig> {
        match (&self.gateway_url, &self.gateway_secret_key) {
            (Some(base_url), Some(secret_key)) => Some(HttpGatewayConfig {
                base_url: base_url.clone(),
                secret_key: secret_key.clone(),
            }),
            _ => None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            webhook_secret: None,
            webhook_tolerance_secs: DEFAULT_TOLERANCE.as_secs(),
            gateway_url: None,
            gateway_secret_key: None,
            currency_code: "usd".to_string(),
            currency_zero_decimal: None,
            public_base_url: "http://localhost:3000".to_string(),
            restock_queue_capacity: 1024,
        }
    }
}
