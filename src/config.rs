use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use crate::{StoreError, StoreResult};

pub const ENV_DB_URL: &str = "STORE_DATABASE_URL";
pub const ENV_MAX_CONNECTIONS: &str = "STORE_DB_MAX_CONNECTIONS";
pub const ENV_LOCK_TIMEOUT_MS: &str = "STORE_LOCK_TIMEOUT_MS";
pub const ENV_STOCK_PRECHECK: &str = "STORE_STOCK_PRECHECK";

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Runtime settings for the store backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// `None` waits on row locks indefinitely.
    pub lock_timeout: Option<Duration>,
    pub stock_precheck: bool,
}

impl StoreConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> StoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> StoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup(ENV_DB_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| StoreError::Config(format!("missing env var {ENV_DB_URL}")))?;

        let max_connections = match lookup(ENV_MAX_CONNECTIONS) {
            Some(raw) => parse_number::<u32>(ENV_MAX_CONNECTIONS, &raw)?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        if max_connections == 0 {
            return Err(StoreError::Config(format!(
                "{ENV_MAX_CONNECTIONS} must be at least 1"
            )));
        }

        let lock_timeout = match lookup(ENV_LOCK_TIMEOUT_MS) {
            Some(raw) => match parse_number::<u64>(ENV_LOCK_TIMEOUT_MS, &raw)? {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            None => None,
        };

        let stock_precheck = match lookup(ENV_STOCK_PRECHECK) {
            Some(raw) => parse_bool(ENV_STOCK_PRECHECK, &raw)?,
            None => true,
        };

        Ok(Self {
            database_url,
            max_connections,
            lock_timeout,
            stock_precheck,
        })
    }

    /// Connect to Postgres using this configuration.
    pub async fn connect(&self) -> StoreResult<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await?;
        Ok(pool)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> StoreResult<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| StoreError::Config(format!("{key}: invalid number {raw:?}")))
}

fn parse_bool(key: &str, raw: &str) -> StoreResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(StoreError::Config(format!("{key}: invalid boolean {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_applied() {
        let cfg = StoreConfig::from_lookup(lookup(&[(ENV_DB_URL, "postgres://localhost/store")]))
            .unwrap();
        assert_eq!(cfg.max_connections, 10);
        assert_eq!(cfg.lock_timeout, None);
        assert!(cfg.stock_precheck);
    }

    #[test]
    fn explicit_values_parsed() {
        let cfg = StoreConfig::from_lookup(lookup(&[
            (ENV_DB_URL, "postgres://localhost/store"),
            (ENV_MAX_CONNECTIONS, "4"),
            (ENV_LOCK_TIMEOUT_MS, "250"),
            (ENV_STOCK_PRECHECK, "off"),
        ]))
        .unwrap();
        assert_eq!(cfg.max_connections, 4);
        assert_eq!(cfg.lock_timeout, Some(Duration::from_millis(250)));
        assert!(!cfg.stock_precheck);
    }

    #[test]
    fn missing_url_and_bad_values_rejected() {
        assert!(matches!(
            StoreConfig::from_lookup(lookup(&[])),
            Err(StoreError::Config(_))
        ));
        assert!(StoreConfig::from_lookup(lookup(&[
            (ENV_DB_URL, "postgres://localhost/store"),
            (ENV_LOCK_TIMEOUT_MS, "soon"),
        ]))
        .is_err());
        assert!(StoreConfig::from_lookup(lookup(&[
            (ENV_DB_URL, "postgres://localhost/store"),
            (ENV_MAX_CONNECTIONS, "0"),
        ]))
        .is_err());
    }
}
