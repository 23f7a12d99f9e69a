//! Configuration module for identity-store.

use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    /// Upper bound on a single unit of work; `None` means unbounded.
    pub tx_timeout: Option<Duration>,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .finish()
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_lookup(common, |key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (the process
    /// environment in `from_env`).
    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("DATABASE_URL")
            .ok_or_else(|| AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required")))?;

        let tx_timeout = match lookup("TX_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!(
                        "TX_TIMEOUT_SECS must be a whole number of seconds, got '{}'",
                        raw
                    ))
                })?;
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Self {
            common,
            service_name: lookup("SERVICE_NAME").unwrap_or_else(|| "identity-store".to_string()),
            service_version: lookup("SERVICE_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            otlp_endpoint: lookup("OTLP_ENDPOINT"),
            database: DatabaseConfig {
                url,
                max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: lookup("DATABASE_MIN_CONNECTIONS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            tx_timeout,
        })
    }
}
