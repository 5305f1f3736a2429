//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Longest hold a deployment may configure.
pub const MAX_HOLD_SECS: u64 = 24 * 60 * 60;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which reservation store backs the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("'{}' is not one of postgres, memory", other)),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub storage_backend: StorageBackend,
    /// Required for the Postgres backend only.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub log_level: Level,
    pub hold_duration: Duration,
    /// `None` turns the background sweeper off.
    pub sweep_interval: Option<Duration>,
    pub sweep_on_read: bool,
    pub tx_max_retries: usize,
    pub tx_retry_base: Duration,
    pub cors_allowed_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server ---
        let bind_address: SocketAddr = parse_or(&lookup, "BIND_ADDRESS", "0.0.0.0:3000".parse().ok())?;
        let cors_allowed_origin = lookup("CORS_ALLOWED_ORIGIN")
            .unwrap_or_else(|| "http://localhost:3000".to_string());

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Storage ---
        let storage_backend = parse_or(&lookup, "STORAGE_BACKEND", Some(StorageBackend::Postgres))?;
        let database_url = lookup("DATABASE_URL");
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingVar("DATABASE_URL".to_string()));
        }
        let db_max_connections: u32 = parse_or(&lookup, "DB_MAX_CONNECTIONS", Some(5))?;

        // --- Reservation engine ---
        let hold_secs: u64 = parse_or(&lookup, "HOLD_DURATION_SECS", Some(600))?;
        if hold_secs == 0 || hold_secs > MAX_HOLD_SECS {
            return Err(ConfigError::InvalidValue(
                "HOLD_DURATION_SECS".to_string(),
                format!("must be between 1 and {}", MAX_HOLD_SECS),
            ));
        }
        let sweep_secs: u64 = parse_or(&lookup, "SWEEP_INTERVAL_SECS", Some(60))?;
        let sweep_on_read: bool = parse_or(&lookup, "SWEEP_ON_READ", Some(false))?;
        let tx_max_retries: usize = parse_or(&lookup, "TX_MAX_RETRIES", Some(3))?;
        let tx_retry_base_ms: u64 = parse_or(&lookup, "TX_RETRY_BASE_MS", Some(20))?;

        Ok(Self {
            bind_address,
            storage_backend,
            database_url,
            db_max_connections,
            log_level,
            hold_duration: Duration::from_secs(hold_secs),
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            sweep_on_read,
            tx_max_retries,
            tx_retry_base: Duration::from_millis(tx_retry_base_ms),
            cors_allowed_origin,
        })
    }
}

/// Parses `key` if present, otherwise falls back to `default`.
fn parse_or<F, T>(lookup: &F, key: &str, default: Option<T>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingVar(key.to_string())),
    }
}
