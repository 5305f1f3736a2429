//! services/api/src/lifecycle.rs
//!
//! Startup wiring for the reservation engine and the shutdown signal that
//! stops the server and the sweeper.

use seat_reservation_core::clock::SystemClock;
use seat_reservation_core::engine::{EngineSettings, ReservationEngine};
use seat_reservation_core::memory::{InMemoryCatalog, InMemoryLedger};
use seat_reservation_core::retry::RetryPolicy;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::adapters::db::DbAdapter;
use crate::config::{Config, ConfigError, StorageBackend};
use crate::error::ApiError;

const MEMORY_SEED_CAPACITY: u32 = 40;
const MEMORY_SEED_FARE_CENTS: i64 = 2_500;

/// Translates the loaded configuration into engine settings.
pub fn engine_settings(config: &Config) -> Result<EngineSettings, ConfigError> {
    let hold_duration = chrono::Duration::from_std(config.hold_duration).map_err(|e| {
        ConfigError::InvalidValue("HOLD_DURATION_SECS".to_string(), e.to_string())
    })?;
    Ok(EngineSettings {
        hold_duration,
        retry: RetryPolicy::new(config.tx_max_retries, config.tx_retry_base),
        sweep_on_read: config.sweep_on_read,
    })
}

/// Connects the configured storage backend and builds the engine on top of it.
pub async fn build_engine(config: &Config) -> Result<Arc<ReservationEngine>, ApiError> {
    let settings = engine_settings(config)?;

    let engine = match config.storage_backend {
        StorageBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(database_url)
                .await?;
            let db_adapter = Arc::new(DbAdapter::new(db_pool));
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");

            ReservationEngine::new(
                db_adapter.clone(),
                db_adapter,
                Arc::new(SystemClock),
                settings,
            )
        }
        StorageBackend::Memory => {
            warn!("Using the in-memory store; reservations are lost on restart.");
            let catalog = InMemoryCatalog::new();
            let schedule_id = catalog.add_trip_schedule(MEMORY_SEED_CAPACITY, MEMORY_SEED_FARE_CENTS);
            info!(
                "In-memory catalog seeded with schedule {} ({} seats)",
                schedule_id, MEMORY_SEED_CAPACITY
            );
            ReservationEngine::new(
                Arc::new(catalog),
                Arc::new(InMemoryLedger::new()),
                Arc::new(SystemClock),
                settings,
            )
        }
    };

    Ok(Arc::new(engine))
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}

/// Waits for a background task to wind down, giving up after `timeout`.
pub async fn await_task(name: &str, handle: JoinHandle<()>, timeout: Duration) {
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(())) => info!("{} stopped gracefully", name),
        Ok(Err(e)) => warn!("{} task failed: {}", name, e),
        Err(_) => warn!("{} shutdown timed out", name),
    }
}
