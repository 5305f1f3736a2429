//! services/api/src/bin/api.rs

use api_lib::{
    config::Config,
    error::ApiError,
    lifecycle::{await_task, build_engine, shutdown_signal},
    sweeper::run_sweeper,
    web::{self, rest::ApiDoc, state::AppState},
};
use axum::http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect Storage & Build the Engine ---
    let engine = build_engine(&config).await?;

    // --- 3. Start the Expiry Sweeper ---
    let shutdown = CancellationToken::new();
    let sweeper = match config.sweep_interval {
        Some(interval) => Some(tokio::spawn(run_sweeper(
            Arc::clone(&engine),
            interval,
            shutdown.clone(),
        ))),
        None => {
            info!("Background sweeper disabled; lapsed holds are only ignored by reads.");
            None
        }
    };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState { engine });

    let origin = config.cors_allowed_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!(
            "Invalid CORS origin '{}': {}",
            config.cors_allowed_origin, e
        ))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static("x-owner-id")]);

    // --- 5. Create the Web Router ---
    let app = Router::new()
        .merge(web::router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- 7. Stop Background Work ---
    info!("HTTP server stopped, shutting down background tasks...");
    shutdown.cancel();
    if let Some(handle) = sweeper {
        await_task("Expiry sweeper", handle, Duration::from_secs(10)).await;
    }
    info!("Graceful shutdown complete");

    Ok(())
}
