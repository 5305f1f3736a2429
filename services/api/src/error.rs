//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how each
//! failure is rendered as an HTTP response.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use seat_reservation_core::error::EngineError;
use serde_json::json;
use tracing::error;

use crate::config::ConfigError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A typed failure from the reservation engine.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request was understood but its contents are unusable.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

// Extractor rejections become 400s with the usual JSON body.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

fn engine_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::InvalidTripToken
        | EngineError::InvalidSeatNumber(_)
        | EngineError::ScheduleNotFound(_)
        | EngineError::VehicleNotFound(_) => StatusCode::BAD_REQUEST,
        EngineError::ReservationNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::SeatConflict { .. } | EngineError::HoldExpired(_) => StatusCode::CONFLICT,
        EngineError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Engine(err) => {
                let status = engine_status(&err);
                let message = match &err {
                    EngineError::Storage(detail) => {
                        error!("Storage failure: {}", detail);
                        "Internal Server Error".to_string()
                    }
                    EngineError::Transient(detail) => {
                        error!("Transient failure after retries: {}", detail);
                        "Service temporarily unavailable, please retry".to_string()
                    }
                    other => other.to_string(),
                };
                let mut body = json!({ "error": message, "kind": err.kind() });
                if let EngineError::SeatConflict { seats } = &err {
                    body["seats"] = json!(seats);
                }
                (status, body)
            }
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": msg, "kind": "bad_request" }),
            ),
            other => {
                error!("Internal Server Error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error", "kind": "internal" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
