pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use middleware::extract_owner;
pub use rest::ApiDoc;
pub use state::{AppState, OwnerId};

/// Builds the API router. CORS and the Swagger UI are layered on by the binary.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/trips/token", get(rest::trip_token_handler))
        .route("/trips/{trip_token}/seats", get(rest::occupancy_handler))
        .route(
            "/trips/{trip_token}/reservations",
            post(rest::reserve_seats_handler),
        )
        .route("/reservations", post(rest::reserve_seat_handler))
        .route("/reservations/{id}", get(rest::get_reservation_handler))
        .route(
            "/reservations/{id}/confirm-payment",
            post(rest::confirm_payment_handler),
        )
        .route(
            "/reservations/{id}/cancel",
            post(rest::cancel_reservation_handler),
        )
        .route(
            "/schedules/{schedule_id}/occupied-seats",
            get(rest::occupied_seats_handler),
        )
        .layer(axum_middleware::from_fn(extract_owner))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
