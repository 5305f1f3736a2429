//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use seat_reservation_core::engine::ReservationEngine;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReservationEngine>,
}

/// Caller identity taken from the `x-owner-id` header. Empty when absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OwnerId(pub String);
