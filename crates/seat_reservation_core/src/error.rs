//! crates/seat_reservation_core/src/error.rs
//!
//! The typed error surface of the reservation engine. Callers branch on the
//! variant, never on the message.

use uuid::Uuid;

use crate::ports::PortError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid trip token")]
    InvalidTripToken,

    #[error("Invalid seat selection: {0}")]
    InvalidSeatNumber(String),

    #[error("Schedule {0} not found")]
    ScheduleNotFound(Uuid),

    #[error("Vehicle {0} not found")]
    VehicleNotFound(Uuid),

    #[error("Reservation {0} not found")]
    ReservationNotFound(Uuid),

    #[error("Seat(s) {} no longer available, please choose again", join_seats(.seats))]
    SeatConflict { seats: Vec<u32> },

    #[error("Hold {0} has expired, please reserve the seat again")]
    HoldExpired(Uuid),

    #[error("Storage is temporarily unavailable: {0}")]
    Transient(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Only transaction-layer hiccups are retried; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidTripToken => "invalid_trip_token",
            EngineError::InvalidSeatNumber(_) => "invalid_seat_number",
            EngineError::ScheduleNotFound(_) => "schedule_not_found",
            EngineError::VehicleNotFound(_) => "vehicle_not_found",
            EngineError::ReservationNotFound(_) => "reservation_not_found",
            EngineError::SeatConflict { .. } => "seat_conflict",
            EngineError::HoldExpired(_) => "hold_expired",
            EngineError::Transient(_) => "transient_failure",
            EngineError::Storage(_) => "storage_failure",
        }
    }
}

/// Lifts a port failure that has no domain-specific meaning at the call site.
impl From<PortError> for EngineError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Transient(msg) => EngineError::Transient(msg),
            PortError::NotFound(msg) | PortError::Conflict(msg) | PortError::Unexpected(msg) => {
                EngineError::Storage(msg)
            }
        }
    }
}

fn join_seats(seats: &[u32]) -> String {
    seats
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
