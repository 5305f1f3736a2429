//! crates/seat_reservation_core/src/ports.rs
//!
//! Defines the service contracts (traits) the reservation engine depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete storage and collaborator implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Reservation, ReservationStatus, Schedule, Trip, Vehicle};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// Serialization failure, deadlock or pool exhaustion. Safe to retry the whole transaction.
    #[error("Transient storage failure: {0}")]
    Transient(String),
    /// A write collided with a uniqueness rule of the store.
    #[error("Conflicting write: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Collaborator Ports
//=========================================================================================

/// Read-only lookup into the schedule and fleet collaborators.
#[async_trait]
pub trait ScheduleCatalog: Send + Sync {
    async fn get_schedule(&self, schedule_id: Uuid) -> PortResult<Schedule>;

    async fn get_vehicle(&self, vehicle_id: Uuid) -> PortResult<Vehicle>;
}

/// Source of "now" for every decision the engine makes.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

//=========================================================================================
// Reservation Ledger Ports
//=========================================================================================

/// Persistence for reservation rows. Holds no policy; the engine decides.
#[async_trait]
pub trait ReservationLedger: Send + Sync {
    /// Opens a transaction. Dropping it without `commit` rolls everything back.
    async fn begin(&self) -> PortResult<Box<dyn LedgerTransaction>>;

    async fn find_by_id(&self, id: Uuid) -> PortResult<Reservation>;

    /// Every reservation on `trip` that is paid, or held with `expires_at > now`.
    /// Unsynchronized read at the store's natural consistency.
    async fn find_all_active(&self, trip: &Trip, now: DateTime<Utc>)
        -> PortResult<Vec<Reservation>>;
}

/// The transactional view of the ledger. All mutations go through here.
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Serializes this transaction against every other transaction that locks
    /// the same `(trip, seat)`, until this one ends.
    async fn lock_seat(&mut self, trip: &Trip, seat_number: u32) -> PortResult<()>;

    /// Returns the active reservation for one seat, if any.
    ///
    /// Callers take `lock_seat` first; a `None` then stays true for the rest
    /// of the transaction.
    async fn find_active_for_seat(
        &mut self,
        trip: &Trip,
        seat_number: u32,
        now: DateTime<Utc>,
    ) -> PortResult<Option<Reservation>>;

    /// Loads a row and locks it for the rest of the transaction.
    async fn find_for_update(&mut self, id: Uuid) -> PortResult<Reservation>;

    /// Held rows with `expires_at < now`, locked for update.
    async fn find_expired_holds(&mut self, now: DateTime<Utc>) -> PortResult<Vec<Reservation>>;

    async fn insert(&mut self, reservation: &Reservation) -> PortResult<()>;

    async fn update_status(
        &mut self,
        id: Uuid,
        status: ReservationStatus,
        expires_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> PortResult<Reservation>;

    async fn commit(self: Box<Self>) -> PortResult<()>;
}
