//! crates/seat_reservation_core/src/domain.rs
//!
//! Defines the pure, core data structures for the reservation engine.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// One concrete departure of a recurring schedule on a calendar date.
///
/// Trips are never persisted; they are identified by the pair below and
/// travel between clients as an opaque trip token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Trip {
    pub schedule_id: Uuid,
    pub travel_date: NaiveDate,
}

impl Trip {
    pub fn new(schedule_id: Uuid, travel_date: NaiveDate) -> Self {
        Self {
            schedule_id,
            travel_date,
        }
    }
}

/// The slice of a collaborator-owned schedule the engine needs.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    /// Flat fare per seat, in minor currency units.
    pub fare_cents: i64,
}

/// The slice of a collaborator-owned vehicle the engine needs.
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: Uuid,
    pub capacity: u32,
}

/// Stored lifecycle state of a reservation.
///
/// Expiry is not a stored state: a `Held` row whose `expires_at` has passed
/// is classified as lapsed at read time (see [`Reservation::is_active_at`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservationStatus {
    Held,
    Paid,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Held => "held",
            ReservationStatus::Paid => "paid",
            ReservationStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown reservation status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ReservationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "held" => Ok(ReservationStatus::Held),
            "paid" => Ok(ReservationStatus::Paid),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A single seat reservation. Rows are never deleted; every attempt is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub id: Uuid,
    /// Opaque caller identity; empty for anonymous bookings.
    pub owner_id: String,
    pub schedule_id: Uuid,
    pub travel_date: NaiveDate,
    pub seat_number: u32,
    pub status: ReservationStatus,
    /// Set only while `Held`.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Creates a fresh hold on `seat_number` that lapses at `expires_at`.
    pub fn new_hold(
        owner_id: &str,
        trip: Trip,
        seat_number: u32,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            schedule_id: trip.schedule_id,
            travel_date: trip.travel_date,
            seat_number,
            status: ReservationStatus::Held,
            expires_at: Some(expires_at),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn trip(&self) -> Trip {
        Trip::new(self.schedule_id, self.travel_date)
    }

    /// A reservation occupies its seat when it is paid, or held and not yet lapsed.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            ReservationStatus::Paid => true,
            ReservationStatus::Held => self.expires_at.is_some_and(|at| at > now),
            ReservationStatus::Cancelled => false,
        }
    }

    /// A held reservation whose deadline is at or before `now`.
    pub fn is_lapsed_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Held && self.expires_at.map_or(true, |at| at <= now)
    }
}

/// Read-time classification of a single seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatState {
    Available,
    Occupied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatView {
    pub number: u32,
    pub state: SeatState,
}

/// Advisory occupancy snapshot for one trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatMap {
    pub trip: Trip,
    pub capacity: u32,
    pub fare_cents: i64,
    pub seats: Vec<SeatView>,
}

/// Occupied seat numbers of a trip, ascending, and how many seats are left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatTally {
    pub occupied: Vec<u32>,
    pub remaining: u32,
}

/// Result of a successful `reserve_seats` call.
#[derive(Debug, Clone)]
pub struct HoldReceipt {
    pub trip: Trip,
    /// Seat numbers in the order they were requested.
    pub reserved: Vec<u32>,
    pub reservations: Vec<Reservation>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn trip() -> Trip {
        Trip::new(Uuid::new_v4(), NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
    }

    #[test]
    fn hold_is_active_only_before_deadline() {
        let now = Utc::now();
        let r = Reservation::new_hold("a", trip(), 1, now, now + Duration::minutes(10));
        assert!(r.is_active_at(now));
        assert!(r.is_active_at(now + Duration::minutes(9)));
        assert!(!r.is_active_at(now + Duration::minutes(10)));
        assert!(r.is_lapsed_at(now + Duration::minutes(10)));
    }

    #[test]
    fn paid_and_cancelled_ignore_clock() {
        let now = Utc::now();
        let mut r = Reservation::new_hold("a", trip(), 1, now, now);
        r.status = ReservationStatus::Paid;
        r.expires_at = None;
        assert!(r.is_active_at(now + Duration::days(365)));
        assert!(!r.is_lapsed_at(now + Duration::days(365)));

        r.status = ReservationStatus::Cancelled;
        assert!(!r.is_active_at(now));
    }

    #[test]
    fn status_text_form() {
        for status in [
            ReservationStatus::Held,
            ReservationStatus::Paid,
            ReservationStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<ReservationStatus>(), Ok(status));
        }
        assert!("pending".parse::<ReservationStatus>().is_err());
    }
}
