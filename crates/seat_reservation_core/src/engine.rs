//! crates/seat_reservation_core/src/engine.rs
//!
//! The reservation engine: seat availability, holds, payment confirmation,
//! cancellation and expiry of stale holds.
//!
//! Every mutation runs inside one ledger transaction and is replayed as a
//! whole on transient storage failures. Reads that only inform the client
//! (`occupancy`, `occupied_seat_numbers`, `seat_tally`) go straight to
//! the ledger without a transaction; the authoritative check is always the
//! one inside `reserve_seats`.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    HoldReceipt, Reservation, ReservationStatus, SeatMap, SeatState, SeatTally, SeatView, Trip,
};
use crate::error::{EngineError, EngineResult};
use crate::inventory::SeatInventory;
use crate::ports::{Clock, PortError, ReservationLedger, ScheduleCatalog};
use crate::retry::{retry_transient, RetryPolicy};
use crate::trip_token;

/// How long an unpaid hold keeps its seat.
pub const DEFAULT_HOLD_MINUTES: i64 = 10;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub hold_duration: Duration,
    pub retry: RetryPolicy,
    /// Release lapsed holds before every occupancy read. Meant for
    /// deployments without the background sweeper.
    pub sweep_on_read: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            hold_duration: Duration::minutes(DEFAULT_HOLD_MINUTES),
            retry: RetryPolicy::default(),
            sweep_on_read: false,
        }
    }
}

pub struct ReservationEngine {
    inventory: SeatInventory,
    ledger: Arc<dyn ReservationLedger>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl ReservationEngine {
    pub fn new(
        catalog: Arc<dyn ScheduleCatalog>,
        ledger: Arc<dyn ReservationLedger>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            inventory: SeatInventory::new(catalog),
            ledger,
            clock,
            settings,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Mints the opaque token for a trip.
    pub fn trip_token(&self, schedule_id: Uuid, travel_date: NaiveDate) -> String {
        trip_token::encode(&Trip::new(schedule_id, travel_date))
    }

    //=====================================================================================
    // Reads
    //=====================================================================================

    /// Classifies every seat of the trip as available or occupied.
    pub async fn occupancy(&self, token: &str) -> EngineResult<SeatMap> {
        let trip = trip_token::decode(token)?;
        let capacity = self.inventory.resolve_capacity(trip.schedule_id).await?;
        let now = self.clock.now();

        if self.settings.sweep_on_read {
            if let Err(e) = self.sweep(now).await {
                warn!("Lazy sweep before occupancy read failed: {}", e);
            }
        }

        let occupied: BTreeSet<u32> = self
            .ledger
            .find_all_active(&trip, now)
            .await?
            .into_iter()
            .map(|r| r.seat_number)
            .collect();

        let seats = (1..=capacity.capacity)
            .map(|number| SeatView {
                number,
                state: if occupied.contains(&number) {
                    SeatState::Occupied
                } else {
                    SeatState::Available
                },
            })
            .collect();

        debug!(
            "Occupancy for schedule {} on {}: {} of {} seats taken",
            trip.schedule_id,
            trip.travel_date,
            occupied.len(),
            capacity.capacity
        );

        Ok(SeatMap {
            trip,
            capacity: capacity.capacity,
            fare_cents: capacity.fare_cents,
            seats,
        })
    }

    /// Seat numbers with an active reservation, ascending.
    pub async fn occupied_seat_numbers(
        &self,
        schedule_id: Uuid,
        travel_date: NaiveDate,
    ) -> EngineResult<Vec<u32>> {
        let trip = Trip::new(schedule_id, travel_date);
        let occupied: BTreeSet<u32> = self
            .ledger
            .find_all_active(&trip, self.clock.now())
            .await?
            .into_iter()
            .map(|r| r.seat_number)
            .collect();
        Ok(occupied.into_iter().collect())
    }

    /// Occupied seats plus `capacity - active reservations`, never below zero,
    /// both taken from one read of the ledger.
    pub async fn seat_tally(
        &self,
        schedule_id: Uuid,
        travel_date: NaiveDate,
    ) -> EngineResult<SeatTally> {
        let capacity = self.inventory.resolve_capacity(schedule_id).await?;
        let occupied = self
            .occupied_seat_numbers(schedule_id, travel_date)
            .await?;
        let taken = u32::try_from(occupied.len()).unwrap_or(u32::MAX);
        Ok(SeatTally {
            remaining: capacity.capacity.saturating_sub(taken),
            occupied,
        })
    }

    pub async fn seats_remaining(
        &self,
        schedule_id: Uuid,
        travel_date: NaiveDate,
    ) -> EngineResult<u32> {
        Ok(self.seat_tally(schedule_id, travel_date).await?.remaining)
    }

    pub async fn get_reservation(&self, id: Uuid) -> EngineResult<Reservation> {
        self.ledger
            .find_by_id(id)
            .await
            .map_err(reservation_lookup_error(id))
    }

    //=====================================================================================
    // Mutations
    //=====================================================================================

    /// Claims every requested seat for `owner_id`, or none of them.
    pub async fn reserve_seats(
        &self,
        token: &str,
        seat_numbers: &[u32],
        owner_id: &str,
    ) -> EngineResult<HoldReceipt> {
        let trip = trip_token::decode(token)?;

        if seat_numbers.is_empty() {
            return Err(EngineError::InvalidSeatNumber(
                "at least one seat must be requested".to_string(),
            ));
        }

        // Seats are probed and locked in ascending order.
        let mut locking_order = seat_numbers.to_vec();
        locking_order.sort_unstable();
        if let Some(pair) = locking_order.windows(2).find(|w| w[0] == w[1]) {
            return Err(EngineError::InvalidSeatNumber(format!(
                "seat {} requested more than once",
                pair[0]
            )));
        }

        let capacity = self.inventory.resolve_capacity(trip.schedule_id).await?;
        if let Some(bad) = seat_numbers.iter().find(|s| !capacity.contains_seat(**s)) {
            return Err(EngineError::InvalidSeatNumber(format!(
                "seat {} is outside 1..={}",
                bad, capacity.capacity
            )));
        }

        retry_transient(&self.settings.retry, || {
            self.try_reserve(trip, &locking_order, seat_numbers, owner_id)
        })
        .await
    }

    /// Single-seat entry point; same path as a one-element batch.
    pub async fn reserve_seat(
        &self,
        trip: Trip,
        seat_number: u32,
        owner_id: &str,
    ) -> EngineResult<HoldReceipt> {
        let token = trip_token::encode(&trip);
        self.reserve_seats(&token, &[seat_number], owner_id).await
    }

    async fn try_reserve(
        &self,
        trip: Trip,
        locking_order: &[u32],
        requested: &[u32],
        owner_id: &str,
    ) -> EngineResult<HoldReceipt> {
        let mut tx = self.ledger.begin().await?;
        for &seat in locking_order {
            tx.lock_seat(&trip, seat).await?;
        }
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.settings.hold_duration)
            .ok_or_else(|| {
                EngineError::Storage(format!(
                    "hold duration {} puts the deadline out of range",
                    self.settings.hold_duration
                ))
            })?;

        let mut conflicts = Vec::new();
        for &seat in locking_order {
            if let Some(existing) = tx.find_active_for_seat(&trip, seat, now).await? {
                debug!(
                    "Seat {} already taken by reservation {} ({})",
                    seat, existing.id, existing.status
                );
                conflicts.push(seat);
            }
        }

        if !conflicts.is_empty() {
            warn!(
                "Seat conflict on schedule {} {}: {:?}",
                trip.schedule_id, trip.travel_date, conflicts
            );
            return Err(EngineError::SeatConflict { seats: conflicts });
        }

        let mut reservations = Vec::with_capacity(requested.len());
        for &seat in requested {
            let hold = Reservation::new_hold(owner_id, trip, seat, now, expires_at);
            tx.insert(&hold).await?;
            reservations.push(hold);
        }
        tx.commit().await?;

        info!(
            "Held seats {:?} on schedule {} {} until {}",
            requested, trip.schedule_id, trip.travel_date, expires_at
        );

        Ok(HoldReceipt {
            trip,
            reserved: requested.to_vec(),
            reservations,
            expires_at,
        })
    }

    /// Turns a live hold into a paid reservation. Paying twice is harmless.
    pub async fn confirm_payment(&self, id: Uuid) -> EngineResult<Reservation> {
        retry_transient(&self.settings.retry, || self.try_confirm_payment(id)).await
    }

    async fn try_confirm_payment(&self, id: Uuid) -> EngineResult<Reservation> {
        // Trip and seat never change, so they can be read before locking.
        let known = self
            .ledger
            .find_by_id(id)
            .await
            .map_err(reservation_lookup_error(id))?;

        let mut tx = self.ledger.begin().await?;
        tx.lock_seat(&known.trip(), known.seat_number).await?;
        let current = tx
            .find_for_update(id)
            .await
            .map_err(reservation_lookup_error(id))?;
        let now = self.clock.now();

        match current.status {
            ReservationStatus::Paid => Ok(current),
            ReservationStatus::Cancelled => {
                warn!("Payment attempted on cancelled reservation {}", id);
                Err(EngineError::HoldExpired(id))
            }
            ReservationStatus::Held if current.is_lapsed_at(now) => {
                warn!("Payment attempted on lapsed hold {}", id);
                Err(EngineError::HoldExpired(id))
            }
            ReservationStatus::Held => {
                let paid = tx
                    .update_status(id, ReservationStatus::Paid, None, now)
                    .await
                    .map_err(|e| match e {
                        PortError::Conflict(_) => {
                            warn!("Seat of hold {} was already paid by another reservation", id);
                            EngineError::HoldExpired(id)
                        }
                        other => other.into(),
                    })?;
                tx.commit().await?;
                info!(
                    "Reservation {} paid (seat {} on {})",
                    id, paid.seat_number, paid.travel_date
                );
                Ok(paid)
            }
        }
    }

    /// Releases the seat whatever the current state, paid included.
    pub async fn cancel(&self, id: Uuid) -> EngineResult<Reservation> {
        retry_transient(&self.settings.retry, || self.try_cancel(id)).await
    }

    async fn try_cancel(&self, id: Uuid) -> EngineResult<Reservation> {
        let mut tx = self.ledger.begin().await?;
        let now = self.clock.now();
        let current = tx
            .find_for_update(id)
            .await
            .map_err(reservation_lookup_error(id))?;

        if current.status == ReservationStatus::Cancelled {
            return Ok(current);
        }

        let cancelled = tx
            .update_status(id, ReservationStatus::Cancelled, None, now)
            .await?;
        tx.commit().await?;
        info!("Reservation {} cancelled (was {})", id, current.status);
        Ok(cancelled)
    }

    /// Cancels every hold whose deadline is strictly before `now`.
    /// Returns how many holds were released.
    pub async fn sweep(&self, now: DateTime<Utc>) -> EngineResult<usize> {
        retry_transient(&self.settings.retry, || self.try_sweep(now)).await
    }

    /// `sweep` at the engine's current time.
    pub async fn expire_stale_holds(&self) -> EngineResult<usize> {
        self.sweep(self.clock.now()).await
    }

    async fn try_sweep(&self, now: DateTime<Utc>) -> EngineResult<usize> {
        let mut tx = self.ledger.begin().await?;
        let expired = tx.find_expired_holds(now).await?;
        if expired.is_empty() {
            return Ok(0);
        }

        for hold in &expired {
            tx.update_status(hold.id, ReservationStatus::Cancelled, None, now)
                .await?;
        }
        tx.commit().await?;

        info!("Released {} expired holds", expired.len());
        Ok(expired.len())
    }
}

fn reservation_lookup_error(id: Uuid) -> impl FnOnce(PortError) -> EngineError {
    move |e| match e {
        PortError::NotFound(_) => EngineError::ReservationNotFound(id),
        other => other.into(),
    }
}
