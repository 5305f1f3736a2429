//! crates/seat_reservation_core/src/memory.rs
//!
//! In-process implementations of the ledger and catalog ports.
//!
//! `InMemoryLedger` is a single-writer store: a transaction owns the whole
//! ledger from `begin` until it commits or is dropped, which trivially makes
//! every read inside it serialized against concurrent writers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::{Reservation, ReservationStatus, Schedule, Trip, Vehicle};
use crate::ports::{
    LedgerTransaction, PortError, PortResult, ReservationLedger, ScheduleCatalog,
};

//=========================================================================================
// Ledger
//=========================================================================================

/// Committed rows in insertion order, indexed by id.
#[derive(Default)]
struct LedgerState {
    rows: Vec<Reservation>,
    index: HashMap<Uuid, usize>,
}

impl LedgerState {
    fn get(&self, id: Uuid) -> Option<&Reservation> {
        self.index.get(&id).map(|&at| &self.rows[at])
    }
}

#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    failing_begins: Arc<AtomicUsize>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls to `begin` fail as if the store had
    /// aborted the transaction on a serialization conflict.
    pub fn inject_transient_failures(&self, count: usize) {
        self.failing_begins.store(count, Ordering::SeqCst);
    }

    /// Every row ever written, in insertion order.
    pub async fn snapshot(&self) -> Vec<Reservation> {
        self.state.lock().await.rows.clone()
    }
}

#[async_trait]
impl ReservationLedger for InMemoryLedger {
    async fn begin(&self) -> PortResult<Box<dyn LedgerTransaction>> {
        let injected = self
            .failing_begins
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(PortError::Transient(
                "could not serialize access due to concurrent update".to_string(),
            ));
        }

        let guard = Arc::clone(&self.state).lock_owned().await;
        Ok(Box::new(InMemoryTransaction {
            guard,
            inserted: Vec::new(),
            updated: HashMap::new(),
        }))
    }

    async fn find_by_id(&self, id: Uuid) -> PortResult<Reservation> {
        self.state
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Reservation {} not found", id)))
    }

    async fn find_all_active(
        &self,
        trip: &Trip,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<Reservation>> {
        Ok(self
            .state
            .lock()
            .await
            .rows
            .iter()
            .filter(|r| r.trip() == *trip && r.is_active_at(now))
            .cloned()
            .collect())
    }
}

/// Owns the ledger until it ends. Writes are staged as a delta over the
/// committed rows and applied on commit.
struct InMemoryTransaction {
    guard: OwnedMutexGuard<LedgerState>,
    inserted: Vec<Reservation>,
    updated: HashMap<Uuid, Reservation>,
}

impl InMemoryTransaction {
    /// Committed rows with staged updates applied, then staged inserts.
    fn rows(&self) -> impl Iterator<Item = &Reservation> {
        self.guard
            .rows
            .iter()
            .map(move |r| self.updated.get(&r.id).unwrap_or(r))
            .chain(self.inserted.iter())
    }

    fn row_mut(&mut self, id: Uuid) -> PortResult<&mut Reservation> {
        if let Some(at) = self.inserted.iter().position(|r| r.id == id) {
            return Ok(&mut self.inserted[at]);
        }
        let committed = self
            .guard
            .get(id)
            .ok_or_else(|| PortError::NotFound(format!("Reservation {} not found", id)))?;
        Ok(self
            .updated
            .entry(id)
            .or_insert_with(|| committed.clone()))
    }
}

#[async_trait]
impl LedgerTransaction for InMemoryTransaction {
    async fn lock_seat(&mut self, _trip: &Trip, _seat_number: u32) -> PortResult<()> {
        // The transaction already owns the whole ledger.
        Ok(())
    }

    async fn find_active_for_seat(
        &mut self,
        trip: &Trip,
        seat_number: u32,
        now: DateTime<Utc>,
    ) -> PortResult<Option<Reservation>> {
        Ok(self
            .rows()
            .find(|r| r.trip() == *trip && r.seat_number == seat_number && r.is_active_at(now))
            .cloned())
    }

    async fn find_for_update(&mut self, id: Uuid) -> PortResult<Reservation> {
        self.rows()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Reservation {} not found", id)))
    }

    async fn find_expired_holds(&mut self, now: DateTime<Utc>) -> PortResult<Vec<Reservation>> {
        Ok(self
            .rows()
            .filter(|r| {
                r.status == ReservationStatus::Held && r.expires_at.is_some_and(|at| at < now)
            })
            .cloned()
            .collect())
    }

    async fn insert(&mut self, reservation: &Reservation) -> PortResult<()> {
        if self.rows().any(|r| r.id == reservation.id) {
            return Err(PortError::Unexpected(format!(
                "duplicate reservation id {}",
                reservation.id
            )));
        }
        self.inserted.push(reservation.clone());
        Ok(())
    }

    async fn update_status(
        &mut self,
        id: Uuid,
        status: ReservationStatus,
        expires_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> PortResult<Reservation> {
        if status == ReservationStatus::Paid {
            let current = self.find_for_update(id).await?;
            let seat_paid_elsewhere = self.rows().any(|r| {
                r.id != id
                    && r.status == ReservationStatus::Paid
                    && r.trip() == current.trip()
                    && r.seat_number == current.seat_number
            });
            if seat_paid_elsewhere {
                return Err(PortError::Conflict(format!(
                    "seat {} of {} {} is already paid",
                    current.seat_number, current.schedule_id, current.travel_date
                )));
            }
        }

        let row = self.row_mut(id)?;
        row.status = status;
        row.expires_at = expires_at;
        row.updated_at = updated_at;
        Ok(row.clone())
    }

    async fn commit(self: Box<Self>) -> PortResult<()> {
        let InMemoryTransaction {
            mut guard,
            inserted,
            updated,
        } = *self;
        for (id, row) in updated {
            if let Some(&at) = guard.index.get(&id) {
                guard.rows[at] = row;
            }
        }
        for row in inserted {
            let at = guard.rows.len();
            guard.index.insert(row.id, at);
            guard.rows.push(row);
        }
        Ok(())
    }
}

//=========================================================================================
// Catalog
//=========================================================================================

/// Stand-in for the schedule and fleet collaborators.
#[derive(Default)]
pub struct InMemoryCatalog {
    schedules: RwLock<HashMap<Uuid, Schedule>>,
    vehicles: RwLock<HashMap<Uuid, Vehicle>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vehicle(&self, capacity: u32) -> Uuid {
        let id = Uuid::new_v4();
        self.vehicles
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(id, Vehicle { id, capacity });
        id
    }

    /// Registers a schedule; the vehicle does not have to exist.
    pub fn add_schedule(&self, vehicle_id: Uuid, fare_cents: i64) -> Uuid {
        let id = Uuid::new_v4();
        self.schedules
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(
                id,
                Schedule {
                    id,
                    vehicle_id,
                    fare_cents,
                },
            );
        id
    }

    /// Registers a vehicle of `capacity` seats and a schedule that uses it.
    pub fn add_trip_schedule(&self, capacity: u32, fare_cents: i64) -> Uuid {
        let vehicle_id = self.add_vehicle(capacity);
        self.add_schedule(vehicle_id, fare_cents)
    }

    pub fn set_vehicle_capacity(&self, vehicle_id: Uuid, capacity: u32) {
        if let Some(v) = self
            .vehicles
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .get_mut(&vehicle_id)
        {
            v.capacity = capacity;
        }
    }
}

#[async_trait]
impl ScheduleCatalog for InMemoryCatalog {
    async fn get_schedule(&self, schedule_id: Uuid) -> PortResult<Schedule> {
        self.schedules
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&schedule_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Schedule {} not found", schedule_id)))
    }

    async fn get_vehicle(&self, vehicle_id: Uuid) -> PortResult<Vehicle> {
        self.vehicles
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&vehicle_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Vehicle {} not found", vehicle_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn trip() -> Trip {
        Trip::new(Uuid::new_v4(), NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let ledger = InMemoryLedger::new();
        let now = Utc::now();
        {
            let mut tx = ledger.begin().await.unwrap();
            let hold = Reservation::new_hold("a", trip(), 3, now, now + Duration::minutes(10));
            tx.insert(&hold).await.unwrap();
        }
        assert!(ledger.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn committed_rows_become_visible() {
        let ledger = InMemoryLedger::new();
        let now = Utc::now();
        let trip = trip();
        let hold = Reservation::new_hold("a", trip, 3, now, now + Duration::minutes(10));

        let mut tx = ledger.begin().await.unwrap();
        tx.insert(&hold).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(ledger.find_by_id(hold.id).await.unwrap(), hold);
        assert_eq!(ledger.find_all_active(&trip, now).await.unwrap().len(), 1);
        assert!(ledger
            .find_all_active(&trip, now + Duration::minutes(10))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn expired_holds_are_strictly_before_now() {
        let ledger = InMemoryLedger::new();
        let now = Utc::now();
        let hold = Reservation::new_hold("a", trip(), 1, now, now + Duration::minutes(10));

        let mut tx = ledger.begin().await.unwrap();
        tx.insert(&hold).await.unwrap();
        assert!(tx
            .find_expired_holds(now + Duration::minutes(10))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            tx.find_expired_holds(now + Duration::minutes(11))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let ledger = InMemoryLedger::new();
        ledger.inject_transient_failures(1);
        assert!(matches!(
            ledger.begin().await.err(),
            Some(PortError::Transient(_))
        ));
        assert!(ledger.begin().await.is_ok());
    }

    #[tokio::test]
    async fn staged_updates_are_visible_inside_and_published_on_commit() {
        let ledger = InMemoryLedger::new();
        let now = Utc::now();
        let trip = trip();
        let hold = Reservation::new_hold("a", trip, 2, now, now + Duration::minutes(10));

        let mut tx = ledger.begin().await.unwrap();
        tx.insert(&hold).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = ledger.begin().await.unwrap();
        tx.update_status(hold.id, ReservationStatus::Paid, None, now)
            .await
            .unwrap();
        assert_eq!(
            tx.find_for_update(hold.id).await.unwrap().status,
            ReservationStatus::Paid
        );
        assert_eq!(
            tx.find_active_for_seat(&trip, 2, now + Duration::hours(1))
                .await
                .unwrap()
                .map(|r| r.id),
            Some(hold.id)
        );
        tx.commit().await.unwrap();

        let rows = ledger.snapshot().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ReservationStatus::Paid);
        assert_eq!(rows[0].expires_at, None);
    }
}
