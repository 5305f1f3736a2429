//! crates/seat_reservation_core/src/inventory.rs
//!
//! Seat inventory resolver: turns a schedule id into the seat capacity of the
//! vehicle currently assigned to it, plus the flat fare.

use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::ports::{PortError, ScheduleCatalog};

/// What a trip can sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripCapacity {
    pub capacity: u32,
    pub fare_cents: i64,
}

impl TripCapacity {
    pub fn contains_seat(&self, seat_number: u32) -> bool {
        (1..=self.capacity).contains(&seat_number)
    }
}

#[derive(Clone)]
pub struct SeatInventory {
    catalog: Arc<dyn ScheduleCatalog>,
}

impl SeatInventory {
    pub fn new(catalog: Arc<dyn ScheduleCatalog>) -> Self {
        Self { catalog }
    }

    /// Resolves capacity and fare. Read-only.
    ///
    /// A missing schedule or vehicle means the caller referenced a stale trip.
    pub async fn resolve_capacity(&self, schedule_id: Uuid) -> EngineResult<TripCapacity> {
        let schedule = self
            .catalog
            .get_schedule(schedule_id)
            .await
            .map_err(|e| match e {
                PortError::NotFound(_) => EngineError::ScheduleNotFound(schedule_id),
                other => other.into(),
            })?;

        let vehicle = self
            .catalog
            .get_vehicle(schedule.vehicle_id)
            .await
            .map_err(|e| match e {
                PortError::NotFound(_) => {
                    warn!(
                        "Schedule {} references missing vehicle {}",
                        schedule_id, schedule.vehicle_id
                    );
                    EngineError::VehicleNotFound(schedule.vehicle_id)
                }
                other => other.into(),
            })?;

        Ok(TripCapacity {
            capacity: vehicle.capacity,
            fare_cents: schedule.fare_cents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCatalog;

    #[tokio::test]
    async fn resolves_vehicle_capacity_and_fare() {
        let catalog = InMemoryCatalog::new();
        let schedule_id = catalog.add_trip_schedule(40, 2_500);
        let inventory = SeatInventory::new(Arc::new(catalog));

        let cap = inventory.resolve_capacity(schedule_id).await.unwrap();
        assert_eq!(cap.capacity, 40);
        assert_eq!(cap.fare_cents, 2_500);
        assert!(cap.contains_seat(1));
        assert!(cap.contains_seat(40));
        assert!(!cap.contains_seat(0));
        assert!(!cap.contains_seat(41));
    }

    #[tokio::test]
    async fn unknown_schedule_is_reported() {
        let inventory = SeatInventory::new(Arc::new(InMemoryCatalog::new()));
        let missing = Uuid::new_v4();
        assert_eq!(
            inventory.resolve_capacity(missing).await,
            Err(EngineError::ScheduleNotFound(missing))
        );
    }

    #[tokio::test]
    async fn dangling_vehicle_is_reported() {
        let catalog = InMemoryCatalog::new();
        let vehicle_id = Uuid::new_v4();
        let schedule_id = catalog.add_schedule(vehicle_id, 1_000);
        let inventory = SeatInventory::new(Arc::new(catalog));

        assert_eq!(
            inventory.resolve_capacity(schedule_id).await,
            Err(EngineError::VehicleNotFound(vehicle_id))
        );
    }
}
