//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `ReservationLedger` and `ScheduleCatalog` ports from the `core` crate.
//! It handles all interactions with the PostgreSQL database using `sqlx`.
//!
//! `lock_seat` takes a transaction-scoped advisory lock per seat, so two
//! transactions probing the same empty seat cannot both see it free, and a
//! payment cannot settle a hold while a reserve is judging that seat.
//! Existing rows are locked with `FOR UPDATE`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use seat_reservation_core::domain::{Reservation, ReservationStatus, Schedule, Trip, Vehicle};
use seat_reservation_core::ports::{
    LedgerTransaction, PortError, PortResult, ReservationLedger, ScheduleCatalog,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

const RESERVATION_COLUMNS: &str = "id, owner_id, schedule_id, travel_date, seat_number, status, \
                                   expires_at, created_at, updated_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the ledger and catalog ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Registers a vehicle. The fleet service normally owns this table.
    pub async fn insert_vehicle(&self, capacity: u32) -> PortResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO vehicles (id, capacity) VALUES ($1, $2)")
            .bind(id)
            .bind(to_db_int(capacity)?)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(id)
    }

    /// Registers a schedule. The scheduling service normally owns this table.
    pub async fn insert_schedule(&self, vehicle_id: Uuid, fare_cents: i64) -> PortResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO schedules (id, vehicle_id, fare_cents) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(vehicle_id)
            .bind(fare_cents)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(id)
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ReservationRecord {
    id: Uuid,
    owner_id: String,
    schedule_id: Uuid,
    travel_date: NaiveDate,
    seat_number: i32,
    status: String,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ReservationRecord {
    fn to_domain(self) -> PortResult<Reservation> {
        let status = self
            .status
            .parse::<ReservationStatus>()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let seat_number = u32::try_from(self.seat_number).map_err(|_| {
            PortError::Unexpected(format!(
                "Reservation {} has invalid seat number {}",
                self.id, self.seat_number
            ))
        })?;
        Ok(Reservation {
            id: self.id,
            owner_id: self.owner_id,
            schedule_id: self.schedule_id,
            travel_date: self.travel_date,
            seat_number,
            status,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ScheduleRecord {
    id: Uuid,
    vehicle_id: Uuid,
    fare_cents: i64,
}
impl ScheduleRecord {
    fn to_domain(self) -> Schedule {
        Schedule {
            id: self.id,
            vehicle_id: self.vehicle_id,
            fare_cents: self.fare_cents,
        }
    }
}

#[derive(FromRow)]
struct VehicleRecord {
    id: Uuid,
    capacity: i32,
}
impl VehicleRecord {
    fn to_domain(self) -> PortResult<Vehicle> {
        let capacity = u32::try_from(self.capacity).map_err(|_| {
            PortError::Unexpected(format!(
                "Vehicle {} has negative capacity {}",
                self.id, self.capacity
            ))
        })?;
        Ok(Vehicle {
            id: self.id,
            capacity,
        })
    }
}

//=========================================================================================
// Error Translation
//=========================================================================================

/// Serialization failures, deadlocks and pool exhaustion are worth replaying.
fn map_sqlx_error(e: sqlx::Error) -> PortError {
    match &e {
        sqlx::Error::Database(db)
            if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) =>
        {
            warn!("Transaction aborted by the database: {}", e);
            PortError::Transient(e.to_string())
        }
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            warn!("Write rejected by a unique index: {}", e);
            PortError::Conflict(e.to_string())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => PortError::Transient(e.to_string()),
        sqlx::Error::RowNotFound => PortError::NotFound(e.to_string()),
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn to_db_int(value: u32) -> PortResult<i32> {
    i32::try_from(value).map_err(|_| PortError::Unexpected(format!("{} does not fit INTEGER", value)))
}

fn lock_key(trip: &Trip, seat_number: u32) -> String {
    format!("{}:{}:{}", trip.schedule_id, trip.travel_date, seat_number)
}

//=========================================================================================
// `ScheduleCatalog` Trait Implementation
//=========================================================================================

#[async_trait]
impl ScheduleCatalog for DbAdapter {
    async fn get_schedule(&self, schedule_id: Uuid) -> PortResult<Schedule> {
        let record = sqlx::query_as::<_, ScheduleRecord>(
            "SELECT id, vehicle_id, fare_cents FROM schedules WHERE id = $1",
        )
        .bind(schedule_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Schedule {} not found", schedule_id))
            }
            other => map_sqlx_error(other),
        })?;
        Ok(record.to_domain())
    }

    async fn get_vehicle(&self, vehicle_id: Uuid) -> PortResult<Vehicle> {
        let record = sqlx::query_as::<_, VehicleRecord>(
            "SELECT id, capacity FROM vehicles WHERE id = $1",
        )
        .bind(vehicle_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Vehicle {} not found", vehicle_id))
            }
            other => map_sqlx_error(other),
        })?;
        record.to_domain()
    }
}

//=========================================================================================
// `ReservationLedger` Trait Implementation
//=========================================================================================

#[async_trait]
impl ReservationLedger for DbAdapter {
    async fn begin(&self) -> PortResult<Box<dyn LedgerTransaction>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(PgLedgerTransaction { tx }))
    }

    async fn find_by_id(&self, id: Uuid) -> PortResult<Reservation> {
        let sql = format!("SELECT {} FROM reservations WHERE id = $1", RESERVATION_COLUMNS);
        let record = sqlx::query_as::<_, ReservationRecord>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    PortError::NotFound(format!("Reservation {} not found", id))
                }
                other => map_sqlx_error(other),
            })?;
        record.to_domain()
    }

    async fn find_all_active(
        &self,
        trip: &Trip,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<Reservation>> {
        let sql = format!(
            "SELECT {} FROM reservations \
             WHERE schedule_id = $1 AND travel_date = $2 \
               AND (status = 'paid' OR (status = 'held' AND expires_at > $3)) \
             ORDER BY seat_number ASC",
            RESERVATION_COLUMNS
        );
        let records = sqlx::query_as::<_, ReservationRecord>(&sql)
            .bind(trip.schedule_id)
            .bind(trip.travel_date)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }
}

/// One open database transaction. Dropping it without `commit` rolls back.
pub struct PgLedgerTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    async fn lock_seat(&mut self, trip: &Trip, seat_number: u32) -> PortResult<()> {
        // Held until commit or rollback.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(lock_key(trip, seat_number))
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        debug!("Locked seat {} of {} {}", seat_number, trip.schedule_id, trip.travel_date);
        Ok(())
    }

    async fn find_active_for_seat(
        &mut self,
        trip: &Trip,
        seat_number: u32,
        now: DateTime<Utc>,
    ) -> PortResult<Option<Reservation>> {
        let sql = format!(
            "SELECT {} FROM reservations \
             WHERE schedule_id = $1 AND travel_date = $2 AND seat_number = $3 \
               AND (status = 'paid' OR (status = 'held' AND expires_at > $4)) \
             LIMIT 1 FOR UPDATE",
            RESERVATION_COLUMNS
        );
        let record = sqlx::query_as::<_, ReservationRecord>(&sql)
            .bind(trip.schedule_id)
            .bind(trip.travel_date)
            .bind(to_db_int(seat_number)?)
            .bind(now)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

        record.map(|r| r.to_domain()).transpose()
    }

    async fn find_for_update(&mut self, id: Uuid) -> PortResult<Reservation> {
        let sql = format!(
            "SELECT {} FROM reservations WHERE id = $1 FOR UPDATE",
            RESERVATION_COLUMNS
        );
        let record = sqlx::query_as::<_, ReservationRecord>(&sql)
            .bind(id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    PortError::NotFound(format!("Reservation {} not found", id))
                }
                other => map_sqlx_error(other),
            })?;
        record.to_domain()
    }

    async fn find_expired_holds(&mut self, now: DateTime<Utc>) -> PortResult<Vec<Reservation>> {
        // Rows a payment is settling right now are left for the next pass.
        let sql = format!(
            "SELECT {} FROM reservations \
             WHERE status = 'held' AND expires_at < $1 \
             FOR UPDATE SKIP LOCKED",
            RESERVATION_COLUMNS
        );
        let records = sqlx::query_as::<_, ReservationRecord>(&sql)
            .bind(now)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn insert(&mut self, reservation: &Reservation) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO reservations \
             (id, owner_id, schedule_id, travel_date, seat_number, status, expires_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(reservation.id)
        .bind(reservation.owner_id.as_str())
        .bind(reservation.schedule_id)
        .bind(reservation.travel_date)
        .bind(to_db_int(reservation.seat_number)?)
        .bind(reservation.status.as_str())
        .bind(reservation.expires_at)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn update_status(
        &mut self,
        id: Uuid,
        status: ReservationStatus,
        expires_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> PortResult<Reservation> {
        let sql = format!(
            "UPDATE reservations SET status = $2, expires_at = $3, updated_at = $4 \
             WHERE id = $1 RETURNING {}",
            RESERVATION_COLUMNS
        );
        let record = sqlx::query_as::<_, ReservationRecord>(&sql)
            .bind(id)
            .bind(status.as_str())
            .bind(expires_at)
            .bind(updated_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    PortError::NotFound(format!("Reservation {} not found", id))
                }
                other => map_sqlx_error(other),
            })?;
        record.to_domain()
    }

    async fn commit(self: Box<Self>) -> PortResult<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhaustion_is_transient() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            PortError::Transient(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            PortError::NotFound(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::ColumnNotFound("status".into())),
            PortError::Unexpected(_)
        ));
    }

    #[test]
    fn lock_keys_distinguish_seats_and_dates() {
        let trip = Trip::new(Uuid::nil(), NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        let next_day = Trip::new(Uuid::nil(), NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
        assert_ne!(lock_key(&trip, 1), lock_key(&trip, 11));
        assert_ne!(lock_key(&trip, 1), lock_key(&next_day, 1));
        assert_eq!(
            lock_key(&trip, 3),
            "00000000-0000-0000-0000-000000000000:2025-06-01:3"
        );
    }

    #[test]
    fn corrupt_rows_are_reported() {
        let now = Utc::now();
        let record = ReservationRecord {
            id: Uuid::new_v4(),
            owner_id: String::new(),
            schedule_id: Uuid::new_v4(),
            travel_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            seat_number: 1,
            status: "pending".to_string(),
            expires_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(record.to_domain(), Err(PortError::Unexpected(_))));
    }
}
