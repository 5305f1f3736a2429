//! Ledger behaviour against a real PostgreSQL database.
//!
//! Run with `DATABASE_URL=postgres://... cargo test -- --ignored` against a
//! disposable database; migrations are applied on connect.

use api_lib::adapters::db::DbAdapter;
use chrono::{Duration, NaiveDate, Utc};
use futures::future::join_all;
use seat_reservation_core::{
    trip_token, Clock, EngineError, EngineSettings, LedgerTransaction, ManualClock, Reservation,
    ReservationEngine, ReservationLedger, ReservationStatus, SystemClock, Trip,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

async fn connect_with(settings: EngineSettings) -> (Arc<DbAdapter>, Arc<ReservationEngine>) {
    connect_with_clock(settings, Arc::new(SystemClock)).await
}

async fn connect_with_clock(
    settings: EngineSettings,
    clock: Arc<dyn Clock>,
) -> (Arc<DbAdapter>, Arc<ReservationEngine>) {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&url)
        .await
        .expect("connect");
    let db = Arc::new(DbAdapter::new(pool));
    db.run_migrations().await.expect("migrations");
    let engine = Arc::new(ReservationEngine::new(
        db.clone(),
        db.clone(),
        clock,
        settings,
    ));
    (db, engine)
}

async fn connect() -> (Arc<DbAdapter>, Arc<ReservationEngine>) {
    connect_with(EngineSettings::default()).await
}

async fn fresh_trip(db: &DbAdapter, capacity: u32) -> Trip {
    let vehicle_id = db.insert_vehicle(capacity).await.expect("vehicle");
    let schedule_id = db.insert_schedule(vehicle_id, 2_500).await.expect("schedule");
    Trip::new(schedule_id, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_reserves_on_one_seat_have_one_winner() {
    let (db, engine) = connect().await;
    let token = trip_token::encode(&fresh_trip(&db, 40).await);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let token = token.clone();
            tokio::spawn(async move {
                engine
                    .reserve_seats(&token, &[7], &format!("owner-{}", i))
                    .await
            })
        })
        .collect();
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, EngineError::SeatConflict { .. })));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn batch_conflict_leaves_no_partial_rows() {
    let (db, engine) = connect().await;
    let trip = fresh_trip(&db, 10).await;
    let token = trip_token::encode(&trip);

    engine.reserve_seats(&token, &[4], "a").await.unwrap();
    let err = engine.reserve_seats(&token, &[3, 4, 5], "b").await.unwrap_err();
    assert_eq!(err, EngineError::SeatConflict { seats: vec![4] });

    let occupied = engine
        .occupied_seat_numbers(trip.schedule_id, trip.travel_date)
        .await
        .unwrap();
    assert_eq!(occupied, vec![4]);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn pay_cancel_and_sweep_round_trip() {
    let (db, engine) = connect_with(EngineSettings {
        hold_duration: Duration::seconds(1),
        ..EngineSettings::default()
    })
    .await;
    let trip = fresh_trip(&db, 4).await;
    let token = trip_token::encode(&trip);

    let receipt = engine.reserve_seats(&token, &[1, 2], "a").await.unwrap();
    let paid = engine
        .confirm_payment(receipt.reservations[1].id)
        .await
        .unwrap();
    assert_eq!(paid.status, ReservationStatus::Paid);
    assert_eq!(engine.confirm_payment(paid.id).await.unwrap(), paid);

    tokio::time::sleep(std::time::Duration::from_millis(1_500)).await;
    engine.sweep(SystemClock.now()).await.unwrap();
    let swept = engine
        .get_reservation(receipt.reservations[0].id)
        .await
        .unwrap();
    assert_eq!(swept.status, ReservationStatus::Cancelled);
    assert_eq!(swept.expires_at, None);
    assert_eq!(
        engine.get_reservation(paid.id).await.unwrap().status,
        ReservationStatus::Paid
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires DATABASE_URL"]
async fn payment_waits_for_a_reserve_judging_the_same_seat() {
    let start = Utc::now();
    let clock = Arc::new(ManualClock::new(start));
    let (db, engine) = connect_with_clock(EngineSettings::default(), clock.clone()).await;
    let trip = fresh_trip(&db, 4).await;
    let token = trip_token::encode(&trip);
    let stale = engine.reserve_seats(&token, &[3], "a").await.unwrap().reservations[0].id;

    // A reserve that sees the first hold lapsed is mid-transaction on seat 3.
    let mut tx = db.begin().await.unwrap();
    tx.lock_seat(&trip, 3).await.unwrap();
    let reserve_now = start + Duration::minutes(11);
    assert!(tx
        .find_active_for_seat(&trip, 3, reserve_now)
        .await
        .unwrap()
        .is_none());
    let resold = Reservation::new_hold("b", trip, 3, reserve_now, reserve_now + Duration::minutes(10));
    tx.insert(&resold).await.unwrap();

    // The payment is issued before the deadline but must wait for the seat.
    clock.set(start + Duration::minutes(5));
    let payment = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.confirm_payment(stale).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    clock.set(reserve_now);
    tx.commit().await.unwrap();

    assert_eq!(
        payment.await.expect("task panicked").unwrap_err(),
        EngineError::HoldExpired(stale)
    );
    let occupied = engine
        .occupied_seat_numbers(trip.schedule_id, trip.travel_date)
        .await
        .unwrap();
    assert_eq!(occupied, vec![3]);
    assert_eq!(
        engine.get_reservation(resold.id).await.unwrap().status,
        ReservationStatus::Held
    );
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn second_payment_for_a_seat_is_a_typed_error() {
    let start = Utc::now();
    let clock = Arc::new(ManualClock::new(start));
    let (db, engine) = connect_with_clock(EngineSettings::default(), clock.clone()).await;
    let trip = fresh_trip(&db, 4).await;
    let token = trip_token::encode(&trip);

    let stale = engine.reserve_seats(&token, &[2], "a").await.unwrap().reservations[0].id;
    clock.set(start + Duration::minutes(11));
    let resold = engine.reserve_seats(&token, &[2], "b").await.unwrap().reservations[0].id;
    engine.confirm_payment(resold).await.unwrap();

    clock.set(start + Duration::minutes(5));
    assert_eq!(
        engine.confirm_payment(stale).await.unwrap_err(),
        EngineError::HoldExpired(stale)
    );
}
