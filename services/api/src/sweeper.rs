//! services/api/src/sweeper.rs
//!
//! The background task that cancels lapsed holds on a fixed interval.
//! It runs until its `CancellationToken` fires at shutdown.

use seat_reservation_core::engine::ReservationEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Runs `sweep` every `interval` until cancelled. The first pass runs immediately.
pub async fn run_sweeper(
    engine: Arc<ReservationEngine>,
    interval: Duration,
    cancellation_token: CancellationToken,
) {
    info!("Expiry sweeper started (every {:?}).", interval);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => {
                info!("Expiry sweeper stopped.");
                return;
            }
            _ = ticker.tick() => {
                match engine.expire_stale_holds().await {
                    Ok(0) => debug!("Sweep found no lapsed holds."),
                    Ok(released) => info!("Sweep released {} lapsed holds.", released),
                    Err(e) => error!("Sweep failed, will retry next tick: {}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use seat_reservation_core::{
        EngineSettings, InMemoryCatalog, InMemoryLedger, ManualClock, ReservationStatus,
    };

    #[tokio::test(start_paused = true)]
    async fn releases_lapsed_holds_until_cancelled() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let schedule_id = catalog.add_trip_schedule(4, 1_500);
        let ledger = InMemoryLedger::new();
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let engine = Arc::new(ReservationEngine::new(
            catalog,
            Arc::new(ledger.clone()),
            clock.clone(),
            EngineSettings::default(),
        ));
        let token = engine.trip_token(schedule_id, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());

        let first = engine.reserve_seats(&token, &[1], "a").await.unwrap().reservations[0].id;
        clock.advance(chrono::Duration::minutes(11));

        let stop = CancellationToken::new();
        let handle = tokio::spawn(run_sweeper(
            Arc::clone(&engine),
            Duration::from_secs(60),
            stop.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            engine.get_reservation(first).await.unwrap().status,
            ReservationStatus::Cancelled
        );

        let second = engine.reserve_seats(&token, &[2], "b").await.unwrap().reservations[0].id;
        clock.advance(chrono::Duration::minutes(11));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(
            engine.get_reservation(second).await.unwrap().status,
            ReservationStatus::Cancelled
        );

        stop.cancel();
        handle.await.unwrap();
    }
}
