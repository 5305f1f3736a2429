//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::state::{AppState, OwnerId};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::{DateTime, NaiveDate, Utc};
use seat_reservation_core::domain::{HoldReceipt, Reservation, SeatMap, SeatState, Trip};
use seat_reservation_core::trip_token;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        trip_token_handler,
        occupancy_handler,
        reserve_seats_handler,
        reserve_seat_handler,
        get_reservation_handler,
        confirm_payment_handler,
        cancel_reservation_handler,
        occupied_seats_handler,
    ),
    components(
        schemas(
            TripTokenResponse,
            SeatResponse,
            OccupancyResponse,
            ReserveSeatsRequest,
            ReserveSeatRequest,
            HoldResponse,
            ReservationResponse,
            OccupiedSeatsResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Seat Reservation API", description = "Seat availability, holds, payment confirmation and cancellation for scheduled bus trips.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TripTokenQuery {
    pub schedule_id: Uuid,
    /// Travel date, `YYYY-MM-DD`.
    pub travel_date: NaiveDate,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct TripTokenResponse {
    pub trip_token: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SeatResponse {
    pub number: u32,
    /// `available` or `occupied`.
    pub status: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct OccupancyResponse {
    pub trip_token: String,
    pub schedule_id: Uuid,
    pub travel_date: NaiveDate,
    pub capacity: u32,
    pub fare_cents: i64,
    pub seats: Vec<SeatResponse>,
}

impl OccupancyResponse {
    fn from_domain(map: SeatMap) -> Self {
        Self {
            trip_token: trip_token::encode(&map.trip),
            schedule_id: map.trip.schedule_id,
            travel_date: map.trip.travel_date,
            capacity: map.capacity,
            fare_cents: map.fare_cents,
            seats: map
                .seats
                .into_iter()
                .map(|s| SeatResponse {
                    number: s.number,
                    status: match s.state {
                        SeatState::Available => "available",
                        SeatState::Occupied => "occupied",
                    }
                    .to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ReserveSeatsRequest {
    pub seat_numbers: Vec<u32>,
    /// Overrides the `x-owner-id` header when present.
    pub owner_id: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ReserveSeatRequest {
    pub schedule_id: Uuid,
    pub travel_date: NaiveDate,
    pub seat_number: u32,
    pub owner_id: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ReservationResponse {
    pub id: Uuid,
    pub owner_id: String,
    pub schedule_id: Uuid,
    pub travel_date: NaiveDate,
    pub seat_number: u32,
    /// `held`, `paid` or `cancelled`.
    pub status: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Reservation> for ReservationResponse {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id,
            owner_id: r.owner_id,
            schedule_id: r.schedule_id,
            travel_date: r.travel_date,
            seat_number: r.seat_number,
            status: r.status.as_str().to_string(),
            expires_at: r.expires_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct HoldResponse {
    /// Seat numbers in request order.
    pub reserved: Vec<u32>,
    pub reservations: Vec<ReservationResponse>,
    pub expires_at: DateTime<Utc>,
}

impl From<HoldReceipt> for HoldResponse {
    fn from(receipt: HoldReceipt) -> Self {
        Self {
            reserved: receipt.reserved,
            reservations: receipt.reservations.into_iter().map(Into::into).collect(),
            expires_at: receipt.expires_at,
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OccupiedSeatsQuery {
    pub travel_date: NaiveDate,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct OccupiedSeatsResponse {
    pub schedule_id: Uuid,
    pub travel_date: NaiveDate,
    pub occupied_seats: Vec<u32>,
    pub seats_remaining: u32,
}

/// Body of every non-2xx response.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
    /// Present on seat conflicts.
    pub seats: Option<Vec<u32>>,
}

fn pick_owner(body_owner: Option<String>, header_owner: OwnerId) -> String {
    body_owner.unwrap_or(header_owner.0)
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Mint the opaque token for a schedule on a date.
#[utoipa::path(
    get,
    path = "/trips/token",
    params(TripTokenQuery),
    responses(
        (status = 200, description = "Trip token", body = TripTokenResponse),
        (status = 400, description = "Malformed query", body = ErrorResponse)
    )
)]
pub async fn trip_token_handler(
    State(app_state): State<Arc<AppState>>,
    query: Result<Query<TripTokenQuery>, QueryRejection>,
) -> Result<Json<TripTokenResponse>, ApiError> {
    let Query(query) = query?;
    Ok(Json(TripTokenResponse {
        trip_token: app_state
            .engine
            .trip_token(query.schedule_id, query.travel_date),
    }))
}

/// Seat map of a trip. Advisory; the reserve call re-checks.
#[utoipa::path(
    get,
    path = "/trips/{trip_token}/seats",
    params(("trip_token" = String, Path, description = "Opaque trip token.")),
    responses(
        (status = 200, description = "Seat map", body = OccupancyResponse),
        (status = 400, description = "Invalid token or unknown schedule", body = ErrorResponse)
    )
)]
pub async fn occupancy_handler(
    State(app_state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<OccupancyResponse>, ApiError> {
    let map = app_state.engine.occupancy(&token).await?;
    Ok(Json(OccupancyResponse::from_domain(map)))
}

/// Hold one or more seats for ten minutes, all or none.
#[utoipa::path(
    post,
    path = "/trips/{trip_token}/reservations",
    request_body = ReserveSeatsRequest,
    params(
        ("trip_token" = String, Path, description = "Opaque trip token."),
        ("x-owner-id" = Option<String>, Header, description = "Caller identity.")
    ),
    responses(
        (status = 201, description = "Seats held", body = HoldResponse),
        (status = 400, description = "Invalid token or seat selection", body = ErrorResponse),
        (status = 409, description = "Seat no longer available", body = ErrorResponse),
        (status = 503, description = "Storage busy, retry", body = ErrorResponse)
    )
)]
pub async fn reserve_seats_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(owner): Extension<OwnerId>,
    Path(token): Path<String>,
    payload: Result<Json<ReserveSeatsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<HoldResponse>), ApiError> {
    let Json(payload) = payload?;
    let owner_id = pick_owner(payload.owner_id, owner);
    let receipt = app_state
        .engine
        .reserve_seats(&token, &payload.seat_numbers, &owner_id)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt.into())))
}

/// Hold a single seat addressed by schedule and date.
#[utoipa::path(
    post,
    path = "/reservations",
    request_body = ReserveSeatRequest,
    params(("x-owner-id" = Option<String>, Header, description = "Caller identity.")),
    responses(
        (status = 201, description = "Seat held", body = HoldResponse),
        (status = 400, description = "Invalid seat or unknown schedule", body = ErrorResponse),
        (status = 409, description = "Seat no longer available", body = ErrorResponse)
    )
)]
pub async fn reserve_seat_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(owner): Extension<OwnerId>,
    payload: Result<Json<ReserveSeatRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<HoldResponse>), ApiError> {
    let Json(payload) = payload?;
    let owner_id = pick_owner(payload.owner_id, owner);
    let trip = Trip::new(payload.schedule_id, payload.travel_date);
    let receipt = app_state
        .engine
        .reserve_seat(trip, payload.seat_number, &owner_id)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt.into())))
}

#[utoipa::path(
    get,
    path = "/reservations/{id}",
    params(("id" = Uuid, Path, description = "Reservation id.")),
    responses(
        (status = 200, description = "Reservation", body = ReservationResponse),
        (status = 400, description = "Malformed reservation id", body = ErrorResponse),
        (status = 404, description = "Unknown reservation", body = ErrorResponse)
    )
)]
pub async fn get_reservation_handler(
    State(app_state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let Path(id) = id?;
    let reservation = app_state.engine.get_reservation(id).await?;
    Ok(Json(reservation.into()))
}

/// Mark a live hold as paid. Repeating the call returns the paid row.
#[utoipa::path(
    post,
    path = "/reservations/{id}/confirm-payment",
    params(("id" = Uuid, Path, description = "Reservation id.")),
    responses(
        (status = 200, description = "Reservation is paid", body = ReservationResponse),
        (status = 400, description = "Malformed reservation id", body = ErrorResponse),
        (status = 404, description = "Unknown reservation", body = ErrorResponse),
        (status = 409, description = "Hold has expired", body = ErrorResponse)
    )
)]
pub async fn confirm_payment_handler(
    State(app_state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let Path(id) = id?;
    let reservation = app_state.engine.confirm_payment(id).await?;
    info!("Payment confirmed for reservation {}", id);
    Ok(Json(reservation.into()))
}

/// Release a reservation in any state. Repeating the call is a no-op.
#[utoipa::path(
    post,
    path = "/reservations/{id}/cancel",
    params(("id" = Uuid, Path, description = "Reservation id.")),
    responses(
        (status = 200, description = "Reservation is cancelled", body = ReservationResponse),
        (status = 400, description = "Malformed reservation id", body = ErrorResponse),
        (status = 404, description = "Unknown reservation", body = ErrorResponse)
    )
)]
pub async fn cancel_reservation_handler(
    State(app_state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let Path(id) = id?;
    let reservation = app_state.engine.cancel(id).await?;
    Ok(Json(reservation.into()))
}

/// Occupied seat numbers and remaining capacity for a schedule on a date.
#[utoipa::path(
    get,
    path = "/schedules/{schedule_id}/occupied-seats",
    params(
        ("schedule_id" = Uuid, Path, description = "Schedule id."),
        OccupiedSeatsQuery
    ),
    responses(
        (status = 200, description = "Occupied seats", body = OccupiedSeatsResponse),
        (status = 400, description = "Unknown schedule or malformed query", body = ErrorResponse)
    )
)]
pub async fn occupied_seats_handler(
    State(app_state): State<Arc<AppState>>,
    schedule_id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<OccupiedSeatsQuery>, QueryRejection>,
) -> Result<Json<OccupiedSeatsResponse>, ApiError> {
    let Path(schedule_id) = schedule_id?;
    let Query(query) = query?;
    let tally = app_state
        .engine
        .seat_tally(schedule_id, query.travel_date)
        .await?;

    Ok(Json(OccupiedSeatsResponse {
        schedule_id,
        travel_date: query.travel_date,
        occupied_seats: tally.occupied,
        seats_remaining: tally.remaining,
    }))
}
