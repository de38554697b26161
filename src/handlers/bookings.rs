use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::handlers::player_actor;
use crate::models::slot::hhmm;
use crate::models::{BookingOptions, Court, NewBooking, NewPlayer, Payment, Player, SlotView};
use crate::services::booking::{BookingView, CancelPolicy};
use crate::services::notify::{self, Notice};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub court_id: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(flatten)]
    pub options: BookingOptions,
}

impl CreateBookingRequest {
    pub fn into_new(self, owner_id: String) -> NewBooking {
        NewBooking {
            owner_id,
            court_id: self.court_id,
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            options: self.options,
        }
    }
}

#[derive(Serialize)]
pub struct BookingDetails {
    #[serde(flatten)]
    view: BookingView,
    hours_until_confirmable: i64,
}

// GET /api/courts
pub async fn list_courts(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Court>>, AppError> {
    let db = state.conn()?;
    Ok(Json(state.engine.list_courts(&db)?))
}

// GET /api/courts/:id/slots?date=YYYY-MM-DD
#[derive(Deserialize)]
pub struct SlotsQuery {
    pub date: NaiveDate,
}

pub async fn court_slots(
    State(state): State<Arc<AppState>>,
    Path(court_id): Path<String>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Vec<SlotView>>, AppError> {
    let now = state.now();
    let db = state.conn()?;
    let slots = state
        .engine
        .list_available_slots(&db, &court_id, query.date, now)?;
    Ok(Json(slots))
}

// POST /api/players
pub async fn register_player(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewPlayer>,
) -> Result<(StatusCode, Json<Player>), AppError> {
    let now = state.now();
    let db = state.conn()?;
    let player = state.engine.register_player(&db, req, now)?;
    Ok((StatusCode::CREATED, Json(player)))
}

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingView>), AppError> {
    let actor = player_actor(&headers)?;
    let owner_id = actor.user_id().unwrap_or_default().to_string();
    let now = state.now();

    let mut db = state.conn()?;
    let booking = state
        .engine
        .create_booking(&mut db, &actor, req.into_new(owner_id), now)?;

    let court = state.engine.get_court(&db, &booking.court_id)?;
    notify::to_player(
        &db,
        &state.messaging,
        &booking.owner_id,
        Notice::Created {
            booking: &booking,
            court_name: &court.name,
        },
    );

    Ok((StatusCode::CREATED, Json(state.engine.view(&db, booking)?)))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingDetails>, AppError> {
    player_actor(&headers)?;
    let now = state.now();

    let db = state.conn()?;
    let booking = state.engine.get_booking(&db, &id)?;
    let hours_until_confirmable = state.engine.hours_until_confirmable(&booking, now);
    Ok(Json(BookingDetails {
        view: state.engine.view(&db, booking)?,
        hours_until_confirmable,
    }))
}

// GET /api/bookings/mine
pub async fn my_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<BookingView>>, AppError> {
    let actor = player_actor(&headers)?;
    let player_id = actor.user_id().unwrap_or_default();

    let db = state.conn()?;
    let views = state
        .engine
        .bookings_for_player(&db, player_id)?
        .into_iter()
        .map(|b| state.engine.view(&db, b))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(views))
}

// GET /api/bookings/open
pub async fn open_bookings(State(state): State<Arc<AppState>>) -> Result<Json<Vec<BookingView>>, AppError> {
    let now = state.now();
    let db = state.conn()?;
    let views = state
        .engine
        .open_bookings(&db, now)?
        .into_iter()
        .map(|b| state.engine.view(&db, b))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(views))
}

// POST /api/bookings/:id/confirm
pub async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingView>, AppError> {
    let actor = player_actor(&headers)?;
    let now = state.now();

    let mut db = state.conn()?;
    let booking = state.engine.confirm_booking(&mut db, &actor, &id, now)?;
    notify::to_player(&db, &state.messaging, &booking.owner_id, Notice::Confirmed { booking: &booking });
    Ok(Json(state.engine.view(&db, booking)?))
}

// POST /api/bookings/:id/cancel
#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<BookingView>, AppError> {
    let actor = player_actor(&headers)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let now = state.now();

    let mut db = state.conn()?;
    let booking = state.engine.cancel_booking(
        &mut db,
        &actor,
        &id,
        now,
        CancelPolicy::Enforce,
        req.reason.as_deref(),
    )?;
    notify::to_participants(&db, &state.messaging, &booking, Notice::Cancelled { booking: &booking });
    Ok(Json(state.engine.view(&db, booking)?))
}

// POST /api/bookings/:id/join
pub async fn join_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingView>, AppError> {
    let actor = player_actor(&headers)?;
    let now = state.now();

    let mut db = state.conn()?;
    let booking = state.engine.join_booking(&mut db, &actor, &id, now)?;

    if let Some(partner_id) = booking.partners.last() {
        let partner = state.engine.get_player(&db, partner_id)?;
        notify::to_player(
            &db,
            &state.messaging,
            &booking.owner_id,
            Notice::PartnerJoined {
                booking: &booking,
                partner_name: &partner.display_name,
            },
        );
    }

    Ok(Json(state.engine.view(&db, booking)?))
}

// POST /api/bookings/:id/payment
#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub method: String,
}

pub async fn create_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    let actor = player_actor(&headers)?;
    let now = state.now();

    let mut db = state.conn()?;
    let payment = state
        .engine
        .create_payment(&mut db, &actor, &id, &req.method, now)?;
    Ok((StatusCode::CREATED, Json(payment)))
}
