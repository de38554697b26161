use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use crate::errors::{AppError, BookingError};
use crate::handlers::bookings::CreateBookingRequest;
use crate::handlers::staff_actor;
use crate::models::player::deserialize_optional_level;
use crate::models::slot::hhmm;
use crate::models::{
    BookingStatus, Court, CourtUpdate, HistoryEntry, NewCourt, Payment, Player, RatingLevel,
    Reschedule,
};
use crate::services::booking::{BookingView, CancelPolicy};
use crate::services::notify::{self, Notice};
use crate::state::AppState;

// GET /api/admin/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<BookingView>>, AppError> {
    staff_actor(&headers, &state.config.admin_token)?;

    let status = match query.status.as_deref() {
        Some(raw) => Some(
            BookingStatus::parse(raw)
                .ok_or_else(|| AppError::BadRequest(format!("unknown status: {raw}")))?,
        ),
        None => None,
    };
    let limit = query.limit.unwrap_or(50).clamp(1, 500);

    let db = state.conn()?;
    let views = state
        .engine
        .list_bookings(&db, status, limit)?
        .into_iter()
        .map(|b| state.engine.view(&db, b))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(views))
}

// POST /api/admin/bookings
#[derive(Debug, Deserialize)]
pub struct QuickCreateRequest {
    pub owner_id: String,
    #[serde(flatten)]
    pub booking: CreateBookingRequest,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<QuickCreateRequest>,
) -> Result<(StatusCode, Json<BookingView>), AppError> {
    let actor = staff_actor(&headers, &state.config.admin_token)?;
    let now = state.now();

    let mut db = state.conn()?;
    let booking = state
        .engine
        .create_booking(&mut db, &actor, req.booking.into_new(req.owner_id), now)?;

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

// POST /api/admin/bookings/:id/cancel
#[derive(Debug, Default, Deserialize)]
pub struct StaffCancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub skip_cutoff: bool,
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<StaffCancelRequest>>,
) -> Result<Json<BookingView>, AppError> {
    let actor = staff_actor(&headers, &state.config.admin_token)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let policy = if req.skip_cutoff {
        CancelPolicy::SkipCutoff
    } else {
        CancelPolicy::Enforce
    };
    let now = state.now();

    let mut db = state.conn()?;
    let booking = state
        .engine
        .cancel_booking(&mut db, &actor, &id, now, policy, req.reason.as_deref())?;
    notify::to_participants(&db, &state.messaging, &booking, Notice::Cancelled { booking: &booking });
    Ok(Json(state.engine.view(&db, booking)?))
}

// POST /api/admin/bookings/:id/reschedule
#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    #[serde(default)]
    pub court_id: Option<String>,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
}

pub async fn reschedule_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RescheduleRequest>,
) -> Result<Json<BookingView>, AppError> {
    let actor = staff_actor(&headers, &state.config.admin_token)?;
    let now = state.now();
    let target = Reschedule {
        court_id: req.court_id,
        date: req.date,
        start_time: req.start_time,
        end_time: req.end_time,
    };

    let mut db = state.conn()?;
    let booking = state
        .engine
        .reschedule_booking(&mut db, &actor, &id, target, now)?;
    Ok(Json(state.engine.view(&db, booking)?))
}

// DELETE /api/admin/bookings/:id
pub async fn delete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let actor = staff_actor(&headers, &state.config.admin_token)?;
    let now = state.now();

    let mut db = state.conn()?;
    state.engine.delete_booking(&mut db, &actor, &id, now)?;
    Ok(StatusCode::NO_CONTENT)
}

// GET /api/admin/bookings/:id/history
pub async fn booking_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<HistoryEntry>>, AppError> {
    staff_actor(&headers, &state.config.admin_token)?;
    let db = state.conn()?;
    Ok(Json(state.engine.booking_history(&db, &id)?))
}

// POST /api/admin/courts
pub async fn create_court(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<NewCourt>,
) -> Result<(StatusCode, Json<Court>), AppError> {
    staff_actor(&headers, &state.config.admin_token)?;
    let db = state.conn()?;
    let court = state.engine.create_court(&db, req)?;
    Ok((StatusCode::CREATED, Json(court)))
}

// PATCH /api/admin/courts/:id
pub async fn update_court(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<CourtUpdate>,
) -> Result<Json<Court>, AppError> {
    staff_actor(&headers, &state.config.admin_token)?;
    let db = state.conn()?;
    Ok(Json(state.engine.update_court(&db, &id, req)?))
}

// DELETE /api/admin/courts/:id
pub async fn delete_court(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    staff_actor(&headers, &state.config.admin_token)?;
    let now = state.now();
    let mut db = state.conn()?;
    state.engine.delete_court(&mut db, &id, now)?;
    Ok(StatusCode::NO_CONTENT)
}

// GET /api/admin/players?phone=
#[derive(Debug, Deserialize)]
pub struct PlayerLookup {
    pub phone: String,
}

pub async fn find_player(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<PlayerLookup>,
) -> Result<Json<Player>, AppError> {
    staff_actor(&headers, &state.config.admin_token)?;
    let db = state.conn()?;
    state
        .engine
        .find_player_by_phone(&db, &query.phone)?
        .map(Json)
        .ok_or_else(|| BookingError::not_found("player", query.phone).into())
}

// PUT /api/admin/players/:id/rating
#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    #[serde(default, deserialize_with = "deserialize_optional_level")]
    pub rating: Option<RatingLevel>,
}

pub async fn set_rating(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RatingRequest>,
) -> Result<Json<Player>, AppError> {
    staff_actor(&headers, &state.config.admin_token)?;
    let db = state.conn()?;
    Ok(Json(state.engine.set_rating(&db, &id, req.rating)?))
}

// POST /api/admin/payments/:id/paid
#[derive(Debug, Default, Deserialize)]
pub struct MarkPaidRequest {
    #[serde(default)]
    pub transaction_id: Option<String>,
}

pub async fn mark_paid(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<MarkPaidRequest>>,
) -> Result<Json<Payment>, AppError> {
    let actor = staff_actor(&headers, &state.config.admin_token)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let now = state.now();

    let mut db = state.conn()?;
    let payment = state
        .engine
        .mark_paid(&mut db, &actor, &id, req.transaction_id.as_deref(), now)?;
    Ok(Json(payment))
}

// POST /api/admin/payments/:id/refund
pub async fn refund_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Payment>, AppError> {
    let actor = staff_actor(&headers, &state.config.admin_token)?;
    let now = state.now();

    let mut db = state.conn()?;
    Ok(Json(state.engine.refund_payment(&mut db, &actor, &id, now)?))
}
