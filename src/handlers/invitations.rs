use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::handlers::player_actor;
use crate::models::Invitation;
use crate::services::notify::{self, Notice};
use crate::state::AppState;

// POST /api/bookings/:id/invitations
#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub phone: String,
    #[serde(default)]
    pub message: Option<String>,
}

pub async fn send_invitation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
    Json(req): Json<InviteRequest>,
) -> Result<(StatusCode, Json<Invitation>), AppError> {
    let actor = player_actor(&headers)?;
    let now = state.now();

    let mut db = state.conn()?;
    let invitation = state
        .engine
        .send_invitation(&mut db, &actor, &booking_id, &req.phone, req.message, now)?;

    if let Some(invitee_id) = &invitation.invitee_id {
        let booking = state.engine.get_booking(&db, &booking_id)?;
        let inviter = state.engine.get_player(&db, &invitation.inviter_id)?;
        notify::to_player(
            &db,
            &state.messaging,
            invitee_id,
            Notice::Invited {
                booking: &booking,
                inviter_name: &inviter.display_name,
            },
        );
    }

    Ok((StatusCode::CREATED, Json(invitation)))
}

// GET /api/bookings/:id/invitations
pub async fn booking_invitations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
) -> Result<Json<Vec<Invitation>>, AppError> {
    let actor = player_actor(&headers)?;
    let db = state.conn()?;
    Ok(Json(state.engine.invitations_for_booking(&db, &actor, &booking_id)?))
}

// GET /api/invitations
pub async fn my_invitations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Invitation>>, AppError> {
    let actor = player_actor(&headers)?;
    let db = state.conn()?;
    let invitations = state
        .engine
        .pending_invitations_for(&db, actor.user_id().unwrap_or_default())?;
    Ok(Json(invitations))
}

// POST /api/invitations/:id/respond
#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub accept: bool,
}

pub async fn respond_invitation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<Invitation>, AppError> {
    let actor = player_actor(&headers)?;
    let now = state.now();

    let mut db = state.conn()?;
    let invitation = state
        .engine
        .respond_invitation(&mut db, &actor, &id, req.accept, now)?;

    if req.accept {
        let booking = state.engine.get_booking(&db, &invitation.booking_id)?;
        let partner_name = match actor.user_id() {
            Some(id) => state.engine.get_player(&db, id)?.display_name,
            None => String::new(),
        };
        notify::to_player(
            &db,
            &state.messaging,
            &booking.owner_id,
            Notice::PartnerJoined {
                booking: &booking,
                partner_name: &partner_name,
            },
        );
    }

    Ok(Json(invitation))
}

// POST /api/invitations/:id/cancel
pub async fn cancel_invitation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Invitation>, AppError> {
    let actor = player_actor(&headers)?;
    let now = state.now();

    let mut db = state.conn()?;
    let invitation = state.engine.cancel_invitation(&mut db, &actor, &id, now)?;
    Ok(Json(invitation))
}
