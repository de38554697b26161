pub mod admin;
pub mod bookings;
pub mod health;
pub mod invitations;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::models::Actor;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/courts", get(bookings::list_courts))
        .route("/api/courts/:id/slots", get(bookings::court_slots))
        .route("/api/players", post(bookings::register_player))
        .route("/api/bookings", post(bookings::create_booking))
        .route("/api/bookings/mine", get(bookings::my_bookings))
        .route("/api/bookings/open", get(bookings::open_bookings))
        .route("/api/bookings/:id", get(bookings::get_booking))
        .route("/api/bookings/:id/confirm", post(bookings::confirm_booking))
        .route("/api/bookings/:id/cancel", post(bookings::cancel_booking))
        .route("/api/bookings/:id/join", post(bookings::join_booking))
        .route("/api/bookings/:id/payment", post(bookings::create_payment))
        .route(
            "/api/bookings/:id/invitations",
            get(invitations::booking_invitations).post(invitations::send_invitation),
        )
        .route("/api/invitations", get(invitations::my_invitations))
        .route(
            "/api/invitations/:id/respond",
            post(invitations::respond_invitation),
        )
        .route(
            "/api/invitations/:id/cancel",
            post(invitations::cancel_invitation),
        )
        .route(
            "/api/admin/bookings",
            get(admin::list_bookings).post(admin::create_booking),
        )
        .route("/api/admin/bookings/:id", delete(admin::delete_booking))
        .route("/api/admin/bookings/:id/cancel", post(admin::cancel_booking))
        .route(
            "/api/admin/bookings/:id/reschedule",
            post(admin::reschedule_booking),
        )
        .route("/api/admin/bookings/:id/history", get(admin::booking_history))
        .route("/api/admin/courts", post(admin::create_court))
        .route(
            "/api/admin/courts/:id",
            patch(admin::update_court).delete(admin::delete_court),
        )
        .route("/api/admin/players", get(admin::find_player))
        .route("/api/admin/players/:id/rating", put(admin::set_rating))
        .route("/api/admin/payments/:id/paid", post(admin::mark_paid))
        .route("/api/admin/payments/:id/refund", post(admin::refund_payment))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// The calling player, as identified by the upstream auth layer.
pub(crate) fn player_actor(headers: &HeaderMap) -> Result<Actor, AppError> {
    header(headers, "x-user-id")
        .map(|id| Actor::Player(id.to_string()))
        .ok_or(AppError::Unauthorized)
}

/// Staff calls carry the admin token and the acting staff member's id.
pub(crate) fn staff_actor(headers: &HeaderMap, expected_token: &str) -> Result<Actor, AppError> {
    let token = header(headers, "authorization")
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .unwrap_or("");
    if expected_token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }

    let staff_id = header(headers, "x-staff-id")
        .ok_or_else(|| AppError::BadRequest("x-staff-id header is required".to_string()))?;
    Ok(Actor::Staff(staff_id.to_string()))
}
