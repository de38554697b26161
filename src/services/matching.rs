use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{Actor, Booking, BookingStatus, HistoryAction, Player};
use crate::services::{begin, history, Engine};

/// Checks, in order: the booking is looking for partners, has room, does not
/// already include the candidate, is not cancelled, and the candidate meets
/// the required rating.
pub fn can_join(booking: &Booking, candidate: &Player) -> Result<(), BookingError> {
    if !booking.looking_for_partner {
        return Err(BookingError::NotLooking);
    }
    if booking.is_full() {
        return Err(BookingError::Full);
    }
    if booking.is_member(&candidate.id) {
        return Err(BookingError::AlreadyIn);
    }
    if booking.status == BookingStatus::Cancelled {
        return Err(BookingError::Cancelled);
    }
    if let Some(required) = &booking.required_rating_level {
        match &candidate.rating {
            None => {
                return Err(BookingError::NoRating {
                    required: required.clone(),
                })
            }
            Some(rating) if rating != required => {
                return Err(BookingError::RatingMismatch {
                    required: required.clone(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Adds `candidate` to the booking inside the caller's transaction and
/// updates `booking.partners` to match.
pub(crate) fn add_partner(
    conn: &Connection,
    booking: &mut Booking,
    candidate: &Player,
    actor: &Actor,
    now: NaiveDateTime,
) -> Result<(), BookingError> {
    can_join(booking, candidate)?;

    if !queries::insert_partner(conn, &booking.id, &candidate.id, now)? {
        return Err(BookingError::AlreadyIn);
    }
    booking.partners.push(candidate.id.clone());

    history::record(
        conn,
        &booking.id,
        HistoryAction::PartnerJoined,
        actor,
        serde_json::json!({
            "player_id": candidate.id,
            "participants": booking.participant_count(),
            "max_players": booking.max_players,
        }),
        None,
        now,
    )?;
    Ok(())
}

impl Engine {
    /// The calling player joins an open booking directly.
    pub fn join_booking(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        booking_id: &str,
        now: NaiveDateTime,
    ) -> Result<Booking, BookingError> {
        let player_id = match actor {
            Actor::Player(id) => id.as_str(),
            _ => return Err(BookingError::Forbidden("only players can join bookings")),
        };

        let tx = begin(conn)?;
        let mut booking = queries::get_booking(&tx, booking_id)?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        let candidate = queries::get_player(&tx, player_id)?
            .ok_or_else(|| BookingError::not_found("player", player_id))?;

        add_partner(&tx, &mut booking, &candidate, actor, now)?;
        self.commit(tx, &[])?;

        tracing::info!(booking_id, player_id, "partner joined booking");
        Ok(booking)
    }
}
