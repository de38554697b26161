use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::booking::{DEFAULT_MAX_PLAYERS, MAX_PLAYERS, MIN_PLAYERS};
use crate::models::{
    Actor, Booking, BookingStatus, HistoryAction, HistoryEntry, NewBooking, Reschedule,
};
use crate::services::pricing::{self, BookingPrice};
use crate::services::scheduling::find_conflict;
use crate::services::{begin, history, Engine};

/// Whether the cancellation cutoff applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelPolicy {
    #[default]
    Enforce,
    /// Staff and system override. The booking still must not be in the past.
    SkipCutoff,
}

/// A booking with its derived price and capacity.
#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    #[serde(flatten)]
    pub price: BookingPrice,
    pub available_slots: usize,
    pub is_full: bool,
}

/// Whole hours until `starts_at` enters the confirmation window, 0 if it
/// already has.
pub fn hours_until_confirmable(starts_at: NaiveDateTime, now: NaiveDateTime, window: Duration) -> i64 {
    let until_start = starts_at - now;
    if until_start <= window {
        0
    } else {
        (until_start - window).num_hours()
    }
}

impl Engine {
    pub fn create_booking(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        req: NewBooking,
        now: NaiveDateTime,
    ) -> Result<Booking, BookingError> {
        if let Actor::Player(id) = actor {
            if *id != req.owner_id {
                return Err(BookingError::Forbidden("players can only book for themselves"));
            }
        }

        self.rules
            .validate_request(req.date, req.start_time, req.end_time, now)?;

        let max_players = req.options.max_players.unwrap_or(DEFAULT_MAX_PLAYERS);
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&max_players) {
            return Err(BookingError::InvalidMaxPlayers(max_players));
        }

        let tx = begin(conn)?;

        let court = queries::get_court(&tx, &req.court_id)?
            .ok_or_else(|| BookingError::not_found("court", &req.court_id))?;
        if !court.is_available {
            return Err(BookingError::CourtUnavailable);
        }
        queries::get_player(&tx, &req.owner_id)?
            .ok_or_else(|| BookingError::not_found("player", &req.owner_id))?;

        if let Some(coach_id) = &req.options.coach_id {
            let coach = queries::get_player(&tx, coach_id)?
                .ok_or_else(|| BookingError::not_found("player", coach_id))?;
            if !coach.is_coach {
                return Err(BookingError::NotACoach);
            }
        }

        if let Some(existing) = find_conflict(
            &tx,
            &req.court_id,
            req.date,
            req.start_time,
            req.end_time,
            None,
        )? {
            return Err(BookingError::SlotTaken(Box::new(existing)));
        }

        let booking = Booking {
            id: uuid::Uuid::new_v4().to_string(),
            court_id: req.court_id,
            owner_id: req.owner_id,
            coach_id: req.options.coach_id,
            date: req.date,
            start_time: req.start_time,
            end_time: req.end_time,
            status: BookingStatus::Pending,
            looking_for_partner: req.options.looking_for_partner,
            max_players,
            required_rating_level: req
                .options
                .required_rating_level
                .filter(|r| !r.as_str().is_empty()),
            partners: vec![],
            created_at: now,
            updated_at: now,
            confirmed_at: None,
        };
        queries::insert_booking(&tx, &booking)?;

        if let Some(existing) = find_conflict(
            &tx,
            &booking.court_id,
            booking.date,
            booking.start_time,
            booking.end_time,
            Some(booking.id.as_str()),
        )? {
            tracing::warn!(
                booking_id = %booking.id,
                conflicting_id = %existing.id,
                "overlap detected after insert, rolling back"
            );
            return Err(BookingError::SlotTaken(Box::new(existing)));
        }

        let price = pricing::total_price(court.price_per_hour, booking.start_time, booking.end_time);
        history::record(
            &tx,
            &booking.id,
            HistoryAction::Created,
            actor,
            serde_json::json!({
                "court_id": booking.court_id,
                "date": booking.date,
                "start_time": booking.start_time.format("%H:%M").to_string(),
                "end_time": booking.end_time.format("%H:%M").to_string(),
                "price": price,
            }),
            None,
            now,
        )?;

        self.commit(tx, &[(booking.court_id.as_str(), booking.date)])?;

        tracing::info!(
            booking_id = %booking.id,
            court_id = %booking.court_id,
            actor = %actor.label(),
            "booking created"
        );
        Ok(booking)
    }

    pub fn confirm_booking(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        booking_id: &str,
        now: NaiveDateTime,
    ) -> Result<Booking, BookingError> {
        let tx = begin(conn)?;
        let mut booking = queries::get_booking(&tx, booking_id)?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;

        if !actor.is(&booking.owner_id) && !actor.is_privileged() {
            return Err(BookingError::Forbidden("only the owner or staff can confirm a booking"));
        }
        if booking.status != BookingStatus::Pending {
            return Err(BookingError::WrongState(booking.status));
        }

        let window = self.rules.confirm_window();
        let until_start = booking.starts_at() - now;
        if until_start <= Duration::zero() || until_start > window {
            return Err(BookingError::OutsideWindow {
                window_hours: self.rules.confirm_window_hours,
                hours_until: hours_until_confirmable(booking.starts_at(), now, window),
            });
        }

        queries::update_booking_status(&tx, booking_id, BookingStatus::Confirmed, now)?;
        history::record(
            &tx,
            booking_id,
            HistoryAction::Confirmed,
            actor,
            serde_json::json!({ "from": booking.status, "to": BookingStatus::Confirmed }),
            None,
            now,
        )?;
        self.commit(tx, &[])?;

        booking.status = BookingStatus::Confirmed;
        booking.confirmed_at = Some(now);
        booking.updated_at = now;

        tracing::info!(booking_id, actor = %actor.label(), "booking confirmed");
        Ok(booking)
    }

    pub fn hours_until_confirmable(&self, booking: &Booking, now: NaiveDateTime) -> i64 {
        hours_until_confirmable(booking.starts_at(), now, self.rules.confirm_window())
    }

    pub fn cancel_booking(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        booking_id: &str,
        now: NaiveDateTime,
        policy: CancelPolicy,
        reason: Option<&str>,
    ) -> Result<Booking, BookingError> {
        if policy == CancelPolicy::SkipCutoff && !actor.is_privileged() {
            return Err(BookingError::Forbidden("only staff can override the cancellation cutoff"));
        }

        let tx = begin(conn)?;
        let mut booking = queries::get_booking(&tx, booking_id)?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;

        if !actor.is(&booking.owner_id) && !actor.is_privileged() {
            return Err(BookingError::Forbidden("only the owner or staff can cancel a booking"));
        }
        if booking.status == BookingStatus::Cancelled {
            return Err(BookingError::AlreadyCancelled);
        }
        if booking.date < now.date() {
            return Err(BookingError::Past);
        }
        if policy == CancelPolicy::Enforce && booking.starts_at() - now <= self.rules.cancel_cutoff() {
            return Err(BookingError::TooLate {
                cutoff_hours: self.rules.cancel_cutoff_hours,
            });
        }

        queries::update_booking_status(&tx, booking_id, BookingStatus::Cancelled, now)?;
        history::record(
            &tx,
            booking_id,
            HistoryAction::Cancelled,
            actor,
            serde_json::json!({
                "from": booking.status,
                "to": BookingStatus::Cancelled,
                "cutoff_skipped": policy == CancelPolicy::SkipCutoff,
            }),
            reason,
            now,
        )?;
        self.commit(tx, &[(booking.court_id.as_str(), booking.date)])?;

        booking.status = BookingStatus::Cancelled;
        booking.updated_at = now;

        tracing::info!(booking_id, actor = %actor.label(), "booking cancelled");
        Ok(booking)
    }

    /// Staff move of a booking to another time range and optionally another court.
    pub fn reschedule_booking(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        booking_id: &str,
        target: Reschedule,
        now: NaiveDateTime,
    ) -> Result<Booking, BookingError> {
        if !actor.is_privileged() {
            return Err(BookingError::Forbidden("only staff can reschedule bookings"));
        }
        self.rules
            .validate_request(target.date, target.start_time, target.end_time, now)?;

        let tx = begin(conn)?;
        let mut booking = queries::get_booking(&tx, booking_id)?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        if booking.status == BookingStatus::Cancelled {
            return Err(BookingError::Cancelled);
        }

        let court_id = target.court_id.unwrap_or_else(|| booking.court_id.clone());
        let court = queries::get_court(&tx, &court_id)?
            .ok_or_else(|| BookingError::not_found("court", &court_id))?;
        if !court.is_available {
            return Err(BookingError::CourtUnavailable);
        }

        if let Some(existing) = find_conflict(
            &tx,
            &court_id,
            target.date,
            target.start_time,
            target.end_time,
            Some(booking_id),
        )? {
            return Err(BookingError::SlotTaken(Box::new(existing)));
        }

        queries::update_booking_slot(
            &tx,
            booking_id,
            &court_id,
            target.date,
            target.start_time,
            target.end_time,
            now,
        )?;
        history::record(
            &tx,
            booking_id,
            HistoryAction::Rescheduled,
            actor,
            serde_json::json!({
                "from": {
                    "court_id": booking.court_id,
                    "date": booking.date,
                    "start_time": booking.start_time.format("%H:%M").to_string(),
                    "end_time": booking.end_time.format("%H:%M").to_string(),
                },
                "to": {
                    "court_id": court_id,
                    "date": target.date,
                    "start_time": target.start_time.format("%H:%M").to_string(),
                    "end_time": target.end_time.format("%H:%M").to_string(),
                },
            }),
            None,
            now,
        )?;

        let old_court = std::mem::replace(&mut booking.court_id, court_id);
        let old_date = booking.date;
        self.commit(
            tx,
            &[(old_court.as_str(), old_date), (booking.court_id.as_str(), target.date)],
        )?;

        booking.date = target.date;
        booking.start_time = target.start_time;
        booking.end_time = target.end_time;
        booking.updated_at = now;

        tracing::info!(booking_id, actor = %actor.label(), "booking rescheduled");
        Ok(booking)
    }

    /// Removes the booking with its partners, invitations and payment. The
    /// history survives, ending with a `deleted` entry.
    pub fn delete_booking(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        booking_id: &str,
        now: NaiveDateTime,
    ) -> Result<(), BookingError> {
        if !actor.is_privileged() {
            return Err(BookingError::Forbidden("only staff can delete bookings"));
        }

        let tx = begin(conn)?;
        let booking = queries::get_booking(&tx, booking_id)?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;

        history::record(
            &tx,
            booking_id,
            HistoryAction::Deleted,
            actor,
            serde_json::json!({
                "court_id": booking.court_id,
                "date": booking.date,
                "start_time": booking.start_time.format("%H:%M").to_string(),
                "end_time": booking.end_time.format("%H:%M").to_string(),
                "status": booking.status,
                "partners": booking.partners,
            }),
            None,
            now,
        )?;
        queries::delete_booking(&tx, booking_id)?;
        self.commit(tx, &[(booking.court_id.as_str(), booking.date)])?;

        tracing::warn!(booking_id, actor = %actor.label(), "booking deleted");
        Ok(())
    }

    // ── Reads ──

    pub fn get_booking(&self, conn: &Connection, booking_id: &str) -> Result<Booking, BookingError> {
        queries::get_booking(conn, booking_id)?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))
    }

    pub fn view(&self, conn: &Connection, booking: Booking) -> Result<BookingView, BookingError> {
        let court = queries::get_court(conn, &booking.court_id)?
            .ok_or_else(|| BookingError::not_found("court", &booking.court_id))?;
        let price = pricing::quote(&booking, court.price_per_hour);
        Ok(BookingView {
            available_slots: booking.available_slots(),
            is_full: booking.is_full(),
            price,
            booking,
        })
    }

    pub fn list_bookings(
        &self,
        conn: &Connection,
        status: Option<BookingStatus>,
        limit: i64,
    ) -> Result<Vec<Booking>, BookingError> {
        Ok(queries::list_bookings(conn, status, limit)?)
    }

    pub fn bookings_for_player(&self, conn: &Connection, player_id: &str) -> Result<Vec<Booking>, BookingError> {
        Ok(queries::bookings_for_player(conn, player_id)?)
    }

    /// Upcoming active bookings that are still looking for partners.
    pub fn open_bookings(&self, conn: &Connection, now: NaiveDateTime) -> Result<Vec<Booking>, BookingError> {
        let bookings = queries::open_bookings(conn, now.date())?;
        Ok(bookings
            .into_iter()
            .filter(|b| b.starts_at() > now && !b.is_full())
            .collect())
    }

    pub fn booking_history(&self, conn: &Connection, booking_id: &str) -> Result<Vec<HistoryEntry>, BookingError> {
        Ok(history::list(conn, booking_id)?)
    }
}
