use chrono::NaiveDateTime;
use rusqlite::{Connection, ErrorCode};
use rust_decimal::Decimal;

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{Court, CourtUpdate, NewCourt, NewPlayer, Player, RatingLevel};
use crate::services::{begin, Engine};

/// Normalizes a Russian mobile number to `+7XXXXXXXXXX`.
pub fn normalize_phone(raw: &str) -> Result<String, BookingError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    let digits = match digits.len() {
        10 => format!("7{digits}"),
        11 if digits.starts_with('8') => format!("7{}", &digits[1..]),
        _ => digits,
    };

    if digits.len() != 11 || !digits.starts_with('7') {
        return Err(BookingError::InvalidPhone);
    }
    Ok(format!("+{digits}"))
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn validate_rate(rate: Decimal) -> Result<(), BookingError> {
    if rate.is_sign_negative() {
        return Err(BookingError::InvalidInput("price per hour cannot be negative".to_string()));
    }
    Ok(())
}

impl Engine {
    // ── Players ──

    /// The only way a player record comes into existence.
    pub fn register_player(
        &self,
        conn: &Connection,
        new: NewPlayer,
        now: NaiveDateTime,
    ) -> Result<Player, BookingError> {
        let display_name = new.display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(BookingError::InvalidInput("display name is required".to_string()));
        }

        let player = Player {
            id: uuid::Uuid::new_v4().to_string(),
            display_name,
            phone: normalize_phone(&new.phone)?,
            rating: new.rating.filter(|r| !r.as_str().is_empty()),
            is_coach: new.is_coach,
            is_staff: new.is_staff,
            created_at: now,
        };

        match queries::insert_player(conn, &player) {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => return Err(BookingError::PhoneTaken),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(player_id = %player.id, "player registered");
        Ok(player)
    }

    pub fn get_player(&self, conn: &Connection, player_id: &str) -> Result<Player, BookingError> {
        queries::get_player(conn, player_id)?
            .ok_or_else(|| BookingError::not_found("player", player_id))
    }

    pub fn find_player_by_phone(&self, conn: &Connection, phone: &str) -> Result<Option<Player>, BookingError> {
        let phone = normalize_phone(phone)?;
        Ok(queries::get_player_by_phone(conn, &phone)?)
    }

    pub fn set_rating(
        &self,
        conn: &Connection,
        player_id: &str,
        rating: Option<RatingLevel>,
    ) -> Result<Player, BookingError> {
        let rating = rating.filter(|r| !r.as_str().is_empty());
        if !queries::update_player_rating(conn, player_id, rating.as_ref())? {
            return Err(BookingError::not_found("player", player_id));
        }
        self.get_player(conn, player_id)
    }

    // ── Courts ──

    pub fn create_court(&self, conn: &Connection, new: NewCourt) -> Result<Court, BookingError> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(BookingError::InvalidInput("court name is required".to_string()));
        }
        validate_rate(new.price_per_hour)?;

        let court = Court {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            description: new.description,
            price_per_hour: new.price_per_hour,
            is_available: new.is_available,
        };
        queries::insert_court(conn, &court)?;

        tracing::info!(court_id = %court.id, name = %court.name, "court created");
        Ok(court)
    }

    pub fn get_court(&self, conn: &Connection, court_id: &str) -> Result<Court, BookingError> {
        queries::get_court(conn, court_id)?.ok_or_else(|| BookingError::not_found("court", court_id))
    }

    pub fn list_courts(&self, conn: &Connection) -> Result<Vec<Court>, BookingError> {
        Ok(queries::list_courts(conn)?)
    }

    pub fn update_court(
        &self,
        conn: &Connection,
        court_id: &str,
        update: CourtUpdate,
    ) -> Result<Court, BookingError> {
        if let Some(rate) = update.price_per_hour {
            validate_rate(rate)?;
        }
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(BookingError::InvalidInput("court name is required".to_string()));
        }
        if !queries::update_court(conn, court_id, &update)? {
            return Err(BookingError::not_found("court", court_id));
        }
        if update.is_available.is_some() {
            self.cache.invalidate_court(court_id);
        }
        self.get_court(conn, court_id)
    }

    /// Deletes a court with no active bookings from today on. Its past
    /// bookings go with it; their history stays.
    pub fn delete_court(
        &self,
        conn: &mut Connection,
        court_id: &str,
        now: NaiveDateTime,
    ) -> Result<(), BookingError> {
        let tx = begin(conn)?;
        queries::get_court(&tx, court_id)?.ok_or_else(|| BookingError::not_found("court", court_id))?;

        let active = queries::count_active_upcoming_for_court(&tx, court_id, now.date())?;
        if active > 0 {
            return Err(BookingError::CourtInUse { active });
        }

        queries::delete_court(&tx, court_id)?;
        tx.commit()?;
        self.cache.invalidate_court(court_id);

        tracing::info!(court_id, "court deleted");
        Ok(())
    }
}
