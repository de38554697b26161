use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::models::{
    Booking, BookingStatus, Court, CourtUpdate, HistoryAction, HistoryEntry, Interval, Invitation,
    InvitationStatus, Payment, PaymentStatus, Player, RatingLevel,
};

fn decimal_column(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn json_column(row: &Row, idx: usize) -> rusqlite::Result<serde_json::Value> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ── Players ──

const PLAYER_COLUMNS: &str = "id, display_name, phone, rating_level, is_coach, is_staff, created_at";

fn parse_player_row(row: &Row) -> rusqlite::Result<Player> {
    Ok(Player {
        id: row.get(0)?,
        display_name: row.get(1)?,
        phone: row.get(2)?,
        rating: row.get(3)?,
        is_coach: row.get(4)?,
        is_staff: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn insert_player(conn: &Connection, player: &Player) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO players (id, display_name, phone, rating_level, is_coach, is_staff, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            player.id,
            player.display_name,
            player.phone,
            player.rating,
            player.is_coach,
            player.is_staff,
            player.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_player(conn: &Connection, id: &str) -> rusqlite::Result<Option<Player>> {
    conn.query_row(
        &format!("SELECT {PLAYER_COLUMNS} FROM players WHERE id = ?1"),
        params![id],
        parse_player_row,
    )
    .optional()
}

pub fn get_player_by_phone(conn: &Connection, phone: &str) -> rusqlite::Result<Option<Player>> {
    conn.query_row(
        &format!("SELECT {PLAYER_COLUMNS} FROM players WHERE phone = ?1"),
        params![phone],
        parse_player_row,
    )
    .optional()
}

pub fn update_player_rating(
    conn: &Connection,
    id: &str,
    rating: Option<&RatingLevel>,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE players SET rating_level = ?1 WHERE id = ?2",
        params![rating, id],
    )?;
    Ok(count > 0)
}

// ── Courts ──

const COURT_COLUMNS: &str = "id, name, description, price_per_hour, is_available";

fn parse_court_row(row: &Row) -> rusqlite::Result<Court> {
    Ok(Court {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price_per_hour: decimal_column(row, 3)?,
        is_available: row.get(4)?,
    })
}

pub fn insert_court(conn: &Connection, court: &Court) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO courts (id, name, description, price_per_hour, is_available)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            court.id,
            court.name,
            court.description,
            court.price_per_hour.to_string(),
            court.is_available,
        ],
    )?;
    Ok(())
}

pub fn get_court(conn: &Connection, id: &str) -> rusqlite::Result<Option<Court>> {
    conn.query_row(
        &format!("SELECT {COURT_COLUMNS} FROM courts WHERE id = ?1"),
        params![id],
        parse_court_row,
    )
    .optional()
}

pub fn list_courts(conn: &Connection) -> rusqlite::Result<Vec<Court>> {
    let mut stmt = conn.prepare(&format!("SELECT {COURT_COLUMNS} FROM courts ORDER BY name ASC"))?;
    let rows = stmt.query_map([], parse_court_row)?;
    rows.collect()
}

pub fn update_court(conn: &Connection, id: &str, update: &CourtUpdate) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE courts SET
           name = COALESCE(?1, name),
           description = COALESCE(?2, description),
           price_per_hour = COALESCE(?3, price_per_hour),
           is_available = COALESCE(?4, is_available)
         WHERE id = ?5",
        params![
            update.name,
            update.description,
            update.price_per_hour.map(|p| p.to_string()),
            update.is_available,
            id,
        ],
    )?;
    Ok(count > 0)
}

pub fn delete_court(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    let count = conn.execute("DELETE FROM courts WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

pub fn count_active_upcoming_for_court(
    conn: &Connection,
    court_id: &str,
    today: NaiveDate,
) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM bookings
         WHERE court_id = ?1 AND date >= ?2 AND status IN ('pending', 'confirmed')",
        params![court_id, today],
        |row| row.get(0),
    )
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, court_id, owner_id, coach_id, date, start_time, end_time, status, \
     looking_for_partner, max_players, required_rating_level, created_at, updated_at, confirmed_at";

fn parse_booking_row(row: &Row) -> rusqlite::Result<Booking> {
    Ok(Booking {
        id: row.get(0)?,
        court_id: row.get(1)?,
        owner_id: row.get(2)?,
        coach_id: row.get(3)?,
        date: row.get(4)?,
        start_time: row.get(5)?,
        end_time: row.get(6)?,
        status: row.get(7)?,
        looking_for_partner: row.get(8)?,
        max_players: row.get(9)?,
        required_rating_level: row.get(10)?,
        partners: vec![],
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        confirmed_at: row.get(13)?,
    })
}

fn query_bookings(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> rusqlite::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(sql)?;
    let mut bookings = stmt
        .query_map(params, parse_booking_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for booking in &mut bookings {
        booking.partners = partners_of(conn, &booking.id)?;
    }
    Ok(bookings)
}

pub fn insert_booking(conn: &Connection, booking: &Booking) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, court_id, owner_id, coach_id, date, start_time, end_time, status,
                               looking_for_partner, max_players, required_rating_level,
                               created_at, updated_at, confirmed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            booking.id,
            booking.court_id,
            booking.owner_id,
            booking.coach_id,
            booking.date,
            booking.start_time,
            booking.end_time,
            booking.status,
            booking.looking_for_partner,
            booking.max_players,
            booking.required_rating_level,
            booking.created_at,
            booking.updated_at,
            booking.confirmed_at,
        ],
    )?;
    Ok(())
}

pub fn get_booking(conn: &Connection, id: &str) -> rusqlite::Result<Option<Booking>> {
    let booking = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
            params![id],
            parse_booking_row,
        )
        .optional()?;

    match booking {
        Some(mut b) => {
            b.partners = partners_of(conn, &b.id)?;
            Ok(Some(b))
        }
        None => Ok(None),
    }
}

/// Active bookings on one court and date, in insertion order.
pub fn active_bookings_on(
    conn: &Connection,
    court_id: &str,
    date: NaiveDate,
) -> rusqlite::Result<Vec<Booking>> {
    query_bookings(
        conn,
        &format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE court_id = ?1 AND date = ?2 AND status IN ('pending', 'confirmed')
             ORDER BY rowid ASC"
        ),
        params![court_id, date],
    )
}

pub fn occupied_intervals(
    conn: &Connection,
    court_id: &str,
    date: NaiveDate,
) -> rusqlite::Result<Vec<Interval>> {
    let mut stmt = conn.prepare(
        "SELECT start_time, end_time FROM bookings
         WHERE court_id = ?1 AND date = ?2 AND status IN ('pending', 'confirmed')
         ORDER BY start_time ASC",
    )?;
    let rows = stmt.query_map(params![court_id, date], |row| {
        Ok(Interval {
            start: row.get(0)?,
            end: row.get(1)?,
        })
    })?;
    rows.collect()
}

pub fn list_bookings(
    conn: &Connection,
    status: Option<BookingStatus>,
    limit: i64,
) -> rusqlite::Result<Vec<Booking>> {
    match status {
        Some(status) => query_bookings(
            conn,
            &format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE status = ?1
                 ORDER BY date DESC, start_time DESC LIMIT ?2"
            ),
            params![status, limit],
        ),
        None => query_bookings(
            conn,
            &format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings
                 ORDER BY date DESC, start_time DESC LIMIT ?1"
            ),
            params![limit],
        ),
    }
}

/// Bookings the player owns or has joined.
pub fn bookings_for_player(conn: &Connection, player_id: &str) -> rusqlite::Result<Vec<Booking>> {
    query_bookings(
        conn,
        &format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE owner_id = ?1
                OR id IN (SELECT booking_id FROM booking_partners WHERE player_id = ?1)
             ORDER BY date ASC, start_time ASC"
        ),
        params![player_id],
    )
}

/// Active bookings from `today` on that are looking for partners.
pub fn open_bookings(conn: &Connection, today: NaiveDate) -> rusqlite::Result<Vec<Booking>> {
    query_bookings(
        conn,
        &format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE looking_for_partner = 1 AND date >= ?1 AND status IN ('pending', 'confirmed')
             ORDER BY date ASC, start_time ASC"
        ),
        params![today],
    )
}

pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    status: BookingStatus,
    now: NaiveDateTime,
) -> rusqlite::Result<bool> {
    let confirmed_at = (status == BookingStatus::Confirmed).then_some(now);
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2, confirmed_at = COALESCE(confirmed_at, ?3)
         WHERE id = ?4",
        params![status, now, confirmed_at, id],
    )?;
    Ok(count > 0)
}

pub fn update_booking_slot(
    conn: &Connection,
    id: &str,
    court_id: &str,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    now: NaiveDateTime,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET court_id = ?1, date = ?2, start_time = ?3, end_time = ?4, updated_at = ?5
         WHERE id = ?6",
        params![court_id, date, start, end, now, id],
    )?;
    Ok(count > 0)
}

pub fn delete_booking(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    let count = conn.execute("DELETE FROM bookings WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

// ── Partners ──

pub fn partners_of(conn: &Connection, booking_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT player_id FROM booking_partners WHERE booking_id = ?1 ORDER BY rowid ASC",
    )?;
    let rows = stmt.query_map(params![booking_id], |row| row.get(0))?;
    rows.collect()
}

/// Returns false when the player was already a partner.
pub fn insert_partner(
    conn: &Connection,
    booking_id: &str,
    player_id: &str,
    now: NaiveDateTime,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "INSERT OR IGNORE INTO booking_partners (booking_id, player_id, joined_at) VALUES (?1, ?2, ?3)",
        params![booking_id, player_id, now],
    )?;
    Ok(count > 0)
}

// ── Invitations ──

const INVITATION_COLUMNS: &str =
    "id, booking_id, inviter_id, invitee_id, invitee_phone, message, status, created_at, responded_at";

fn parse_invitation_row(row: &Row) -> rusqlite::Result<Invitation> {
    Ok(Invitation {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        inviter_id: row.get(2)?,
        invitee_id: row.get(3)?,
        invitee_phone: row.get(4)?,
        message: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
        responded_at: row.get(8)?,
    })
}

pub fn insert_invitation(conn: &Connection, invitation: &Invitation) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO booking_invitations
           (id, booking_id, inviter_id, invitee_id, invitee_phone, message, status, created_at, responded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            invitation.id,
            invitation.booking_id,
            invitation.inviter_id,
            invitation.invitee_id,
            invitation.invitee_phone,
            invitation.message,
            invitation.status,
            invitation.created_at,
            invitation.responded_at,
        ],
    )?;
    Ok(())
}

pub fn get_invitation(conn: &Connection, id: &str) -> rusqlite::Result<Option<Invitation>> {
    conn.query_row(
        &format!("SELECT {INVITATION_COLUMNS} FROM booking_invitations WHERE id = ?1"),
        params![id],
        parse_invitation_row,
    )
    .optional()
}

pub fn invitation_exists(conn: &Connection, booking_id: &str, phone: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM booking_invitations WHERE booking_id = ?1 AND invitee_phone = ?2",
        params![booking_id, phone],
        |row| row.get(0),
    )
}

pub fn update_invitation_status(
    conn: &Connection,
    id: &str,
    status: InvitationStatus,
    responded_at: Option<NaiveDateTime>,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE booking_invitations SET status = ?1, responded_at = ?2 WHERE id = ?3",
        params![status, responded_at, id],
    )?;
    Ok(count > 0)
}

pub fn pending_invitations_for(conn: &Connection, player_id: &str) -> rusqlite::Result<Vec<Invitation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {INVITATION_COLUMNS} FROM booking_invitations
         WHERE invitee_id = ?1 AND status = 'pending'
         ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map(params![player_id], parse_invitation_row)?;
    rows.collect()
}

pub fn invitations_for_booking(conn: &Connection, booking_id: &str) -> rusqlite::Result<Vec<Invitation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {INVITATION_COLUMNS} FROM booking_invitations
         WHERE booking_id = ?1 ORDER BY created_at ASC"
    ))?;
    let rows = stmt.query_map(params![booking_id], parse_invitation_row)?;
    rows.collect()
}

// ── History ──

pub fn insert_history(
    conn: &Connection,
    booking_id: &str,
    action: HistoryAction,
    actor: Option<&str>,
    changes: &serde_json::Value,
    comment: Option<&str>,
    now: NaiveDateTime,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO booking_history (booking_id, action, actor, changes, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![booking_id, action, actor, changes.to_string(), comment, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn history_for_booking(conn: &Connection, booking_id: &str) -> rusqlite::Result<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, action, actor, changes, comment, created_at
         FROM booking_history WHERE booking_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![booking_id], |row| {
        Ok(HistoryEntry {
            id: row.get(0)?,
            booking_id: row.get(1)?,
            action: row.get(2)?,
            actor: row.get(3)?,
            changes: json_column(row, 4)?,
            comment: row.get(5)?,
            created_at: row.get(6)?,
        })
    })?;
    rows.collect()
}

// ── Payments ──

const PAYMENT_COLUMNS: &str = "id, booking_id, amount, method, status, transaction_id, created_at, paid_at";

fn parse_payment_row(row: &Row) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        amount: decimal_column(row, 2)?,
        method: row.get(3)?,
        status: row.get(4)?,
        transaction_id: row.get(5)?,
        created_at: row.get(6)?,
        paid_at: row.get(7)?,
    })
}

pub fn insert_payment(conn: &Connection, payment: &Payment) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO payments (id, booking_id, amount, method, status, transaction_id, created_at, paid_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            payment.id,
            payment.booking_id,
            payment.amount.to_string(),
            payment.method,
            payment.status,
            payment.transaction_id,
            payment.created_at,
            payment.paid_at,
        ],
    )?;
    Ok(())
}

pub fn get_payment(conn: &Connection, id: &str) -> rusqlite::Result<Option<Payment>> {
    conn.query_row(
        &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"),
        params![id],
        parse_payment_row,
    )
    .optional()
}

pub fn payment_for_booking(conn: &Connection, booking_id: &str) -> rusqlite::Result<Option<Payment>> {
    conn.query_row(
        &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE booking_id = ?1"),
        params![booking_id],
        parse_payment_row,
    )
    .optional()
}

pub fn update_payment_status(
    conn: &Connection,
    id: &str,
    status: PaymentStatus,
    transaction_id: Option<&str>,
    paid_at: Option<NaiveDateTime>,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE payments SET status = ?1,
           transaction_id = COALESCE(?2, transaction_id),
           paid_at = COALESCE(?3, paid_at)
         WHERE id = ?4",
        params![status, transaction_id, paid_at, id],
    )?;
    Ok(count > 0)
}
