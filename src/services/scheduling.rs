use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{Booking, SlotView};
use crate::services::Engine;

/// First active booking on (court, date), in insertion order, whose
/// `[start, end)` overlaps the proposed range. `exclude` skips one booking
/// (the one being moved or just inserted).
pub fn find_conflict(
    conn: &Connection,
    court_id: &str,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    exclude: Option<&str>,
) -> rusqlite::Result<Option<Booking>> {
    let bookings = queries::active_bookings_on(conn, court_id, date)?;
    Ok(bookings
        .into_iter()
        .filter(|b| exclude != Some(b.id.as_str()))
        .find(|b| b.overlaps(start, end)))
}

impl Engine {
    /// One entry per slot from opening to closing time on `date`.
    pub fn list_available_slots(
        &self,
        conn: &Connection,
        court_id: &str,
        date: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<Vec<SlotView>, BookingError> {
        let court = queries::get_court(conn, court_id)?
            .ok_or_else(|| BookingError::not_found("court", court_id))?;

        let occupied = self
            .cache
            .get_or_load(court_id, date, || queries::occupied_intervals(conn, court_id, date))?;

        let step = Duration::minutes(i64::from(self.rules.slot_minutes.max(1)));
        let day_start = date.and_time(self.rules.opens_at);
        let day_end = date.and_time(self.rules.closes_at);

        let mut slots = Vec::new();
        let mut cursor = day_start;
        while cursor + step <= day_end {
            let slot_end = cursor + step;
            let (start, end) = (cursor.time(), slot_end.time());
            let taken = occupied.iter().any(|iv| iv.overlaps(start, end));
            let available = court.is_available && !taken && cursor >= now;
            slots.push(SlotView { start, end, available });
            cursor = slot_end;
        }

        Ok(slots)
    }
}
