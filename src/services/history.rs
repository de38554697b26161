use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{Actor, HistoryAction, HistoryEntry};

/// Appends one audit entry. Callers pass the open transaction so the entry
/// commits or rolls back with the change it describes.
pub fn record(
    conn: &Connection,
    booking_id: &str,
    action: HistoryAction,
    actor: &Actor,
    changes: serde_json::Value,
    comment: Option<&str>,
    now: NaiveDateTime,
) -> rusqlite::Result<i64> {
    let label = actor.label();
    queries::insert_history(conn, booking_id, action, Some(&label), &changes, comment, now)
}

pub fn list(conn: &Connection, booking_id: &str) -> rusqlite::Result<Vec<HistoryEntry>> {
    queries::history_for_booking(conn, booking_id)
}
