use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use super::RatingLevel;

pub const MIN_PLAYERS: u8 = 2;
pub const MAX_PLAYERS: u8 = 4;
pub const DEFAULT_MAX_PLAYERS: u8 = MAX_PLAYERS;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub court_id: String,
    pub owner_id: String,
    pub coach_id: Option<String>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: BookingStatus,
    pub looking_for_partner: bool,
    pub max_players: u8,
    pub required_rating_level: Option<RatingLevel>,
    /// Players who joined the owner, in join order. Never contains the owner.
    pub partners: Vec<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub confirmed_at: Option<NaiveDateTime>,
}

impl Booking {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn participant_count(&self) -> usize {
        1 + self.partners.len()
    }

    pub fn available_slots(&self) -> usize {
        usize::from(self.max_players).saturating_sub(self.participant_count())
    }

    pub fn is_full(&self) -> bool {
        self.available_slots() == 0
    }

    pub fn is_member(&self, player_id: &str) -> bool {
        self.owner_id == player_id || self.partners.iter().any(|p| p == player_id)
    }

    /// Half-open interval overlap against `[start, end)`.
    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        self.start_time < end && start < self.end_time
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for BookingStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for BookingStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        BookingStatus::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown booking status: {s}").into()))
    }
}

/// Optional partner-matching and coaching settings chosen at creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingOptions {
    #[serde(default)]
    pub coach_id: Option<String>,
    #[serde(default)]
    pub looking_for_partner: bool,
    #[serde(default)]
    pub max_players: Option<u8>,
    #[serde(default, deserialize_with = "super::player::deserialize_optional_level")]
    pub required_rating_level: Option<RatingLevel>,
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub owner_id: String,
    pub court_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub options: BookingOptions,
}

/// Target of a staff reschedule. `court_id: None` keeps the current court.
#[derive(Debug, Clone)]
pub struct Reschedule {
    pub court_id: Option<String>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}
