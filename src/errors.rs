use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::models::{Booking, BookingStatus, InvitationStatus, PaymentStatus, RatingLevel};

/// Failure classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Forbidden,
    NotFound,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("cannot book a court for a date or time that has already passed")]
    PastDate,

    #[error("end time must be later than start time")]
    BadOrder,

    #[error("a booking must last between {min} and {max} hours")]
    BadDuration { min: u32, max: u32 },

    #[error("bookings are available only from {} to {}", .opens_at.format("%H:%M"), .closes_at.format("%H:%M"))]
    OutsideHours {
        opens_at: chrono::NaiveTime,
        closes_at: chrono::NaiveTime,
    },

    #[error("the selected time is already taken from {} to {}", .0.start_time.format("%H:%M"), .0.end_time.format("%H:%M"))]
    SlotTaken(Box<Booking>),

    #[error("booking is already {0} and cannot be confirmed")]
    WrongState(BookingStatus),

    #[error("a booking can be confirmed only during the {window_hours} hours before it starts (opens in {hours_until} h)")]
    OutsideWindow { window_hours: i64, hours_until: i64 },

    #[error("this booking is already cancelled")]
    AlreadyCancelled,

    #[error("cannot cancel a booking that has already taken place")]
    Past,

    #[error("cannot cancel a booking less than {cutoff_hours} hour(s) before it starts")]
    TooLate { cutoff_hours: i64 },

    #[error("this booking is not looking for partners")]
    NotLooking,

    #[error("this booking is already full")]
    Full,

    #[error("you are already taking part in this booking")]
    AlreadyIn,

    #[error("this booking has been cancelled")]
    Cancelled,

    #[error("this booking requires rating level {required}")]
    RatingMismatch { required: RatingLevel },

    #[error("this booking requires rating level {required} and you have no rating yet")]
    NoRating { required: RatingLevel },

    #[error("an invitation for this phone number has already been sent")]
    Duplicate,

    #[error("you cannot invite yourself")]
    SelfInvite,

    #[error("this player already takes part in the booking")]
    AlreadyMember,

    #[error("invalid phone number format")]
    InvalidPhone,

    #[error("no registered player with this phone number")]
    InviteeNotFound,

    #[error("a player with this phone number is already registered")]
    PhoneTaken,

    #[error("invitation is already {0}")]
    InvitationResolved(InvitationStatus),

    #[error("court is not available for booking")]
    CourtUnavailable,

    #[error("court has {active} active upcoming booking(s) and cannot be deleted")]
    CourtInUse { active: i64 },

    #[error("selected coach is not registered as a coach")]
    NotACoach,

    #[error("max players must be between 2 and 4, got {0}")]
    InvalidMaxPlayers(u8),

    #[error("a payment already exists for this booking")]
    PaymentExists,

    #[error("payment is {0} and cannot be changed this way")]
    PaymentState(PaymentStatus),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl BookingError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        BookingError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::PastDate => "PAST_DATE",
            BookingError::BadOrder => "BAD_ORDER",
            BookingError::BadDuration { .. } => "BAD_DURATION",
            BookingError::OutsideHours { .. } => "OUTSIDE_HOURS",
            BookingError::SlotTaken(_) => "SLOT_TAKEN",
            BookingError::WrongState(_) => "WRONG_STATE",
            BookingError::OutsideWindow { .. } => "OUTSIDE_WINDOW",
            BookingError::AlreadyCancelled => "ALREADY_CANCELLED",
            BookingError::Past => "PAST",
            BookingError::TooLate { .. } => "TOO_LATE",
            BookingError::NotLooking => "NOT_LOOKING",
            BookingError::Full => "FULL",
            BookingError::AlreadyIn => "ALREADY_IN",
            BookingError::Cancelled => "CANCELLED",
            BookingError::RatingMismatch { .. } => "RATING_MISMATCH",
            BookingError::NoRating { .. } => "NO_RATING",
            BookingError::Duplicate => "DUPLICATE",
            BookingError::SelfInvite => "SELF",
            BookingError::AlreadyMember => "ALREADY_MEMBER",
            BookingError::InvalidPhone => "INVALID_PHONE",
            BookingError::InviteeNotFound => "INVITEE_NOT_FOUND",
            BookingError::PhoneTaken => "PHONE_TAKEN",
            BookingError::InvitationResolved(_) => "INVITATION_RESOLVED",
            BookingError::CourtUnavailable => "COURT_UNAVAILABLE",
            BookingError::CourtInUse { .. } => "COURT_IN_USE",
            BookingError::NotACoach => "NOT_A_COACH",
            BookingError::InvalidMaxPlayers(_) => "INVALID_MAX_PLAYERS",
            BookingError::PaymentExists => "PAYMENT_EXISTS",
            BookingError::PaymentState(_) => "PAYMENT_STATE",
            BookingError::InvalidInput(_) => "INVALID_INPUT",
            BookingError::Forbidden(_) => "FORBIDDEN",
            BookingError::NotFound { .. } => "NOT_FOUND",
            BookingError::Database(_) => "DATABASE",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::PastDate
            | BookingError::BadOrder
            | BookingError::BadDuration { .. }
            | BookingError::OutsideHours { .. }
            | BookingError::InvalidPhone
            | BookingError::NotACoach
            | BookingError::InvalidMaxPlayers(_)
            | BookingError::InvalidInput(_) => ErrorKind::Validation,
            BookingError::Forbidden(_) => ErrorKind::Forbidden,
            BookingError::NotFound { .. } | BookingError::InviteeNotFound => ErrorKind::NotFound,
            BookingError::Database(_) => ErrorKind::Internal,
            _ => ErrorKind::Conflict,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Booking(e) => {
                let status = match e.kind() {
                    ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
                    ErrorKind::Conflict => StatusCode::CONFLICT,
                    ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.code())
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({ "error": self.to_string(), "code": code });
        (status, axum::Json(body)).into_response()
    }
}
