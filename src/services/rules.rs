use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::errors::BookingError;

/// Club-wide booking bounds.
#[derive(Debug, Clone)]
pub struct BookingRules {
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
    pub min_duration_hours: u32,
    pub max_duration_hours: u32,
    pub confirm_window_hours: i64,
    pub cancel_cutoff_hours: i64,
    pub slot_minutes: u32,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            opens_at: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            closes_at: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN),
            min_duration_hours: 1,
            max_duration_hours: 3,
            confirm_window_hours: 24,
            cancel_cutoff_hours: 1,
            slot_minutes: 60,
        }
    }
}

impl BookingRules {
    pub fn confirm_window(&self) -> Duration {
        Duration::hours(self.confirm_window_hours)
    }

    pub fn cancel_cutoff(&self) -> Duration {
        Duration::hours(self.cancel_cutoff_hours)
    }

    /// Runs every time-range check in order. All entry points that set a
    /// booking's time range go through here.
    pub fn validate_request(
        &self,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        now: NaiveDateTime,
    ) -> Result<(), BookingError> {
        validate_not_past(date, start, now)?;
        validate_ordering(start, end)?;
        self.validate_duration(start, end)?;
        self.validate_working_hours(start, end)?;
        Ok(())
    }

    pub fn validate_duration(&self, start: NaiveTime, end: NaiveTime) -> Result<(), BookingError> {
        let minutes = wrapped_minutes(start, end);
        let min = i64::from(self.min_duration_hours) * 60;
        let max = i64::from(self.max_duration_hours) * 60;
        if minutes < min || minutes > max {
            return Err(BookingError::BadDuration {
                min: self.min_duration_hours,
                max: self.max_duration_hours,
            });
        }
        Ok(())
    }

    pub fn validate_working_hours(&self, start: NaiveTime, end: NaiveTime) -> Result<(), BookingError> {
        if start < self.opens_at || end > self.closes_at {
            return Err(BookingError::OutsideHours {
                opens_at: self.opens_at,
                closes_at: self.closes_at,
            });
        }
        Ok(())
    }
}

pub fn validate_not_past(date: NaiveDate, start: NaiveTime, now: NaiveDateTime) -> Result<(), BookingError> {
    let today = now.date();
    if date < today || (date == today && start < now.time()) {
        return Err(BookingError::PastDate);
    }
    Ok(())
}

/// Bookings never span midnight.
pub fn validate_ordering(start: NaiveTime, end: NaiveTime) -> Result<(), BookingError> {
    if end <= start {
        return Err(BookingError::BadOrder);
    }
    Ok(())
}

/// Minutes from `start` to `end`, adding a day when `end` is not after `start`.
pub fn wrapped_minutes(start: NaiveTime, end: NaiveTime) -> i64 {
    let mut minutes = (end - start).num_minutes();
    if minutes <= 0 {
        minutes += 24 * 60;
    }
    minutes
}
