use std::env;
use std::str::FromStr;

use chrono::{FixedOffset, NaiveDateTime, NaiveTime, Offset, Utc};

use crate::services::rules::BookingRules;

/// Upper bound for the confirm window and cancel cutoff, one month.
const MAX_RULE_HOURS: i64 = 24 * 31;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_phone_number: String,
    /// Offset of the club's wall clock from UTC, in hours.
    pub utc_offset_hours: i32,
    pub rules: BookingRules,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = BookingRules::default();
        let opening_hour: u32 = env_or("OPENING_HOUR", 8);
        let closing_hour: u32 = env_or("CLOSING_HOUR", 22);

        Self {
            port: env_or("PORT", 3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "courtbook.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            twilio_phone_number: env::var("TWILIO_PHONE_NUMBER").unwrap_or_default(),
            utc_offset_hours: env_or("CLUB_UTC_OFFSET_HOURS", 4),
            rules: BookingRules {
                opens_at: NaiveTime::from_hms_opt(opening_hour, 0, 0).unwrap_or(defaults.opens_at),
                closes_at: NaiveTime::from_hms_opt(closing_hour, 0, 0)
                    .unwrap_or(defaults.closes_at),
                min_duration_hours: env_or("MIN_BOOKING_HOURS", defaults.min_duration_hours),
                max_duration_hours: env_or("MAX_BOOKING_HOURS", defaults.max_duration_hours),
                confirm_window_hours: env_or("CONFIRM_WINDOW_HOURS", defaults.confirm_window_hours),
                cancel_cutoff_hours: env_or("CANCEL_CUTOFF_HOURS", defaults.cancel_cutoff_hours),
                slot_minutes: env_or("SLOT_MINUTES", defaults.slot_minutes),
            },
        }
    }

    /// Current wall-clock time at the club.
    pub fn local_now(&self) -> NaiveDateTime {
        let offset = self
            .utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix());
        Utc::now().with_timezone(&offset).naive_local()
    }

    /// Rejects settings the booking rules cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let rules = &self.rules;
        anyhow::ensure!(
            (-12..=14).contains(&self.utc_offset_hours),
            "CLUB_UTC_OFFSET_HOURS must be between -12 and 14"
        );
        anyhow::ensure!(
            rules.opens_at < rules.closes_at,
            "OPENING_HOUR must be earlier than CLOSING_HOUR"
        );
        anyhow::ensure!(
            rules.min_duration_hours <= rules.max_duration_hours,
            "MIN_BOOKING_HOURS must not exceed MAX_BOOKING_HOURS"
        );
        anyhow::ensure!(
            (1..=MAX_RULE_HOURS).contains(&rules.confirm_window_hours),
            "CONFIRM_WINDOW_HOURS must be between 1 and {MAX_RULE_HOURS}"
        );
        anyhow::ensure!(
            (0..=MAX_RULE_HOURS).contains(&rules.cancel_cutoff_hours),
            "CANCEL_CUTOFF_HOURS must be between 0 and {MAX_RULE_HOURS}"
        );
        anyhow::ensure!(rules.slot_minutes > 0, "SLOT_MINUTES must be positive");
        Ok(())
    }

    pub fn messaging_configured(&self) -> bool {
        !self.twilio_account_sid.is_empty()
            && !self.twilio_auth_token.is_empty()
            && !self.twilio_phone_number.is_empty()
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
