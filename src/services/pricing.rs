use chrono::NaiveTime;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::Booking;
use crate::services::rules::wrapped_minutes;

pub fn duration_minutes(start: NaiveTime, end: NaiveTime) -> i64 {
    wrapped_minutes(start, end)
}

/// Money always carries two decimal places.
fn round2(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

pub fn total_price(rate_per_hour: Decimal, start: NaiveTime, end: NaiveTime) -> Decimal {
    let minutes = Decimal::from(duration_minutes(start, end));
    round2(rate_per_hour * minutes / Decimal::from(60))
}

/// Total split evenly between the owner and every partner.
pub fn price_per_person(total: Decimal, partner_count: usize) -> Decimal {
    let heads = Decimal::from(1 + partner_count as u64);
    round2(total / heads)
}

/// Prices derived from the court's current rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BookingPrice {
    pub total_price: Decimal,
    pub price_per_person: Decimal,
}

pub fn quote(booking: &Booking, rate_per_hour: Decimal) -> BookingPrice {
    let total = total_price(rate_per_hour, booking.start_time, booking.end_time);
    BookingPrice {
        total_price: total,
        price_per_person: price_per_person(total, booking.partners.len()),
    }
}
