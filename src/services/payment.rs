//! Payment bookkeeping. No gateway is called; a payment only records what
//! the club expects and what was reported as paid or refunded.

use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{Actor, HistoryAction, Payment, PaymentStatus};
use crate::services::{begin, history, pricing, Engine};

impl Engine {
    pub fn create_payment(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        booking_id: &str,
        method: &str,
        now: NaiveDateTime,
    ) -> Result<Payment, BookingError> {
        let tx = begin(conn)?;
        let booking = queries::get_booking(&tx, booking_id)?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;

        if !actor.is(&booking.owner_id) && !actor.is_privileged() {
            return Err(BookingError::Forbidden("only the owner or staff can create a payment"));
        }
        if queries::payment_for_booking(&tx, booking_id)?.is_some() {
            return Err(BookingError::PaymentExists);
        }

        let court = queries::get_court(&tx, &booking.court_id)?
            .ok_or_else(|| BookingError::not_found("court", &booking.court_id))?;

        let payment = Payment {
            id: uuid::Uuid::new_v4().to_string(),
            booking_id: booking_id.to_string(),
            amount: pricing::total_price(court.price_per_hour, booking.start_time, booking.end_time),
            method: method.to_string(),
            status: PaymentStatus::Pending,
            transaction_id: None,
            created_at: now,
            paid_at: None,
        };
        queries::insert_payment(&tx, &payment)?;
        history::record(
            &tx,
            booking_id,
            HistoryAction::PaymentPending,
            actor,
            serde_json::json!({
                "payment_id": payment.id,
                "amount": payment.amount,
                "method": payment.method,
            }),
            None,
            now,
        )?;
        self.commit(tx, &[])?;

        tracing::info!(booking_id, payment_id = %payment.id, "payment created");
        Ok(payment)
    }

    pub fn mark_paid(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        payment_id: &str,
        transaction_id: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<Payment, BookingError> {
        self.transition_payment(
            conn,
            actor,
            payment_id,
            PaymentStatus::Pending,
            PaymentStatus::Paid,
            transaction_id,
            now,
        )
    }

    pub fn refund_payment(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        payment_id: &str,
        now: NaiveDateTime,
    ) -> Result<Payment, BookingError> {
        self.transition_payment(
            conn,
            actor,
            payment_id,
            PaymentStatus::Paid,
            PaymentStatus::Refunded,
            None,
            now,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn transition_payment(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        payment_id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
        transaction_id: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<Payment, BookingError> {
        if !actor.is_privileged() {
            return Err(BookingError::Forbidden("only staff can change payment status"));
        }

        let tx = begin(conn)?;
        let mut payment = queries::get_payment(&tx, payment_id)?
            .ok_or_else(|| BookingError::not_found("payment", payment_id))?;
        if payment.status != from {
            return Err(BookingError::PaymentState(payment.status));
        }

        let paid_at = (to == PaymentStatus::Paid).then_some(now);
        queries::update_payment_status(&tx, payment_id, to, transaction_id, paid_at)?;

        let action = match to {
            PaymentStatus::Paid => HistoryAction::PaymentPaid,
            _ => HistoryAction::PaymentRefunded,
        };
        history::record(
            &tx,
            &payment.booking_id,
            action,
            actor,
            serde_json::json!({
                "payment_id": payment_id,
                "amount": payment.amount,
                "transaction_id": transaction_id,
            }),
            None,
            now,
        )?;
        self.commit(tx, &[])?;

        payment.status = to;
        if let Some(id) = transaction_id {
            payment.transaction_id = Some(id.to_string());
        }
        if paid_at.is_some() {
            payment.paid_at = paid_at;
        }

        tracing::info!(payment_id, status = %to, "payment updated");
        Ok(payment)
    }

    pub fn payment_for_booking(&self, conn: &Connection, booking_id: &str) -> Result<Option<Payment>, BookingError> {
        Ok(queries::payment_for_booking(conn, booking_id)?)
    }
}
