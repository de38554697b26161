use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{Actor, BookingStatus, HistoryAction, Invitation, InvitationStatus};
use crate::services::directory::{is_unique_violation, normalize_phone};
use crate::services::matching::add_partner;
use crate::services::{begin, history, Engine};

impl Engine {
    /// The booking owner invites a registered player by phone number.
    pub fn send_invitation(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        booking_id: &str,
        phone: &str,
        message: Option<String>,
        now: NaiveDateTime,
    ) -> Result<Invitation, BookingError> {
        let tx = begin(conn)?;
        let booking = queries::get_booking(&tx, booking_id)?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;

        if !actor.is(&booking.owner_id) {
            return Err(BookingError::Forbidden("only the booking owner can send invitations"));
        }
        if booking.status == BookingStatus::Cancelled {
            return Err(BookingError::Cancelled);
        }

        let phone = normalize_phone(phone)?;
        let invitee = queries::get_player_by_phone(&tx, &phone)?.ok_or(BookingError::InviteeNotFound)?;

        if invitee.id == booking.owner_id {
            return Err(BookingError::SelfInvite);
        }
        if booking.is_member(&invitee.id) {
            return Err(BookingError::AlreadyMember);
        }
        if queries::invitation_exists(&tx, booking_id, &phone)? {
            return Err(BookingError::Duplicate);
        }

        let invitation = Invitation {
            id: uuid::Uuid::new_v4().to_string(),
            booking_id: booking_id.to_string(),
            inviter_id: booking.owner_id.clone(),
            invitee_id: Some(invitee.id.clone()),
            invitee_phone: phone,
            message: message.filter(|m| !m.trim().is_empty()),
            status: InvitationStatus::Pending,
            created_at: now,
            responded_at: None,
        };
        match queries::insert_invitation(&tx, &invitation) {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => return Err(BookingError::Duplicate),
            Err(e) => return Err(e.into()),
        }

        history::record(
            &tx,
            booking_id,
            HistoryAction::InvitationSent,
            actor,
            serde_json::json!({
                "invitation_id": invitation.id,
                "invitee_id": invitee.id,
                "invitee_phone": invitation.invitee_phone,
            }),
            None,
            now,
        )?;
        self.commit(tx, &[])?;

        tracing::info!(booking_id, invitation_id = %invitation.id, "invitation sent");
        Ok(invitation)
    }

    /// Accepting joins the invitee through the same checks as a direct join.
    /// If the join fails the invitation stays pending.
    pub fn respond_invitation(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        invitation_id: &str,
        accept: bool,
        now: NaiveDateTime,
    ) -> Result<Invitation, BookingError> {
        let tx = begin(conn)?;
        let mut invitation = queries::get_invitation(&tx, invitation_id)?
            .ok_or_else(|| BookingError::not_found("invitation", invitation_id))?;

        let invitee_id = match &invitation.invitee_id {
            Some(id) if actor.is(id) => id.clone(),
            _ => return Err(BookingError::Forbidden("only the invitee can respond to an invitation")),
        };
        if invitation.status != InvitationStatus::Pending {
            return Err(BookingError::InvitationResolved(invitation.status));
        }

        let (status, action) = if accept {
            let mut booking = queries::get_booking(&tx, &invitation.booking_id)?
                .ok_or_else(|| BookingError::not_found("booking", &invitation.booking_id))?;
            let invitee = queries::get_player(&tx, &invitee_id)?
                .ok_or_else(|| BookingError::not_found("player", &invitee_id))?;
            add_partner(&tx, &mut booking, &invitee, actor, now)?;
            (InvitationStatus::Accepted, HistoryAction::InvitationAccepted)
        } else {
            (InvitationStatus::Declined, HistoryAction::InvitationDeclined)
        };

        queries::update_invitation_status(&tx, invitation_id, status, Some(now))?;
        history::record(
            &tx,
            &invitation.booking_id,
            action,
            actor,
            serde_json::json!({ "invitation_id": invitation_id }),
            None,
            now,
        )?;
        self.commit(tx, &[])?;

        invitation.status = status;
        invitation.responded_at = Some(now);

        tracing::info!(invitation_id, status = %status, "invitation answered");
        Ok(invitation)
    }

    pub fn cancel_invitation(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        invitation_id: &str,
        now: NaiveDateTime,
    ) -> Result<Invitation, BookingError> {
        let tx = begin(conn)?;
        let mut invitation = queries::get_invitation(&tx, invitation_id)?
            .ok_or_else(|| BookingError::not_found("invitation", invitation_id))?;

        if !actor.is(&invitation.inviter_id) {
            return Err(BookingError::Forbidden("only the inviter can cancel an invitation"));
        }
        if invitation.status != InvitationStatus::Pending {
            return Err(BookingError::InvitationResolved(invitation.status));
        }

        queries::update_invitation_status(&tx, invitation_id, InvitationStatus::Cancelled, Some(now))?;
        history::record(
            &tx,
            &invitation.booking_id,
            HistoryAction::InvitationCancelled,
            actor,
            serde_json::json!({ "invitation_id": invitation_id }),
            None,
            now,
        )?;
        self.commit(tx, &[])?;

        invitation.status = InvitationStatus::Cancelled;
        invitation.responded_at = Some(now);
        Ok(invitation)
    }

    pub fn pending_invitations_for(&self, conn: &Connection, player_id: &str) -> Result<Vec<Invitation>, BookingError> {
        Ok(queries::pending_invitations_for(conn, player_id)?)
    }

    /// Every invitation sent for a booking, oldest first. Owner or staff.
    pub fn invitations_for_booking(
        &self,
        conn: &Connection,
        actor: &Actor,
        booking_id: &str,
    ) -> Result<Vec<Invitation>, BookingError> {
        let booking = queries::get_booking(conn, booking_id)?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        if !actor.is(&booking.owner_id) && !actor.is_privileged() {
            return Err(BookingError::Forbidden("only the owner can list invitations"));
        }
        Ok(queries::invitations_for_booking(conn, booking_id)?)
    }
}
