use std::sync::Arc;

use rusqlite::Connection;

use crate::db::queries;
use crate::models::Booking;
use crate::services::messaging::MessagingProvider;

/// Booking events that produce an SMS.
#[derive(Debug, Clone, Copy)]
pub enum Notice<'a> {
    Created { booking: &'a Booking, court_name: &'a str },
    Confirmed { booking: &'a Booking },
    Cancelled { booking: &'a Booking },
    Invited { booking: &'a Booking, inviter_name: &'a str },
    PartnerJoined { booking: &'a Booking, partner_name: &'a str },
}

fn when(booking: &Booking) -> String {
    format!(
        "{} {}-{}",
        booking.date.format("%d.%m.%Y"),
        booking.start_time.format("%H:%M"),
        booking.end_time.format("%H:%M")
    )
}

impl Notice<'_> {
    pub fn body(&self) -> String {
        match self {
            Notice::Created { booking, court_name } => {
                format!("Booked {court_name} for {}. Confirm within 24h of the start.", when(booking))
            }
            Notice::Confirmed { booking } => format!("Your booking for {} is confirmed.", when(booking)),
            Notice::Cancelled { booking } => format!("The game on {} was cancelled.", when(booking)),
            Notice::Invited { booking, inviter_name } => {
                format!("{inviter_name} invited you to play on {}.", when(booking))
            }
            Notice::PartnerJoined { booking, partner_name } => format!(
                "{partner_name} joined your game on {} ({}/{} players).",
                when(booking),
                booking.participant_count(),
                booking.max_players
            ),
        }
    }
}

/// Sends `notice` to a player in the background. Call only after the change
/// it describes has committed. Failures are logged and otherwise ignored.
pub fn to_player(
    conn: &Connection,
    messaging: &Arc<dyn MessagingProvider>,
    player_id: &str,
    notice: Notice<'_>,
) {
    let phone = match queries::get_player(conn, player_id) {
        Ok(Some(player)) => player.phone,
        Ok(None) => {
            tracing::warn!(player_id, "notification skipped, player not found");
            return;
        }
        Err(e) => {
            tracing::warn!(player_id, error = %e, "notification skipped, player lookup failed");
            return;
        }
    };

    let body = notice.body();
    let messaging = Arc::clone(messaging);
    tokio::spawn(async move {
        if let Err(e) = messaging.send_message(&phone, &body).await {
            tracing::warn!(to = %phone, error = %e, "failed to deliver booking notification");
        }
    });
}

/// Sends `notice` to the owner and every partner of `booking`.
pub fn to_participants(
    conn: &Connection,
    messaging: &Arc<dyn MessagingProvider>,
    booking: &Booking,
    notice: Notice<'_>,
) {
    for player_id in std::iter::once(&booking.owner_id).chain(&booking.partners) {
        to_player(conn, messaging, player_id, notice);
    }
}
