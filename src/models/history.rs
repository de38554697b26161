use chrono::NaiveDateTime;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub booking_id: String,
    pub action: HistoryAction,
    pub actor: Option<String>,
    pub changes: serde_json::Value,
    pub comment: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Confirmed,
    Cancelled,
    Rescheduled,
    PartnerJoined,
    InvitationSent,
    InvitationAccepted,
    InvitationDeclined,
    InvitationCancelled,
    PaymentPending,
    PaymentPaid,
    PaymentRefunded,
    Deleted,
}

impl HistoryAction {
    const ALL: [HistoryAction; 13] = [
        HistoryAction::Created,
        HistoryAction::Confirmed,
        HistoryAction::Cancelled,
        HistoryAction::Rescheduled,
        HistoryAction::PartnerJoined,
        HistoryAction::InvitationSent,
        HistoryAction::InvitationAccepted,
        HistoryAction::InvitationDeclined,
        HistoryAction::InvitationCancelled,
        HistoryAction::PaymentPending,
        HistoryAction::PaymentPaid,
        HistoryAction::PaymentRefunded,
        HistoryAction::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::Confirmed => "confirmed",
            HistoryAction::Cancelled => "cancelled",
            HistoryAction::Rescheduled => "rescheduled",
            HistoryAction::PartnerJoined => "partner_joined",
            HistoryAction::InvitationSent => "invitation_sent",
            HistoryAction::InvitationAccepted => "invitation_accepted",
            HistoryAction::InvitationDeclined => "invitation_declined",
            HistoryAction::InvitationCancelled => "invitation_cancelled",
            HistoryAction::PaymentPending => "payment_pending",
            HistoryAction::PaymentPaid => "payment_paid",
            HistoryAction::PaymentRefunded => "payment_refunded",
            HistoryAction::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

impl ToSql for HistoryAction {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for HistoryAction {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        HistoryAction::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown history action: {s}").into()))
    }
}
