//! SQL shared by both backends
//!
//! Statements use `$N` placeholders, which SQLite and Postgres both accept.

use crate::core::{ChannelBinding, Status, Ticket, TicketNumber};
use crate::error::RelayError;
use chrono::{DateTime, Utc};

pub(super) const NEXT_NUMBER: &str =
    "UPDATE counter SET value = value + 1 WHERE id = 1 RETURNING value";

pub(super) const INSERT_TICKET: &str = "INSERT INTO tickets \
     (ticket_number, user_id, username, channel_id, shared_channel, status, created_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7)";

pub(super) const UPDATE_CHANNEL: &str =
    "UPDATE tickets SET channel_id = $1, shared_channel = $2 WHERE ticket_number = $3";

/// Leaves only the newest open ticket per user open; binds `$1` closed_at
///
/// Data written before one-open-ticket-per-user was enforced can hold
/// several, which would block the partial unique index.
pub(super) const CLOSE_SUPERSEDED_OPEN: &str = "UPDATE tickets SET status = 'closed', closed_at = $1 \
     WHERE status = 'open' AND ticket_number NOT IN \
     (SELECT MAX(ticket_number) FROM tickets WHERE status = 'open' GROUP BY user_id)";

const COLUMNS: &str =
    "ticket_number, user_id, username, channel_id, shared_channel, status, created_at, closed_at";

pub(super) fn select_by_channel() -> String {
    // Degraded-mode tickets share one channel; prefer the open one, then the newest.
    format!(
        "SELECT {COLUMNS} FROM tickets WHERE channel_id = $1 \
         ORDER BY CASE WHEN status = 'open' THEN 0 ELSE 1 END, created_at DESC, ticket_number DESC \
         LIMIT 1"
    )
}

pub(super) fn select_by_user_status() -> String {
    format!(
        "SELECT {COLUMNS} FROM tickets WHERE user_id = $1 AND status = $2 \
         ORDER BY created_at DESC, ticket_number DESC LIMIT 1"
    )
}

pub(super) fn select_latest_by_user() -> String {
    format!(
        "SELECT {COLUMNS} FROM tickets WHERE user_id = $1 \
         ORDER BY created_at DESC, ticket_number DESC LIMIT 1"
    )
}

pub(super) fn select_by_number() -> String {
    format!("SELECT {COLUMNS} FROM tickets WHERE ticket_number = $1")
}

/// Guarded status update: binds `$1` status, `$2` closed_at, `$3` ticket number
///
/// The allowed source states are inlined from [`Status::sources`], so a row
/// only changes when the edge exists.
pub(super) fn transition(target: Status) -> String {
    let sources = target
        .sources()
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE tickets SET status = $1, closed_at = $2 \
         WHERE ticket_number = $3 AND status IN ({sources})"
    )
}

/// `closed_at` value that accompanies a move into `target`
pub(super) fn closed_at_for(target: Status) -> Option<DateTime<Utc>> {
    target.is_finished().then(Utc::now)
}

/// Raw row shape shared by both backends
#[derive(Debug, sqlx::FromRow)]
pub(super) struct TicketRow {
    ticket_number: i64,
    user_id: i64,
    username: Option<String>,
    channel_id: Option<i64>,
    shared_channel: bool,
    status: String,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = RelayError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<Status>().map_err(RelayError::CorruptRow)?;
        Ok(Self {
            ticket_number: TicketNumber::new(row.ticket_number),
            user_id: row.user_id,
            username: row.username,
            channel: ChannelBinding::from_columns(row.channel_id, row.shared_channel),
            status,
            created_at: row.created_at,
            closed_at: row.closed_at,
        })
    }
}

pub(super) fn into_ticket(row: Option<TicketRow>) -> crate::error::Result<Option<Ticket>> {
    row.map(Ticket::try_from).transpose()
}
