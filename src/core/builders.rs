use super::{ChannelBinding, Status, Ticket, TicketNumber, UserId};
use chrono::{DateTime, Utc};

/// Builder for creating Ticket instances
///
/// Keeps `closed_at` consistent with the status unless one is set
/// explicitly: a finished status without a timestamp gets `Utc::now()`.
#[derive(Default)]
pub struct TicketBuilder {
    ticket_number: Option<TicketNumber>,
    user_id: Option<UserId>,
    username: Option<String>,
    channel: Option<ChannelBinding>,
    status: Option<Status>,
    created_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
}

impl TicketBuilder {
    /// Create a new ticket builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ticket number
    #[must_use]
    pub const fn ticket_number(mut self, ticket_number: TicketNumber) -> Self {
        self.ticket_number = Some(ticket_number);
        self
    }

    /// Set the requesting user
    #[must_use]
    pub const fn user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Set the display username
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the channel binding
    #[must_use]
    pub const fn channel(mut self, channel: ChannelBinding) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Set the status
    #[must_use]
    pub const fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Set `created_at` timestamp
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Set `closed_at` timestamp
    #[must_use]
    pub const fn closed_at(mut self, closed_at: DateTime<Utc>) -> Self {
        self.closed_at = Some(closed_at);
        self
    }

    /// Build the ticket
    pub fn build(self) -> Ticket {
        let status = self.status.unwrap_or_default();
        let closed_at = if status.is_finished() {
            Some(self.closed_at.unwrap_or_else(Utc::now))
        } else {
            None
        };

        Ticket {
            ticket_number: self.ticket_number.unwrap_or(TicketNumber::new(1)),
            user_id: self.user_id.unwrap_or_default(),
            username: self.username,
            channel: self.channel.unwrap_or(ChannelBinding::Pending),
            status,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            closed_at,
        }
    }
}
