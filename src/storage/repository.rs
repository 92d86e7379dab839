use crate::core::{ChannelBinding, Status, Ticket, TicketNumber, UserId};
use crate::error::Result;
use async_trait::async_trait;

/// Repository trait for ticket persistence
///
/// Every method is one atomic unit against the backend: it either commits
/// completely or leaves no trace. Absence is reported as `Ok(None)` or
/// `Ok(false)`, never as an error.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Creates tables, the counter row and indexes if they are missing
    async fn init(&self) -> Result<()>;

    /// Atomically increments the counter and returns the new value
    async fn next_ticket_number(&self) -> Result<TicketNumber>;

    /// Allocates a number and inserts an open ticket in one transaction
    ///
    /// Fails with `ConstraintViolation` when the channel is already bound to
    /// another ticket or the user already has an open ticket.
    async fn create_ticket(
        &self,
        user_id: UserId,
        username: Option<&str>,
        channel: ChannelBinding,
    ) -> Result<TicketNumber>;

    /// Backfills the channel after it was created; returns whether the ticket exists
    async fn update_channel(&self, ticket_number: TicketNumber, channel: ChannelBinding)
    -> Result<bool>;

    /// Reverse lookup from an admin-side channel
    async fn get_by_channel(&self, channel_id: i64) -> Result<Option<Ticket>>;

    /// Most recent ticket of `user_id` in the given state
    async fn get_by_user(&self, user_id: UserId, status: Status) -> Result<Option<Ticket>>;

    /// Most recent ticket of `user_id` in any state
    async fn latest_by_user(&self, user_id: UserId) -> Result<Option<Ticket>>;

    async fn get_by_number(&self, ticket_number: TicketNumber) -> Result<Option<Ticket>>;

    /// Moves a ticket to `new_status` if the state machine allows it from
    /// the current state, setting or clearing `closed_at` to match.
    ///
    /// Returns `false` when the ticket is absent or the edge does not exist.
    async fn transition(&self, ticket_number: TicketNumber, new_status: Status) -> Result<bool>;
}
