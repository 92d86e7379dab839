//! Ticket lifecycle engine
//!
//! [`TicketManager`] ties ticket state in the store to discussion channels on
//! the transport. State changes go through the store's atomic primitives;
//! channel creation, renames and first-message delivery are best-effort side
//! effects that never roll back a state change.

use crate::core::{
    ChannelBinding, ChatId, Status, Ticket, TicketNumber, UserId, attribution, channel_label,
};
use crate::error::{RelayError, Result, TransportError};
use crate::storage::TicketStore;
use crate::transport::{OutgoingMessage, Transport};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle operations over tickets and their discussion channels
///
/// Built once at startup and shared by every handler task.
#[derive(Clone)]
pub struct TicketManager {
    store: Arc<dyn TicketStore>,
    transport: Arc<dyn Transport>,
    admin_group_id: ChatId,
}

impl TicketManager {
    pub fn new(
        store: Arc<dyn TicketStore>,
        transport: Arc<dyn Transport>,
        admin_group_id: ChatId,
    ) -> Self {
        Self {
            store,
            transport,
            admin_group_id,
        }
    }

    #[must_use]
    pub const fn admin_group_id(&self) -> ChatId {
        self.admin_group_id
    }

    #[must_use]
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Open a ticket for `user_id` and create its discussion channel
    ///
    /// Returns the user's existing open ticket instead of creating a second
    /// one. When the transport cannot create a channel, the ticket is bound
    /// to the admin group itself. Failure to post `first_message` is logged
    /// only; the ticket still counts as created.
    pub async fn create_ticket_channel(
        &self,
        user_id: UserId,
        username: Option<&str>,
        first_message: &str,
    ) -> Result<Ticket> {
        if let Some(existing) = self.store.get_by_user(user_id, Status::Open).await? {
            info!(
                "User {user_id} already has open ticket #{}",
                existing.ticket_number
            );
            return Ok(existing);
        }

        let ticket_number = match self
            .store
            .create_ticket(user_id, username, ChannelBinding::Pending)
            .await
        {
            Ok(number) => number,
            // A concurrent create for the same user won the open-ticket slot.
            Err(err @ RelayError::ConstraintViolation(_)) => {
                return self.store.get_by_user(user_id, Status::Open).await?.ok_or(err);
            },
            Err(err) => return Err(err),
        };

        let name = channel_label(ticket_number, username, user_id, Status::Open);
        let channel = match self
            .transport
            .create_discussion_channel(self.admin_group_id, &name)
            .await
        {
            Ok(thread_id) => {
                info!("Created discussion channel {thread_id} for ticket #{ticket_number}");
                ChannelBinding::Dedicated(thread_id)
            },
            Err(e) => {
                error!("Failed to create discussion channel for ticket #{ticket_number}: {e}");
                ChannelBinding::Shared(self.admin_group_id)
            },
        };
        if let Err(e) = self.store.update_channel(ticket_number, channel).await {
            if let ChannelBinding::Dedicated(thread_id) = channel {
                error!(
                    "Discussion channel {thread_id} was created for ticket #{ticket_number} \
                     but could not be recorded; it is orphaned: {e}"
                );
            }
            return Err(e);
        }

        let message = OutgoingMessage::new(
            self.admin_group_id,
            format!("{}: {first_message}", attribution(username, user_id)),
        )
        .in_thread(channel.thread_id());
        if let Err(e) = self.transport.send_message(message).await {
            warn!("Failed to send initial message for ticket #{ticket_number}: {e}");
        }

        info!("Created ticket #{ticket_number} for user {user_id}");
        self.store
            .get_by_number(ticket_number)
            .await?
            .ok_or_else(|| {
                RelayError::CorruptRow(format!("ticket #{ticket_number} missing after creation"))
            })
    }

    /// Close a ticket and relabel its channel
    ///
    /// Returns `false` when the ticket does not exist or is not open.
    pub async fn close_ticket_channel(&self, ticket_number: TicketNumber) -> Result<bool> {
        let Some(ticket) = self.store.get_by_number(ticket_number).await? else {
            return Ok(false);
        };
        if !self.store.transition(ticket_number, Status::Closed).await? {
            return Ok(false);
        }
        self.rename_channel(&ticket, Status::Closed).await;
        Ok(true)
    }

    /// Move a closed ticket back to open
    ///
    /// Fails with [`RelayError::OpenTicketExists`] when the owner already has
    /// another open ticket. Channel relabeling is left to the caller.
    pub async fn reopen_ticket(&self, ticket_number: TicketNumber) -> Result<bool> {
        match self.store.transition(ticket_number, Status::Open).await {
            Err(RelayError::ConstraintViolation(detail)) => {
                let open = match self.store.get_by_number(ticket_number).await? {
                    Some(ticket) => self.store.get_by_user(ticket.user_id, Status::Open).await?,
                    None => None,
                };
                Err(open.map_or(RelayError::ConstraintViolation(detail), |other| {
                    RelayError::OpenTicketExists {
                        ticket_number: other.ticket_number,
                    }
                }))
            },
            other => other,
        }
    }

    /// Mark an open or closed ticket resolved
    pub async fn resolve_ticket(&self, ticket_number: TicketNumber) -> Result<bool> {
        self.store.transition(ticket_number, Status::Resolved).await
    }

    /// Relabel a ticket's channel to match its current status (best-effort)
    pub async fn refresh_channel_name(&self, ticket_number: TicketNumber) -> Result<()> {
        if let Some(ticket) = self.store.get_by_number(ticket_number).await? {
            self.rename_channel(&ticket, ticket.status).await;
        }
        Ok(())
    }

    async fn rename_channel(&self, ticket: &Ticket, status: Status) {
        // The shared admin group has no per-ticket title to change.
        let ChannelBinding::Dedicated(thread_id) = ticket.channel else {
            debug!(
                "Ticket #{} has no dedicated channel to rename",
                ticket.ticket_number
            );
            return;
        };
        let name = channel_label(
            ticket.ticket_number,
            ticket.username.as_deref(),
            ticket.user_id,
            status,
        );
        if let Err(e) = self
            .transport
            .rename_discussion_channel(self.admin_group_id, thread_id, &name)
            .await
        {
            warn!(
                "Could not rename channel for ticket #{}: {e}",
                ticket.ticket_number
            );
        }
    }

    /// Forward a user's message into the ticket's channel as `@name: text`
    pub async fn relay_to_channel(
        &self,
        ticket: &Ticket,
        username: Option<&str>,
        text: &str,
    ) -> std::result::Result<(), TransportError> {
        let author = attribution(username.or(ticket.username.as_deref()), ticket.user_id);
        self.notify_channel(ticket, format!("{author}: {text}")).await
    }

    /// Post a bot notice into the ticket's channel
    pub async fn notify_channel(
        &self,
        ticket: &Ticket,
        text: impl Into<String> + Send,
    ) -> std::result::Result<(), TransportError> {
        let message = OutgoingMessage::new(self.admin_group_id, text)
            .in_thread(ticket.channel.thread_id());
        self.transport.send_message(message).await
    }

    /// The user's open ticket, if any
    pub async fn get_user_ticket(&self, user_id: UserId) -> Result<Option<Ticket>> {
        self.store.get_by_user(user_id, Status::Open).await
    }

    /// Reverse lookup from an admin-side channel to its ticket
    pub async fn get_ticket_info(&self, channel_id: i64) -> Result<Option<Ticket>> {
        self.store.get_by_channel(channel_id).await
    }

    pub async fn get_ticket_by_number(&self, ticket_number: TicketNumber) -> Result<Option<Ticket>> {
        self.store.get_by_number(ticket_number).await
    }

    /// The user's most recent ticket in any status
    pub async fn latest_user_ticket(&self, user_id: UserId) -> Result<Option<Ticket>> {
        self.store.latest_by_user(user_id).await
    }
}
