//! Relay router
//!
//! Routes each classified [`Inbound`] event: user messages go to the ticket's
//! discussion channel, admin messages go back to the ticket's user, and
//! commands and button presses drive the lifecycle through
//! [`TicketManager`]. Every failure is turned into a short notice for whoever
//! triggered the event; nothing escapes [`Relay::dispatch`].

mod messages;
mod pending;

pub use pending::PendingMessages;

use crate::core::{ChatId, Status, Ticket, TicketNumber};
use crate::error::{RelayError, Result};
use crate::manager::TicketManager;
use crate::transport::{
    AdminCommand, CallbackAction, Inbound, OutgoingMessage, Sender, UserCommand,
};
use tracing::{debug, error, info, warn};

/// Where to report a failure for one event
#[derive(Debug, Clone, Copy)]
enum ReplyTarget {
    Chat {
        chat_id: ChatId,
        thread_id: Option<i64>,
    },
    Callback {
        chat_id: ChatId,
        message_id: i64,
    },
}

/// Event router shared by all handler tasks
pub struct Relay {
    manager: TicketManager,
    pending: PendingMessages,
}

impl Relay {
    #[must_use]
    pub fn new(manager: TicketManager) -> Self {
        Self {
            manager,
            pending: PendingMessages::new(),
        }
    }

    #[must_use]
    pub const fn manager(&self) -> &TicketManager {
        &self.manager
    }

    #[must_use]
    pub const fn pending(&self) -> &PendingMessages {
        &self.pending
    }

    /// Handle one inbound event to completion
    pub async fn dispatch(&self, event: Inbound) {
        let target = reply_target(&event);
        let result = match event {
            Inbound::UserMessage {
                from,
                chat_id,
                text,
            } => self.handle_user_message(&from, chat_id, text).await,
            Inbound::UserCommand {
                from,
                chat_id,
                command,
            } => self.handle_user_command(&from, chat_id, command).await,
            Inbound::AdminMessage {
                chat_id,
                thread_id,
                text,
            } => self.handle_admin_message(chat_id, thread_id, &text).await,
            Inbound::AdminCommand {
                chat_id,
                thread_id,
                command,
            } => self.handle_admin_command(chat_id, thread_id, command).await,
            Inbound::Callback {
                id,
                from,
                chat_id,
                message_id,
                action,
            } => {
                if let Err(e) = self.manager.transport().answer_callback(&id).await {
                    warn!("Failed to answer callback {id}: {e}");
                }
                self.handle_callback(&from, chat_id, message_id, action)
                    .await
            },
        };

        if let Err(e) = result {
            error!("Exception while handling an update: {e}");
            self.report_failure(target, &e).await;
        }
    }

    async fn report_failure(&self, target: ReplyTarget, err: &RelayError) {
        let text = match err {
            RelayError::OpenTicketExists { .. } => err.user_message(),
            _ => messages::GENERIC_FAILURE.to_string(),
        };
        match target {
            ReplyTarget::Chat { chat_id, thread_id } => {
                self.send(OutgoingMessage::new(chat_id, text).in_thread(thread_id))
                    .await;
            },
            ReplyTarget::Callback {
                chat_id,
                message_id,
            } => self.edit(chat_id, message_id, &text, false).await,
        }
    }

    async fn handle_user_message(&self, from: &Sender, chat_id: ChatId, text: String) -> Result<()> {
        match self.manager.get_user_ticket(from.id).await? {
            Some(ticket) => {
                // A prompt from before the ticket was opened elsewhere is moot now.
                self.pending.clear(from.id);
                if let Err(e) = self
                    .manager
                    .relay_to_channel(&ticket, from.username.as_deref(), &text)
                    .await
                {
                    error!(
                        "Failed to forward message to ticket #{}: {e}",
                        ticket.ticket_number
                    );
                    self.send(OutgoingMessage::new(chat_id, messages::FORWARD_FAILED))
                        .await;
                }
            },
            None => {
                self.pending.stash(from.id, text);
                self.send(
                    OutgoingMessage::new(chat_id, messages::NO_TICKET_PROMPT)
                        .with_keyboard(messages::create_ticket_keyboard()),
                )
                .await;
            },
        }
        Ok(())
    }

    async fn handle_user_command(
        &self,
        from: &Sender,
        chat_id: ChatId,
        command: UserCommand,
    ) -> Result<()> {
        let reply = match command {
            UserCommand::Start => match self.manager.get_user_ticket(from.id).await? {
                Some(ticket) => {
                    OutgoingMessage::new(chat_id, messages::open_ticket_greeting(ticket.ticket_number))
                        .markdown()
                },
                None => OutgoingMessage::new(chat_id, messages::GREETING)
                    .with_keyboard(messages::create_ticket_keyboard()),
            },
            UserCommand::NewTicket => match self.manager.get_user_ticket(from.id).await? {
                Some(ticket) => {
                    OutgoingMessage::new(chat_id, messages::already_open(ticket.ticket_number))
                        .markdown()
                },
                None => OutgoingMessage::new(chat_id, messages::DESCRIBE_ISSUE),
            },
            UserCommand::Status => match self.manager.latest_user_ticket(from.id).await? {
                Some(ticket) => {
                    OutgoingMessage::new(chat_id, messages::status_card(&ticket)).markdown()
                },
                None => OutgoingMessage::new(chat_id, messages::NO_TICKETS_YET)
                    .with_keyboard(messages::create_ticket_keyboard()),
            },
            UserCommand::Close => match self.manager.get_user_ticket(from.id).await? {
                Some(ticket) => OutgoingMessage::new(
                    chat_id,
                    messages::close_confirmation(ticket.ticket_number),
                )
                .markdown()
                .with_keyboard(messages::close_confirmation_keyboard(ticket.ticket_number)),
                None => OutgoingMessage::new(chat_id, messages::NOTHING_TO_CLOSE),
            },
        };
        self.send(reply).await;
        Ok(())
    }

    /// Resolve the ticket an admin-side event belongs to
    ///
    /// Inside a topic the thread identifies the ticket; elsewhere in the group
    /// the group id itself is the (shared) channel.
    async fn channel_ticket(&self, chat_id: ChatId, thread_id: Option<i64>) -> Result<Option<Ticket>> {
        self.manager
            .get_ticket_info(thread_id.unwrap_or(chat_id))
            .await
    }

    async fn handle_admin_message(
        &self,
        chat_id: ChatId,
        thread_id: Option<i64>,
        text: &str,
    ) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let Some(ticket) = self.channel_ticket(chat_id, thread_id).await? else {
            debug!("Ignoring admin message outside a ticket channel");
            return Ok(());
        };
        if !ticket.is_open() {
            debug!(
                "Dropping admin message for {} ticket #{}",
                ticket.status, ticket.ticket_number
            );
            return Ok(());
        }

        let delivery = self
            .manager
            .transport()
            .send_message(OutgoingMessage::new(ticket.user_id, text))
            .await;
        if let Err(e) = delivery {
            error!("Failed to send message to user {}: {e}", ticket.user_id);
            self.send(OutgoingMessage::new(chat_id, e.admin_diagnostic()).in_thread(thread_id))
                .await;
        }
        Ok(())
    }

    async fn handle_admin_command(
        &self,
        chat_id: ChatId,
        thread_id: Option<i64>,
        command: AdminCommand,
    ) -> Result<()> {
        let reply = |text: String| OutgoingMessage::new(chat_id, text).in_thread(thread_id);

        let Some(ticket) = self.channel_ticket(chat_id, thread_id).await? else {
            self.send(reply(messages::NOT_A_TICKET_CHANNEL.to_string()))
                .await;
            return Ok(());
        };
        let number = ticket.ticket_number;

        let text = match command {
            AdminCommand::Close => {
                if !ticket.status.can_transition_to(Status::Closed) {
                    messages::already_finished(&ticket)
                } else if self.manager.close_ticket_channel(number).await? {
                    self.notify_user(
                        &ticket,
                        OutgoingMessage::new(ticket.user_id, messages::closed_by_admin(number))
                            .markdown()
                            .with_keyboard(messages::closed_by_admin_keyboard(number)),
                    )
                    .await;
                    messages::admin_confirmation(number, Status::Closed)
                } else {
                    "Failed to close ticket. Please try again.".to_string()
                }
            },
            AdminCommand::Reopen => {
                if !ticket.status.can_transition_to(Status::Open) {
                    messages::cannot_reopen(&ticket)
                } else {
                    match self.manager.reopen_ticket(number).await {
                        Ok(true) => {
                            self.manager.refresh_channel_name(number).await?;
                            self.notify_transition(&ticket, Status::Open).await;
                            messages::admin_confirmation(number, Status::Open)
                        },
                        Ok(false) => messages::REOPEN_FAILED.to_string(),
                        Err(RelayError::OpenTicketExists { ticket_number }) => {
                            messages::admin_reopen_blocked(number, ticket_number)
                        },
                        Err(e) => return Err(e),
                    }
                }
            },
            AdminCommand::Resolve => {
                if !ticket.status.can_transition_to(Status::Resolved) {
                    messages::already_finished(&ticket)
                } else if self.manager.resolve_ticket(number).await? {
                    self.manager.refresh_channel_name(number).await?;
                    self.notify_transition(&ticket, Status::Resolved).await;
                    messages::admin_confirmation(number, Status::Resolved)
                } else {
                    messages::RESOLVE_FAILED.to_string()
                }
            },
        };
        self.send(reply(text).markdown()).await;
        Ok(())
    }

    async fn handle_callback(
        &self,
        from: &Sender,
        chat_id: ChatId,
        message_id: i64,
        action: CallbackAction,
    ) -> Result<()> {
        let text = match action {
            CallbackAction::CreateTicket => return self.create_from_pending(from, chat_id, message_id).await,
            CallbackAction::UserClose(number) => {
                self.user_transition(from, number, Status::Closed).await?
            },
            CallbackAction::Reopen(number) => self.user_transition(from, number, Status::Open).await?,
            CallbackAction::Resolve(number) => {
                self.user_transition(from, number, Status::Resolved).await?
            },
            CallbackAction::Cancel => messages::CANCELLED.to_string(),
            CallbackAction::Invalid => messages::INVALID_TICKET_NUMBER.to_string(),
            CallbackAction::Unknown(data) => {
                debug!("Ignoring unknown callback data {data:?}");
                return Ok(());
            },
        };
        self.edit(chat_id, message_id, &text, true).await;
        Ok(())
    }

    async fn create_from_pending(&self, from: &Sender, chat_id: ChatId, message_id: i64) -> Result<()> {
        if let Some(existing) = self.manager.get_user_ticket(from.id).await? {
            let text = messages::already_open(existing.ticket_number);
            self.edit(chat_id, message_id, &text, true).await;
            return Ok(());
        }

        let Some(first_message) = self.pending.take(from.id) else {
            self.edit(chat_id, message_id, messages::AWAITING_DESCRIPTION, false)
                .await;
            return Ok(());
        };

        match self
            .manager
            .create_ticket_channel(from.id, from.username.as_deref(), &first_message)
            .await
        {
            Ok(ticket) => {
                let text = messages::ticket_created(ticket.ticket_number);
                self.edit(chat_id, message_id, &text, true).await;
            },
            Err(e) => {
                error!("Error creating ticket for user {}: {e}", from.id);
                // The next press retries with this text.
                self.pending.restore(from.id, first_message);
                self.edit(chat_id, message_id, messages::CREATE_FAILED, false)
                    .await;
            },
        }
        Ok(())
    }

    /// Apply a user-requested transition to one of the user's own tickets
    ///
    /// Returns the text that replaces the button message.
    async fn user_transition(&self, from: &Sender, number: TicketNumber, target: Status) -> Result<String> {
        let failed = match target {
            Status::Open => messages::REOPEN_FAILED,
            Status::Closed => messages::CLOSE_FAILED,
            Status::Resolved => messages::RESOLVE_FAILED,
        };
        let ticket = match self.manager.get_ticket_by_number(number).await? {
            Some(ticket) if ticket.user_id == from.id => ticket,
            Some(_) => {
                warn!("User {} tried to change ticket #{number} they do not own", from.id);
                return Ok(failed.to_string());
            },
            None => return Ok(failed.to_string()),
        };

        let changed = match target {
            Status::Closed => self.manager.close_ticket_channel(number).await,
            Status::Open => self.manager.reopen_ticket(number).await,
            Status::Resolved => self.manager.resolve_ticket(number).await,
        };
        let changed = match changed {
            Ok(changed) => changed,
            Err(RelayError::OpenTicketExists { ticket_number }) => {
                return Ok(messages::already_open(ticket_number));
            },
            Err(e) => return Err(e),
        };
        if !changed {
            return Ok(failed.to_string());
        }

        info!("User {} moved ticket #{number} to {target}", from.id);
        if target != Status::Closed {
            self.manager.refresh_channel_name(number).await?;
        }
        if let Err(e) = self
            .manager
            .notify_channel(&ticket, messages::user_action_notice(number, target))
            .await
        {
            warn!("Could not notify admins about ticket #{number}: {e}");
        }
        Ok(messages::user_transition_notice(number, target))
    }

    async fn notify_transition(&self, ticket: &Ticket, status: Status) {
        let notice = messages::user_transition_notice(ticket.ticket_number, status);
        self.notify_user(ticket, OutgoingMessage::new(ticket.user_id, notice).markdown())
            .await;
    }

    async fn notify_user(&self, ticket: &Ticket, message: OutgoingMessage) {
        if let Err(e) = self.manager.transport().send_message(message).await {
            warn!(
                "Could not notify user {} about ticket #{}: {e}",
                ticket.user_id, ticket.ticket_number
            );
        }
    }

    async fn send(&self, message: OutgoingMessage) {
        let chat_id = message.chat_id;
        if let Err(e) = self.manager.transport().send_message(message).await {
            warn!("Failed to send reply to chat {chat_id}: {e}");
        }
    }

    async fn edit(&self, chat_id: ChatId, message_id: i64, text: &str, markdown: bool) {
        if let Err(e) = self
            .manager
            .transport()
            .edit_message(chat_id, message_id, text, markdown)
            .await
        {
            warn!("Failed to edit message {message_id} in chat {chat_id}: {e}");
        }
    }
}

fn reply_target(event: &Inbound) -> ReplyTarget {
    match event {
        Inbound::UserMessage { chat_id, .. } | Inbound::UserCommand { chat_id, .. } => {
            ReplyTarget::Chat {
                chat_id: *chat_id,
                thread_id: None,
            }
        },
        Inbound::AdminMessage {
            chat_id, thread_id, ..
        }
        | Inbound::AdminCommand {
            chat_id, thread_id, ..
        } => ReplyTarget::Chat {
            chat_id: *chat_id,
            thread_id: *thread_id,
        },
        Inbound::Callback {
            chat_id,
            message_id,
            ..
        } => ReplyTarget::Callback {
            chat_id: *chat_id,
            message_id: *message_id,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ChannelBinding;
    use crate::error::TransportError;
    use crate::storage::TicketStore;
    use crate::test_utils::{FaultyStore, RecordingTransport, TestStore};
    use std::sync::Arc;

    const ADMIN: ChatId = -100_42;
    const USER: i64 = 501;

    struct Harness {
        fixture: TestStore,
        transport: Arc<RecordingTransport>,
        relay: Relay,
    }

    async fn harness(transport: RecordingTransport) -> Harness {
        let fixture = TestStore::new().await;
        let transport = Arc::new(transport);
        let manager = TicketManager::new(fixture.shared(), transport.clone(), ADMIN);
        Harness {
            fixture,
            transport,
            relay: Relay::new(manager),
        }
    }

    fn alice() -> Sender {
        Sender {
            id: USER,
            username: Some("alice".to_string()),
        }
    }

    fn user_message(text: &str) -> Inbound {
        Inbound::UserMessage {
            from: alice(),
            chat_id: USER,
            text: text.to_string(),
        }
    }

    fn callback(action: CallbackAction) -> Inbound {
        Inbound::Callback {
            id: "cb".to_string(),
            from: alice(),
            chat_id: USER,
            message_id: 900,
            action,
        }
    }

    fn admin_command(thread_id: Option<i64>, command: AdminCommand) -> Inbound {
        Inbound::AdminCommand {
            chat_id: ADMIN,
            thread_id,
            command,
        }
    }

    #[tokio::test]
    async fn test_first_message_prompts_and_stashes() {
        let h = harness(RecordingTransport::new()).await;
        h.relay.dispatch(user_message("help me")).await;

        let sent = h.transport.sent_to(USER);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, messages::NO_TICKET_PROMPT);
        assert!(sent[0].keyboard.is_some());
        assert_eq!(h.relay.pending().take(USER), Some("help me".to_string()));
    }

    #[tokio::test]
    async fn test_create_button_opens_ticket_with_pending_text() {
        let h = harness(RecordingTransport::new()).await;
        h.relay.dispatch(user_message("first")).await;
        h.relay.dispatch(user_message("help me")).await;
        h.relay.dispatch(callback(CallbackAction::CreateTicket)).await;

        let ticket = h.fixture.store.get_by_user(USER, Status::Open).await.unwrap().unwrap();
        let thread = ticket.channel.thread_id();
        assert!(thread.is_some());

        let forwarded = h.transport.sent_to(ADMIN);
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0].text, "@alice: help me");
        assert_eq!(forwarded[0].thread_id, thread);

        assert_eq!(h.relay.pending().take(USER), None);
        assert_eq!(h.transport.answered(), ["cb"]);
        assert!(h.transport.last_edit().unwrap().contains("Ticket #1 created"));
    }

    #[tokio::test]
    async fn test_create_button_without_pending_text_asks_for_description() {
        let h = harness(RecordingTransport::new()).await;
        h.relay.dispatch(callback(CallbackAction::CreateTicket)).await;
        assert_eq!(
            h.transport.last_edit().as_deref(),
            Some(messages::AWAITING_DESCRIPTION)
        );
        assert!(h.fixture.store.latest_by_user(USER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_degraded_mode_routes_through_admin_group() {
        let h = harness(RecordingTransport::without_topics()).await;
        h.relay.dispatch(user_message("help me")).await;
        h.relay.dispatch(callback(CallbackAction::CreateTicket)).await;

        let ticket = h.fixture.store.get_by_user(USER, Status::Open).await.unwrap().unwrap();
        assert_eq!(ticket.channel, ChannelBinding::Shared(ADMIN));
        assert!(h.transport.created().is_empty());

        h.relay
            .dispatch(Inbound::AdminMessage {
                chat_id: ADMIN,
                thread_id: None,
                text: "hi alice".to_string(),
            })
            .await;
        let delivered = h.transport.sent_to(USER);
        assert_eq!(delivered.last().unwrap().text, "hi alice");
    }

    #[tokio::test]
    async fn test_message_with_open_ticket_is_relayed() {
        let h = harness(RecordingTransport::new()).await;
        h.fixture
            .store
            .create_ticket(USER, Some("alice"), ChannelBinding::Dedicated(31))
            .await
            .unwrap();

        h.relay.dispatch(user_message("more details")).await;

        let forwarded = h.transport.sent_to(ADMIN);
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0].thread_id, Some(31));
        assert_eq!(forwarded[0].text, "@alice: more details");
        assert!(h.transport.sent_to(USER).is_empty());
    }

    #[tokio::test]
    async fn test_forward_failure_is_reported_to_user() {
        let transport = RecordingTransport::new();
        transport.fail_sends_to(ADMIN, TransportError::Timeout);
        let h = harness(transport).await;
        h.fixture
            .store
            .create_ticket(USER, None, ChannelBinding::Dedicated(31))
            .await
            .unwrap();

        h.relay.dispatch(user_message("hello?")).await;
        let replies = h.transport.sent_to(USER);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].text, messages::FORWARD_FAILED);
    }

    #[tokio::test]
    async fn test_admin_message_reaches_user_as_plain_text() {
        let h = harness(RecordingTransport::new()).await;
        h.fixture
            .store
            .create_ticket(USER, None, ChannelBinding::Dedicated(31))
            .await
            .unwrap();

        h.relay
            .dispatch(Inbound::AdminMessage {
                chat_id: ADMIN,
                thread_id: Some(31),
                text: "use *this*_link".to_string(),
            })
            .await;

        let delivered = h.transport.sent_to(USER);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].text, "use *this*_link");
        assert!(!delivered[0].markdown);
    }

    #[tokio::test]
    async fn test_admin_message_delivery_failure_is_diagnosed_in_channel() {
        let transport = RecordingTransport::new();
        transport.fail_sends_to(USER, TransportError::Blocked);
        let h = harness(transport).await;
        h.fixture
            .store
            .create_ticket(USER, None, ChannelBinding::Dedicated(31))
            .await
            .unwrap();

        h.relay
            .dispatch(Inbound::AdminMessage {
                chat_id: ADMIN,
                thread_id: Some(31),
                text: "hello".to_string(),
            })
            .await;

        let diagnostics = h.transport.sent_to(ADMIN);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].thread_id, Some(31));
        assert_eq!(
            diagnostics[0].text,
            "⚠️ Could not deliver message. User has blocked the bot."
        );
    }

    #[tokio::test]
    async fn test_admin_message_outside_ticket_is_dropped() {
        let h = harness(RecordingTransport::new()).await;
        h.relay
            .dispatch(Inbound::AdminMessage {
                chat_id: ADMIN,
                thread_id: Some(404),
                text: "anyone?".to_string(),
            })
            .await;
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_admin_close_notifies_user_with_options() {
        let h = harness(RecordingTransport::new()).await;
        let number = h
            .fixture
            .store
            .create_ticket(USER, Some("alice"), ChannelBinding::Dedicated(31))
            .await
            .unwrap();

        h.relay.dispatch(admin_command(Some(31), AdminCommand::Close)).await;

        let ticket = h.fixture.store.get_by_number(number).await.unwrap().unwrap();
        assert_eq!(ticket.status, Status::Closed);

        let to_user = h.transport.sent_to(USER);
        assert_eq!(to_user.len(), 1);
        let buttons: Vec<String> = to_user[0]
            .keyboard
            .iter()
            .flatten()
            .flatten()
            .map(|b| b.callback_data.clone())
            .collect();
        assert_eq!(buttons, ["reopen_1", "resolve_1"]);

        assert_eq!(h.transport.renames(), [(31, "CLOSED #1 - @alice".to_string())]);
        let confirmations = h.transport.sent_to(ADMIN);
        assert_eq!(confirmations[0].text, "🔴 *Ticket #1* has been closed.");
    }

    #[tokio::test]
    async fn test_admin_command_outside_ticket_channel() {
        let h = harness(RecordingTransport::new()).await;
        h.relay.dispatch(admin_command(Some(8), AdminCommand::Resolve)).await;
        assert_eq!(h.transport.sent_to(ADMIN)[0].text, messages::NOT_A_TICKET_CHANNEL);
    }

    #[tokio::test]
    async fn test_admin_reopen_and_resolve() {
        let h = harness(RecordingTransport::new()).await;
        let number = h
            .fixture
            .store
            .create_ticket(USER, None, ChannelBinding::Dedicated(31))
            .await
            .unwrap();
        h.fixture.store.transition(number, Status::Closed).await.unwrap();

        h.relay.dispatch(admin_command(Some(31), AdminCommand::Reopen)).await;
        assert!(h.fixture.store.get_by_user(USER, Status::Open).await.unwrap().is_some());

        h.relay.dispatch(admin_command(Some(31), AdminCommand::Resolve)).await;
        let ticket = h.fixture.store.get_by_number(number).await.unwrap().unwrap();
        assert_eq!(ticket.status, Status::Resolved);

        let renames: Vec<String> = h.transport.renames().into_iter().map(|(_, n)| n).collect();
        assert_eq!(renames, ["Ticket #1 - 501", "RESOLVED #1 - 501"]);
        assert_eq!(h.transport.sent_to(USER).len(), 2);
    }

    #[tokio::test]
    async fn test_user_cannot_touch_someone_elses_ticket() {
        let h = harness(RecordingTransport::new()).await;
        let number = h
            .fixture
            .store
            .create_ticket(999, None, ChannelBinding::Dedicated(31))
            .await
            .unwrap();

        h.relay.dispatch(callback(CallbackAction::UserClose(number))).await;

        let ticket = h.fixture.store.get_by_number(number).await.unwrap().unwrap();
        assert!(ticket.is_open());
        assert_eq!(h.transport.last_edit().as_deref(), Some(messages::CLOSE_FAILED));
    }

    #[tokio::test]
    async fn test_user_close_and_reopen_notify_channel() {
        let h = harness(RecordingTransport::new()).await;
        let number = h
            .fixture
            .store
            .create_ticket(USER, Some("alice"), ChannelBinding::Dedicated(31))
            .await
            .unwrap();

        h.relay.dispatch(callback(CallbackAction::UserClose(number))).await;
        h.relay.dispatch(callback(CallbackAction::Reopen(number))).await;

        let notices: Vec<String> = h.transport.sent_to(ADMIN).into_iter().map(|m| m.text).collect();
        assert_eq!(
            notices,
            ["🔴 User closed ticket #1.", "🔄 User reopened ticket #1."]
        );
        assert!(h.transport.last_edit().unwrap().contains("has been reopened"));
    }

    #[tokio::test]
    async fn test_user_reopen_blocked_by_other_open_ticket() {
        let h = harness(RecordingTransport::new()).await;
        let old = h
            .fixture
            .store
            .create_ticket(USER, None, ChannelBinding::Dedicated(1))
            .await
            .unwrap();
        h.fixture.store.transition(old, Status::Closed).await.unwrap();
        h.fixture
            .store
            .create_ticket(USER, None, ChannelBinding::Dedicated(2))
            .await
            .unwrap();

        h.relay.dispatch(callback(CallbackAction::Reopen(old))).await;
        assert!(h.transport.last_edit().unwrap().contains("Ticket #2"));
    }

    #[tokio::test]
    async fn test_cancel_and_invalid_callbacks() {
        let h = harness(RecordingTransport::new()).await;
        h.relay.dispatch(callback(CallbackAction::Cancel)).await;
        assert_eq!(h.transport.last_edit().as_deref(), Some(messages::CANCELLED));
        h.relay.dispatch(callback(CallbackAction::Invalid)).await;
        assert_eq!(
            h.transport.last_edit().as_deref(),
            Some(messages::INVALID_TICKET_NUMBER)
        );
        assert_eq!(h.transport.answered().len(), 2);
    }

    #[tokio::test]
    async fn test_status_command_shows_latest_ticket() {
        let h = harness(RecordingTransport::new()).await;
        h.relay
            .dispatch(Inbound::UserCommand {
                from: alice(),
                chat_id: USER,
                command: UserCommand::Status,
            })
            .await;
        assert_eq!(h.transport.sent_to(USER)[0].text, messages::NO_TICKETS_YET);

        let number = h
            .fixture
            .store
            .create_ticket(USER, None, ChannelBinding::Dedicated(3))
            .await
            .unwrap();
        h.fixture.store.transition(number, Status::Closed).await.unwrap();
        h.relay
            .dispatch(Inbound::UserCommand {
                from: alice(),
                chat_id: USER,
                command: UserCommand::Status,
            })
            .await;
        let card = &h.transport.sent_to(USER)[1];
        assert!(card.markdown);
        assert!(card.text.contains("*Status:* Closed"));
        assert!(card.text.contains("*Closed:*"));
    }

    fn user_command(command: UserCommand) -> Inbound {
        Inbound::UserCommand {
            from: alice(),
            chat_id: USER,
            command,
        }
    }

    fn button_data(message: &OutgoingMessage) -> Vec<String> {
        message
            .keyboard
            .iter()
            .flatten()
            .flatten()
            .map(|b| b.callback_data.clone())
            .collect()
    }

    async fn open_ticket(h: &Harness) -> TicketNumber {
        h.fixture
            .store
            .create_ticket(USER, Some("alice"), ChannelBinding::Dedicated(31))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_without_ticket_offers_creation() {
        let h = harness(RecordingTransport::new()).await;
        h.relay.dispatch(user_command(UserCommand::Start)).await;

        let reply = &h.transport.sent_to(USER)[0];
        assert_eq!(reply.text, messages::GREETING);
        assert_eq!(button_data(reply), [CallbackAction::CreateTicket.encode()]);
    }

    #[tokio::test]
    async fn test_start_with_open_ticket_mentions_it() {
        let h = harness(RecordingTransport::new()).await;
        let number = open_ticket(&h).await;
        h.relay.dispatch(user_command(UserCommand::Start)).await;

        let reply = &h.transport.sent_to(USER)[0];
        assert_eq!(reply.text, messages::open_ticket_greeting(number));
        assert!(reply.markdown);
        assert!(reply.keyboard.is_none());
    }

    #[tokio::test]
    async fn test_newticket_without_ticket_asks_for_description() {
        let h = harness(RecordingTransport::new()).await;
        h.relay.dispatch(user_command(UserCommand::NewTicket)).await;

        let reply = &h.transport.sent_to(USER)[0];
        assert_eq!(reply.text, messages::DESCRIBE_ISSUE);
        assert!(h.fixture.store.latest_by_user(USER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_newticket_with_open_ticket_refuses() {
        let h = harness(RecordingTransport::new()).await;
        let number = open_ticket(&h).await;
        h.relay.dispatch(user_command(UserCommand::NewTicket)).await;

        assert_eq!(h.transport.sent_to(USER)[0].text, messages::already_open(number));
        assert_eq!(
            h.fixture.store.next_ticket_number().await.unwrap(),
            TicketNumber::new(2)
        );
    }

    #[tokio::test]
    async fn test_close_command_asks_for_confirmation() {
        let h = harness(RecordingTransport::new()).await;
        let number = open_ticket(&h).await;
        h.relay.dispatch(user_command(UserCommand::Close)).await;

        let reply = &h.transport.sent_to(USER)[0];
        assert_eq!(reply.text, messages::close_confirmation(number));
        assert_eq!(
            button_data(reply),
            [
                CallbackAction::Resolve(number).encode(),
                CallbackAction::UserClose(number).encode(),
                CallbackAction::Cancel.encode(),
            ]
        );
        // Nothing changes until a button is pressed.
        let ticket = h.fixture.store.get_by_number(number).await.unwrap().unwrap();
        assert!(ticket.is_open());
    }

    #[tokio::test]
    async fn test_close_command_without_ticket() {
        let h = harness(RecordingTransport::new()).await;
        h.relay.dispatch(user_command(UserCommand::Close)).await;

        let reply = &h.transport.sent_to(USER)[0];
        assert_eq!(reply.text, messages::NOTHING_TO_CLOSE);
        assert!(reply.keyboard.is_none());
    }

    #[tokio::test]
    async fn test_open_ticket_discards_stale_prompt() {
        let h = harness(RecordingTransport::new()).await;
        h.relay.dispatch(user_message("before")).await;
        open_ticket(&h).await;

        h.relay.dispatch(user_message("after")).await;
        assert_eq!(h.relay.pending().take(USER), None);
    }

    async fn harness_failing_create() -> Harness {
        let fixture = TestStore::new().await;
        let transport = Arc::new(RecordingTransport::new());
        let manager = TicketManager::new(
            FaultyStore::failing_create(&fixture),
            transport.clone(),
            ADMIN,
        );
        Harness {
            fixture,
            transport,
            relay: Relay::new(manager),
        }
    }

    #[tokio::test]
    async fn test_failed_create_keeps_pending_message() {
        let h = harness_failing_create().await;
        h.relay.dispatch(user_message("help me")).await;

        h.relay.dispatch(callback(CallbackAction::CreateTicket)).await;
        assert_eq!(h.transport.last_edit().as_deref(), Some(messages::CREATE_FAILED));
        assert!(h.fixture.store.latest_by_user(USER).await.unwrap().is_none());
        assert_eq!(h.relay.pending().take(USER), Some("help me".to_string()));
    }

    #[tokio::test]
    async fn test_retry_after_failed_create_uses_latest_message() {
        let h = harness_failing_create().await;
        h.relay.dispatch(user_message("first try")).await;
        h.relay.dispatch(callback(CallbackAction::CreateTicket)).await;

        h.relay.dispatch(user_message("second try")).await;
        assert_eq!(h.relay.pending().take(USER), Some("second try".to_string()));
    }

    #[tokio::test]
    async fn test_store_outage_reports_generic_failure() {
        let h = harness(RecordingTransport::new()).await;
        h.relay.dispatch(user_message("help me")).await;
        h.fixture.store.pool().close().await;

        h.relay.dispatch(callback(CallbackAction::CreateTicket)).await;
        assert_eq!(h.transport.last_edit().as_deref(), Some(messages::GENERIC_FAILURE));
        assert_eq!(h.relay.pending().take(USER), Some("help me".to_string()));
    }
}
