//! Test utilities for ticket-relay
//!
//! Shared fixtures for unit tests: a throwaway SQLite store and a transport
//! that records every outbound call instead of talking to the network.

#![cfg(test)]

use crate::core::{ChannelBinding, ChatId, Status, Ticket, TicketBuilder, TicketNumber, UserId};
use crate::error::{RelayError, TransportError};
use crate::storage::{SqliteStore, TicketStore};
use crate::transport::{OutgoingMessage, Transport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// SQLite store in a temporary directory, schema already initialized
pub struct TestStore {
    _dir: TempDir,
    pub store: SqliteStore,
}

impl TestStore {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = SqliteStore::open(dir.path().join("tickets.db"), 5)
            .await
            .expect("Failed to open store");
        store.init().await.expect("Failed to initialize schema");
        Self { _dir: dir, store }
    }

    /// The same store behind the trait object the manager expects
    pub fn shared(&self) -> Arc<dyn TicketStore> {
        Arc::new(self.store.clone())
    }
}

/// Store that delegates to SQLite but can fail chosen writes
pub struct FaultyStore {
    inner: SqliteStore,
    fail_create: bool,
    fail_update_channel: bool,
}

impl FaultyStore {
    /// Every `create_ticket` reports the backend as unavailable
    pub fn failing_create(fixture: &TestStore) -> Arc<Self> {
        Arc::new(Self {
            inner: fixture.store.clone(),
            fail_create: true,
            fail_update_channel: false,
        })
    }

    /// Every `update_channel` reports the backend as unavailable
    pub fn failing_update_channel(fixture: &TestStore) -> Arc<Self> {
        Arc::new(Self {
            inner: fixture.store.clone(),
            fail_create: false,
            fail_update_channel: true,
        })
    }

    fn unavailable() -> RelayError {
        RelayError::StoreUnavailable {
            source: sqlx::Error::PoolTimedOut,
        }
    }
}

#[async_trait]
impl TicketStore for FaultyStore {
    async fn init(&self) -> crate::Result<()> {
        self.inner.init().await
    }

    async fn next_ticket_number(&self) -> crate::Result<TicketNumber> {
        self.inner.next_ticket_number().await
    }

    async fn create_ticket(
        &self,
        user_id: UserId,
        username: Option<&str>,
        channel: ChannelBinding,
    ) -> crate::Result<TicketNumber> {
        if self.fail_create {
            return Err(Self::unavailable());
        }
        self.inner.create_ticket(user_id, username, channel).await
    }

    async fn update_channel(
        &self,
        ticket_number: TicketNumber,
        channel: ChannelBinding,
    ) -> crate::Result<bool> {
        if self.fail_update_channel {
            return Err(Self::unavailable());
        }
        self.inner.update_channel(ticket_number, channel).await
    }

    async fn get_by_channel(&self, channel_id: i64) -> crate::Result<Option<Ticket>> {
        self.inner.get_by_channel(channel_id).await
    }

    async fn get_by_user(&self, user_id: UserId, status: Status) -> crate::Result<Option<Ticket>> {
        self.inner.get_by_user(user_id, status).await
    }

    async fn latest_by_user(&self, user_id: UserId) -> crate::Result<Option<Ticket>> {
        self.inner.latest_by_user(user_id).await
    }

    async fn get_by_number(&self, ticket_number: TicketNumber) -> crate::Result<Option<Ticket>> {
        self.inner.get_by_number(ticket_number).await
    }

    async fn transition(&self, ticket_number: TicketNumber, new_status: Status) -> crate::Result<bool> {
        self.inner.transition(ticket_number, new_status).await
    }
}

/// Transport double that records calls and can be told to fail
pub struct RecordingTransport {
    sent: Mutex<Vec<OutgoingMessage>>,
    edits: Mutex<Vec<(ChatId, i64, String)>>,
    answered: Mutex<Vec<String>>,
    created: Mutex<Vec<String>>,
    renames: Mutex<Vec<(i64, String)>>,
    send_failures: Mutex<HashMap<ChatId, TransportError>>,
    fail_create: AtomicBool,
    next_channel: AtomicI64,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::default(),
            edits: Mutex::default(),
            answered: Mutex::default(),
            created: Mutex::default(),
            renames: Mutex::default(),
            send_failures: Mutex::default(),
            fail_create: AtomicBool::new(false),
            next_channel: AtomicI64::new(1000),
        }
    }

    /// Channel creation fails as in a group without topics
    pub fn without_topics() -> Self {
        let transport = Self::new();
        transport.fail_create.store(true, Ordering::SeqCst);
        transport
    }

    /// Every message to `chat_id` fails with `error`
    pub fn fail_sends_to(&self, chat_id: ChatId, error: TransportError) {
        self.send_failures.lock().unwrap().insert(chat_id, error);
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: ChatId) -> Vec<OutgoingMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.chat_id == chat_id)
            .collect()
    }

    pub fn last_edit(&self) -> Option<String> {
        self.edits.lock().unwrap().last().map(|(_, _, text)| text.clone())
    }

    pub fn answered(&self) -> Vec<String> {
        self.answered.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn renames(&self) -> Vec<(i64, String)> {
        self.renames.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(&self, message: OutgoingMessage) -> Result<(), TransportError> {
        if let Some(err) = self.send_failures.lock().unwrap().get(&message.chat_id) {
            return Err(err.clone());
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: i64,
        text: &str,
        _markdown: bool,
    ) -> Result<(), TransportError> {
        self.edits
            .lock()
            .unwrap()
            .push((chat_id, message_id, text.to_string()));
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError> {
        self.answered.lock().unwrap().push(callback_id.to_string());
        Ok(())
    }

    async fn create_discussion_channel(
        &self,
        _parent: ChatId,
        name: &str,
    ) -> Result<i64, TransportError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(TransportError::Unsupported(
                "Bad Request: the chat is not a forum".to_string(),
            ));
        }
        self.created.lock().unwrap().push(name.to_string());
        Ok(self.next_channel.fetch_add(1, Ordering::SeqCst))
    }

    async fn rename_discussion_channel(
        &self,
        _parent: ChatId,
        channel_id: i64,
        name: &str,
    ) -> Result<(), TransportError> {
        self.renames
            .lock()
            .unwrap()
            .push((channel_id, name.to_string()));
        Ok(())
    }
}

/// An in-memory ticket with a dedicated channel
pub fn create_test_ticket(number: i64, user_id: UserId, status: Status) -> Ticket {
    TicketBuilder::new()
        .ticket_number(TicketNumber::new(number))
        .user_id(user_id)
        .username(format!("user{user_id}"))
        .channel(ChannelBinding::Dedicated(number * 10))
        .status(status)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_fixture_is_initialized() {
        let fixture = TestStore::new().await;
        assert_eq!(
            fixture.store.next_ticket_number().await.unwrap(),
            TicketNumber::new(1)
        );
    }

    #[tokio::test]
    async fn test_recording_transport() {
        let transport = RecordingTransport::without_topics();
        assert!(transport.create_discussion_channel(-1, "x").await.is_err());

        transport.fail_sends_to(5, TransportError::Blocked);
        assert_eq!(
            transport.send_message(OutgoingMessage::new(5, "a")).await,
            Err(TransportError::Blocked)
        );
        transport
            .send_message(OutgoingMessage::new(6, "b"))
            .await
            .unwrap();
        assert_eq!(transport.sent_to(6).len(), 1);
        assert!(transport.sent_to(5).is_empty());
    }

    #[test]
    fn test_ticket_fixture() {
        let ticket = create_test_ticket(3, 42, Status::Closed);
        assert_eq!(ticket.channel, ChannelBinding::Dedicated(30));
        assert_eq!(ticket.display_label(), "@user42");
        assert!(ticket.closed_at.is_some());
    }
}
