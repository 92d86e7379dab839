//! Messaging transport boundary
//!
//! The relay core only talks to the chat platform through [`Transport`];
//! inbound traffic arrives already classified as [`Inbound`] events.

mod inbound;
pub mod telegram;

pub use inbound::{AdminCommand, CallbackAction, Inbound, Sender, UserCommand};

use crate::core::ChatId;
use crate::error::TransportError;
use async_trait::async_trait;
use serde::Serialize;

/// One inline button; pressing it sends `callback_data` back to the bot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Rows of inline buttons attached to a message
pub type Keyboard = Vec<Vec<InlineButton>>;

/// A message to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub chat_id: ChatId,
    pub thread_id: Option<i64>,
    pub text: String,
    pub markdown: bool,
    pub keyboard: Option<Keyboard>,
}

impl OutgoingMessage {
    #[must_use]
    pub fn new(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            thread_id: None,
            text: text.into(),
            markdown: false,
            keyboard: None,
        }
    }

    /// Address a discussion thread inside `chat_id`
    #[must_use]
    pub const fn in_thread(mut self, thread_id: Option<i64>) -> Self {
        self.thread_id = thread_id;
        self
    }

    #[must_use]
    pub const fn markdown(mut self) -> Self {
        self.markdown = true;
        self
    }

    #[must_use]
    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Outbound operations the relay needs from the chat platform
///
/// Each call is a single attempt; implementations bound it with timeouts and
/// report expiry as [`TransportError::Timeout`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(&self, message: OutgoingMessage) -> Result<(), TransportError>;

    /// Replace the text of a message the bot sent earlier (drops its keyboard)
    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: i64,
        text: &str,
        markdown: bool,
    ) -> Result<(), TransportError>;

    /// Acknowledge a button press
    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError>;

    /// Create a per-ticket discussion channel under `parent`, returning its id
    async fn create_discussion_channel(
        &self,
        parent: ChatId,
        name: &str,
    ) -> Result<i64, TransportError>;

    async fn rename_discussion_channel(
        &self,
        parent: ChatId,
        channel_id: i64,
        name: &str,
    ) -> Result<(), TransportError>;
}
