//! Telegram Bot API transport
//!
//! Discussion channels are forum topics inside the admin supergroup. When the
//! group has topics disabled, `createForumTopic` fails and the relay falls
//! back to posting into the group itself.

use super::inbound::is_command;
use super::{
    AdminCommand, CallbackAction, Inbound, Keyboard, OutgoingMessage, Sender, Transport,
    UserCommand,
};
use crate::core::ChatId;
use crate::error::TransportError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const API_BASE: &str = "https://api.telegram.org";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Extra time granted to long-poll requests beyond the server-side wait
const POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub message_thread_id: Option<i64>,
    #[serde(default)]
    pub is_topic_message: Option<bool>,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForumTopic {
    message_thread_id: i64,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: ChatId,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_thread_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyMarkup<'a>>,
}

#[derive(Debug, Serialize)]
struct ReplyMarkup<'a> {
    inline_keyboard: &'a Keyboard,
}

#[derive(Debug, Serialize)]
struct EditMessageText<'a> {
    chat_id: ChatId,
    message_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackQuery<'a> {
    callback_query_id: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateForumTopic<'a> {
    chat_id: ChatId,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct EditForumTopic<'a> {
    chat_id: ChatId,
    message_thread_id: i64,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 2],
}

/// HTTP client for the Bot API
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("base_url", &"<redacted>")
            .finish()
    }
}

impl TelegramClient {
    /// Build a client for `bot_token` with bounded connect/request timeouts
    pub fn new(bot_token: &str) -> Result<Self, TransportError> {
        Self::with_api_base(API_BASE, bot_token)
    }

    /// Same as [`TelegramClient::new`] against a different API host
    pub fn with_api_base(api_base: &str, bot_token: &str) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(map_reqwest)?;
        Ok(Self {
            http,
            base_url: format!("{}/bot{bot_token}", api_base.trim_end_matches('/')),
        })
    }

    async fn call<P, R>(&self, method: &str, payload: &P, timeout: Option<Duration>) -> Result<R, TransportError>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut request = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .json(payload);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response: ApiResponse<R> = request
            .send()
            .await
            .map_err(map_reqwest)?
            .json()
            .await
            .map_err(map_reqwest)?;

        if !response.ok {
            let description = response
                .description
                .unwrap_or_else(|| "Unknown Telegram API error".to_string());
            debug!("Telegram {method} failed: {description}");
            return Err(TransportError::classify(&description));
        }
        response
            .result
            .ok_or_else(|| TransportError::Other(format!("{method} returned no result")))
    }

    /// Long-poll for updates newer than `offset`
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        wait: Duration,
    ) -> Result<Vec<Update>, TransportError> {
        let payload = GetUpdates {
            offset,
            timeout: wait.as_secs(),
            allowed_updates: ["message", "callback_query"],
        };
        self.call("getUpdates", &payload, Some(wait + POLL_GRACE))
            .await
    }
}

fn map_reqwest(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        // The request URL embeds the bot token.
        TransportError::Other(err.without_url().to_string())
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn send_message(&self, message: OutgoingMessage) -> Result<(), TransportError> {
        let payload = SendMessage {
            chat_id: message.chat_id,
            text: &message.text,
            message_thread_id: message.thread_id,
            parse_mode: message.markdown.then_some("Markdown"),
            reply_markup: message
                .keyboard
                .as_ref()
                .map(|inline_keyboard| ReplyMarkup { inline_keyboard }),
        };
        let result: Result<serde_json::Value, _> = self.call("sendMessage", &payload, None).await;
        if let Err(e) = &result {
            error!("Failed to send message to chat {}: {e}", message.chat_id);
        }
        result.map(|_| ())
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: i64,
        text: &str,
        markdown: bool,
    ) -> Result<(), TransportError> {
        let payload = EditMessageText {
            chat_id,
            message_id,
            text,
            parse_mode: markdown.then_some("Markdown"),
        };
        self.call::<_, serde_json::Value>("editMessageText", &payload, None)
            .await
            .map(|_| ())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError> {
        let payload = AnswerCallbackQuery {
            callback_query_id: callback_id,
        };
        self.call::<_, bool>("answerCallbackQuery", &payload, None)
            .await
            .map(|_| ())
    }

    async fn create_discussion_channel(
        &self,
        parent: ChatId,
        name: &str,
    ) -> Result<i64, TransportError> {
        let payload = CreateForumTopic {
            chat_id: parent,
            name,
        };
        let topic: ForumTopic = self.call("createForumTopic", &payload, None).await?;
        debug!("Created forum topic with thread_id: {}", topic.message_thread_id);
        Ok(topic.message_thread_id)
    }

    async fn rename_discussion_channel(
        &self,
        parent: ChatId,
        channel_id: i64,
        name: &str,
    ) -> Result<(), TransportError> {
        let payload = EditForumTopic {
            chat_id: parent,
            message_thread_id: channel_id,
            name,
        };
        self.call::<_, bool>("editForumTopic", &payload, None)
            .await
            .map(|_| ())
    }
}

/// Classify a raw update by where it came from
///
/// Private chats produce user events, the admin group produces admin
/// events, and everything else (other groups, bots, non-text content)
/// is ignored.
#[must_use]
pub fn to_inbound(update: Update, admin_group_id: ChatId) -> Option<Inbound> {
    if let Some(query) = update.callback_query {
        let message = query.message?;
        return Some(Inbound::Callback {
            id: query.id,
            from: sender(&query.from),
            chat_id: message.chat.id,
            message_id: message.message_id,
            action: CallbackAction::parse(query.data.as_deref().unwrap_or_default()),
        });
    }

    let message = update.message?;
    let from = message.from.as_ref()?;
    if from.is_bot {
        return None;
    }
    let text = message.text.clone()?;

    if message.chat.kind == "private" {
        let from = sender(from);
        if is_command(&text) {
            return UserCommand::parse(&text).map(|command| Inbound::UserCommand {
                from,
                chat_id: message.chat.id,
                command,
            });
        }
        return Some(Inbound::UserMessage {
            from,
            chat_id: message.chat.id,
            text,
        });
    }

    if message.chat.id != admin_group_id {
        return None;
    }
    let thread_id = if message.is_topic_message.unwrap_or(false) {
        message.message_thread_id
    } else {
        None
    };
    if is_command(&text) {
        return AdminCommand::parse(&text).map(|command| Inbound::AdminCommand {
            chat_id: message.chat.id,
            thread_id,
            command,
        });
    }
    Some(Inbound::AdminMessage {
        chat_id: message.chat.id,
        thread_id,
        text,
    })
}

fn sender(user: &User) -> Sender {
    Sender {
        id: user.id,
        username: user.username.clone(),
    }
}
