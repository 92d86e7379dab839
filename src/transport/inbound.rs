use crate::core::{ChatId, TicketNumber, UserId};

/// Who sent a private message or pressed a button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: UserId,
    pub username: Option<String>,
}

/// Commands accepted in the private chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    Start,
    NewTicket,
    Status,
    Close,
}

/// Commands accepted inside the admin group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    Close,
    Reopen,
    Resolve,
}

/// Parsed inline-button payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    CreateTicket,
    UserClose(TicketNumber),
    Reopen(TicketNumber),
    Resolve(TicketNumber),
    Cancel,
    /// Known prefix with an unparsable ticket number
    Invalid,
    Unknown(String),
}

/// An inbound event, already classified by origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    UserMessage {
        from: Sender,
        chat_id: ChatId,
        text: String,
    },
    UserCommand {
        from: Sender,
        chat_id: ChatId,
        command: UserCommand,
    },
    AdminMessage {
        chat_id: ChatId,
        thread_id: Option<i64>,
        text: String,
    },
    AdminCommand {
        chat_id: ChatId,
        thread_id: Option<i64>,
        command: AdminCommand,
    },
    Callback {
        id: String,
        from: Sender,
        chat_id: ChatId,
        message_id: i64,
        action: CallbackAction,
    },
}

impl UserCommand {
    /// Parse `/name` or `/name@bot` with optional trailing arguments
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match command_name(text)? {
            "start" => Some(Self::Start),
            "newticket" => Some(Self::NewTicket),
            "status" => Some(Self::Status),
            "close" => Some(Self::Close),
            _ => None,
        }
    }
}

impl AdminCommand {
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match command_name(text)? {
            "close" => Some(Self::Close),
            "reopen" => Some(Self::Reopen),
            "resolve" => Some(Self::Resolve),
            _ => None,
        }
    }
}

/// Whether a message text is a bot command at all
#[must_use]
pub fn is_command(text: &str) -> bool {
    text.starts_with('/')
}

fn command_name(text: &str) -> Option<&str> {
    let first = text.strip_prefix('/')?.split_whitespace().next()?;
    Some(first.split('@').next().unwrap_or(first))
}

impl CallbackAction {
    pub const CREATE_TICKET: &'static str = "create_ticket";
    pub const CANCEL: &'static str = "cancel";
    const USER_CLOSE: &'static str = "user_close_";
    const REOPEN: &'static str = "reopen_";
    const RESOLVE: &'static str = "resolve_";

    #[must_use]
    pub fn parse(data: &str) -> Self {
        let numbered = |rest: &str, make: fn(TicketNumber) -> Self| {
            rest.parse::<TicketNumber>().map_or(Self::Invalid, make)
        };
        match data {
            Self::CREATE_TICKET => Self::CreateTicket,
            Self::CANCEL => Self::Cancel,
            _ => {
                if let Some(rest) = data.strip_prefix(Self::USER_CLOSE) {
                    numbered(rest, Self::UserClose)
                } else if let Some(rest) = data.strip_prefix(Self::REOPEN) {
                    numbered(rest, Self::Reopen)
                } else if let Some(rest) = data.strip_prefix(Self::RESOLVE) {
                    numbered(rest, Self::Resolve)
                } else {
                    Self::Unknown(data.to_string())
                }
            },
        }
    }

    /// Payload to attach to a button
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::CreateTicket => Self::CREATE_TICKET.to_string(),
            Self::Cancel => Self::CANCEL.to_string(),
            Self::UserClose(n) => format!("{}{n}", Self::USER_CLOSE),
            Self::Reopen(n) => format!("{}{n}", Self::REOPEN),
            Self::Resolve(n) => format!("{}{n}", Self::RESOLVE),
            Self::Invalid => String::new(),
            Self::Unknown(data) => data.clone(),
        }
    }
}
