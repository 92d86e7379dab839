//! Error types for ticket-relay
//!
//! Store failures are split into "the backend is unreachable or broken"
//! and "a uniqueness invariant was violated", since callers treat them
//! differently. Transport failures carry their own classification so the
//! relay can tell admins why a message was not delivered.

use crate::core::TicketNumber;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, RelayError>;

/// Top-level error type
#[derive(Error, Debug)]
pub enum RelayError {
    /// The persistence backend could not complete the operation
    #[error("Ticket store unavailable: {source}")]
    StoreUnavailable {
        #[source]
        source: sqlx::Error,
    },

    /// A uniqueness constraint rejected the write
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// A row held a value the domain model does not accept
    #[error("Corrupt ticket row: {0}")]
    CorruptRow(String),

    #[error("Ticket #{ticket_number} not found")]
    TicketNotFound { ticket_number: TicketNumber },

    /// Reopen refused because the user already holds an open ticket
    #[error("User already has open ticket #{ticket_number}")]
    OpenTicketExists { ticket_number: TicketNumber },

    /// Outbound delivery failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by the messaging transport
///
/// `Blocked` and `Unreachable` are the two recipient-side conditions worth
/// telling an admin about; everything else reads as a generic failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("recipient has blocked the bot")]
    Blocked,

    #[error("recipient has not started a conversation with the bot")]
    Unreachable,

    #[error("operation not supported here: {0}")]
    Unsupported(String),

    #[error("request timed out")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Classify an API error description
    #[must_use]
    pub fn classify(description: &str) -> Self {
        let lower = description.to_lowercase();
        if lower.contains("blocked") {
            Self::Blocked
        } else if lower.contains("chat not found") || lower.contains("user not found") {
            Self::Unreachable
        } else if lower.contains("not a forum") || lower.contains("not enough rights") {
            Self::Unsupported(description.to_string())
        } else {
            Self::Other(description.to_string())
        }
    }

    /// Short diagnostic posted back into the admin channel
    #[must_use]
    pub fn admin_diagnostic(&self) -> String {
        match self {
            Self::Blocked => "⚠️ Could not deliver message. User has blocked the bot.".to_string(),
            Self::Unreachable => {
                "⚠️ Could not deliver message. User hasn't started the bot yet.".to_string()
            },
            other => {
                let detail: String = other.to_string().chars().take(50).collect();
                format!("⚠️ Could not deliver message to user. Error: {detail}")
            },
        }
    }
}

impl From<sqlx::Error> for RelayError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return Self::ConstraintViolation(db.message().to_string());
            }
        }
        Self::StoreUnavailable { source: err }
    }
}

impl From<config::ConfigError> for RelayError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl RelayError {
    /// Message suitable for showing to an end user or admin in chat
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::StoreUnavailable { .. } | Self::CorruptRow(_) | Self::Io(_) => {
                "Something went wrong on our side. Please try again in a moment.".to_string()
            },
            Self::ConstraintViolation(_) => {
                "That change conflicts with an existing ticket. Please try again.".to_string()
            },
            Self::TicketNotFound { ticket_number } => format!("Ticket #{ticket_number} not found"),
            Self::OpenTicketExists { ticket_number } => format!(
                "You already have an open ticket: 🎫 Ticket #{ticket_number}. Close it before reopening another."
            ),
            Self::Transport(e) => format!("Message could not be delivered: {e}"),
            Self::Config(msg) => format!("Configuration error: {msg}"),
        }
    }

    /// Whether retrying the same action later could succeed
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. } | Self::Transport(TransportError::Timeout | TransportError::Other(_))
        )
    }

    /// Whether this error comes from startup configuration
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
