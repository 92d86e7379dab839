use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of an end user on the transport
pub type UserId = i64;

/// Identity of a chat (private conversation or the admin group)
pub type ChatId = i64;

/// Globally unique, monotonically assigned ticket number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketNumber(i64);

impl TicketNumber {
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TicketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TicketNumber {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().trim_start_matches('#').parse().map(Self)
    }
}

/// Lifecycle state of a ticket
///
/// ```text
///  open ── close ──▶ closed ── reopen ──▶ open
///  open ── resolve ─▶ resolved
///  closed ─ resolve ─▶ resolved
/// ```
///
/// `Resolved` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Open,
    Closed,
    Resolved,
}

impl Status {
    /// Persisted representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Resolved => "resolved",
        }
    }

    /// States from which `self` may be entered
    #[must_use]
    pub const fn sources(self) -> &'static [Self] {
        match self {
            Self::Open => &[Self::Closed],
            Self::Closed => &[Self::Open],
            Self::Resolved => &[Self::Open, Self::Closed],
        }
    }

    /// Whether the edge `self -> target` exists
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        target.sources().contains(&self)
    }

    /// Whether a ticket in this state carries a `closed_at` timestamp
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Closed | Self::Resolved)
    }

    #[must_use]
    pub const fn emoji(self) -> &'static str {
        match self {
            Self::Open => "🟢",
            Self::Closed => "🔴",
            Self::Resolved => "✅",
        }
    }

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Closed => "Closed",
            Self::Resolved => "Resolved",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "resolved" => Ok(Self::Resolved),
            other => Err(format!("unknown ticket status '{other}'")),
        }
    }
}

/// Where a ticket's admin-side conversation lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelBinding {
    /// Number assigned, channel not created yet
    Pending,
    /// Per-ticket discussion thread inside the admin group
    Dedicated(i64),
    /// Degraded mode: the admin group itself, shared with other tickets
    Shared(ChatId),
}

impl ChannelBinding {
    /// Decode from the `(channel_id, shared_channel)` column pair
    #[must_use]
    pub const fn from_columns(channel_id: Option<i64>, shared: bool) -> Self {
        match (channel_id, shared) {
            (None, _) => Self::Pending,
            (Some(id), false) => Self::Dedicated(id),
            (Some(id), true) => Self::Shared(id),
        }
    }

    /// Encode into the `(channel_id, shared_channel)` column pair
    #[must_use]
    pub const fn to_columns(self) -> (Option<i64>, bool) {
        match self {
            Self::Pending => (None, false),
            Self::Dedicated(id) => (Some(id), false),
            Self::Shared(id) => (Some(id), true),
        }
    }

    /// Channel identifier used for reverse lookup
    #[must_use]
    pub const fn id(self) -> Option<i64> {
        self.to_columns().0
    }

    /// Thread to address when posting into the admin group
    #[must_use]
    pub const fn thread_id(self) -> Option<i64> {
        match self {
            Self::Dedicated(id) => Some(id),
            Self::Pending | Self::Shared(_) => None,
        }
    }
}

/// A support ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_number: TicketNumber,
    pub user_id: UserId,
    pub username: Option<String>,
    pub channel: ChannelBinding,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Ticket {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == Status::Open
    }

    /// How the user is shown to admins: `@name`, or `@<id>` without a username
    #[must_use]
    pub fn display_label(&self) -> String {
        super::attribution(self.username.as_deref(), self.user_id)
    }
}
