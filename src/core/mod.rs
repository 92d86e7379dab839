//! Core domain types: tickets, their lifecycle states, and channel naming

mod builders;
mod naming;
mod ticket;

pub use builders::TicketBuilder;
pub use naming::{MAX_CHANNEL_NAME_LEN, attribution, channel_label, sanitize_channel_name};
pub use ticket::{ChannelBinding, ChatId, Status, Ticket, TicketNumber, UserId};
