//! ticket-relay - A support-ticket relay bot
//!
//! This crate relays conversations between end users and a support team:
//! - Each user conversation becomes a numbered ticket
//! - Every ticket gets its own discussion channel inside the admin group
//! - Messages flow both ways between the user's private chat and that channel
//! - Tickets move through an open / closed / resolved lifecycle
//! - SQLite or PostgreSQL persistence behind one store interface

// Allow missing error documentation for internal implementations
#![allow(clippy::missing_errors_doc)]
// Allow some pedantic lints that don't improve code quality
#![allow(clippy::option_if_let_else)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::single_match_else)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::map_unwrap_or)]

//! # Concurrent Safety
//!
//! Every inbound event is handled in its own task and handlers never hold a
//! lock across a store or network call. The invariants that matter (unique
//! ticket numbers, at most one open ticket per user, legal state transitions)
//! are enforced by single atomic statements in the store, so racing handlers
//! cannot break them.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ticket_relay::config::StoreSettings;
//! use ticket_relay::manager::TicketManager;
//! use ticket_relay::storage::open_store;
//! use ticket_relay::transport::telegram::TelegramClient;
//!
//! let store = open_store(&StoreSettings::load(None)?).await?;
//! let transport = Arc::new(TelegramClient::new(&token)?);
//! let manager = TicketManager::new(store, transport, admin_group_id);
//!
//! let ticket = manager.create_ticket_channel(user_id, Some("alice"), "help me").await?;
//! manager.close_ticket_channel(ticket.ticket_number).await?;
//! ```

pub mod bot;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod manager;
pub mod relay;
pub mod storage;
pub mod transport;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use error::{RelayError, Result};
