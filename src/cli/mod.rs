//! Command-line interface
//!
//! `run` starts the bot (and is what a bare `ticket-relay` does), `init-db`
//! prepares the schema ahead of time, and `show` prints one ticket for
//! operators.

pub mod handlers;

use crate::core::TicketNumber;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Support-ticket relay bot
#[derive(Debug, Parser)]
#[command(name = "ticket-relay", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON); environment variables override it
    #[arg(short, long, global = true, env = "TICKET_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the bot until interrupted
    Run,

    /// Create or migrate the ticket database and exit
    InitDb,

    /// Print a ticket
    Show {
        /// Ticket number, with or without a leading '#'
        ticket: TicketNumber,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// The requested command, defaulting to `run`
    #[must_use]
    pub fn command(&self) -> &Commands {
        self.command.as_ref().unwrap_or(&Commands::Run)
    }
}
