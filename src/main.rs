//! ticket-relay - Support-ticket relay bot
//!
//! This is the main entry point for the ticket-relay binary.
//! It loads `.env`, parses command-line arguments, installs logging and
//! dispatches to the appropriate command handler.

use anyhow::Context;
use clap::Parser;
use std::process;
use ticket_relay::cli::handlers::{handle_init_db, handle_run, handle_show};
use ticket_relay::cli::{Cli, Commands};
use ticket_relay::error::RelayError;
use tracing_subscriber::EnvFilter;

/// Default filter: our logs at info, noisy HTTP/DB internals at warn
const DEFAULT_LOG_FILTER: &str = "info,reqwest=warn,hyper=warn,hyper_util=warn,sqlx=warn";

#[tokio::main]
async fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli).await {
        handle_error(&e);
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Dispatch to the handler for the parsed command
async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = cli.config.as_deref();
    match cli.command() {
        Commands::Run => handle_run(config).await.context("failed to run bot"),
        Commands::InitDb => handle_init_db(config)
            .await
            .context("failed to initialize database"),
        Commands::Show { ticket, json } => handle_show(config, *ticket, *json)
            .await
            .with_context(|| format!("failed to show ticket #{ticket}")),
    }
}

/// Print the error chain and, for configuration problems, a hint
fn handle_error(error: &anyhow::Error) {
    eprintln!("Error: {error:#}");

    if let Some(relay_error) = error.downcast_ref::<RelayError>() {
        if relay_error.is_config_error() {
            eprintln!("\nSet the missing values in the environment, a .env file, or --config.");
        } else if relay_error.is_recoverable() {
            eprintln!("\nThis may be temporary; try again shortly.");
        }
    }

    if tracing::enabled!(tracing::Level::DEBUG) {
        eprintln!("\nDebug information:");
        eprintln!("{error:?}");
    }
}

