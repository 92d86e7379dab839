//! Command handlers
//!
//! Each handler loads only the configuration it needs, so `init-db` and
//! `show` work without bot credentials.

mod show;

pub use show::{format_ticket, handle_show};

use crate::bot;
use crate::config::{Settings, StoreSettings};
use crate::error::Result;
use crate::storage::open_store;
use std::path::Path;
use tracing::info;

/// Validate the full configuration and serve until interrupted
pub async fn handle_run(config: Option<&Path>) -> Result<()> {
    let settings = Settings::load(config)?;
    bot::run(settings).await
}

/// Create or migrate the schema for the configured backend
pub async fn handle_init_db(config: Option<&Path>) -> Result<()> {
    let settings = StoreSettings::load(config)?;
    open_store(&settings).await?;
    info!("Database initialized");
    println!("Database initialized");
    Ok(())
}
