//! Polling supervisor
//!
//! Long-polls the Bot API and hands every update to the relay in its own
//! task, so one slow or failing event never blocks the others. When polling
//! itself fails the loop waits `restart_delay` and starts again, keeping the
//! update offset so nothing is processed twice.

use crate::config::Settings;
use crate::core::ChatId;
use crate::error::{Result, TransportError};
use crate::manager::TicketManager;
use crate::relay::Relay;
use crate::storage::open_store;
use crate::transport::telegram::{TelegramClient, Update, to_inbound};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Where the supervisor pulls updates from
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Updates newer than `offset`, waiting up to `wait` for the first one
    async fn get_updates(
        &self,
        offset: Option<i64>,
        wait: Duration,
    ) -> std::result::Result<Vec<Update>, TransportError>;
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn get_updates(
        &self,
        offset: Option<i64>,
        wait: Duration,
    ) -> std::result::Result<Vec<Update>, TransportError> {
        TelegramClient::get_updates(self, offset, wait).await
    }
}

/// Drives the update loop for one bot
pub struct Supervisor {
    source: Arc<dyn UpdateSource>,
    relay: Arc<Relay>,
    admin_group_id: ChatId,
    poll_timeout: Duration,
    restart_delay: Duration,
}

impl Supervisor {
    #[must_use]
    pub fn new(
        source: Arc<dyn UpdateSource>,
        relay: Arc<Relay>,
        admin_group_id: ChatId,
        poll_timeout: Duration,
        restart_delay: Duration,
    ) -> Self {
        Self {
            source,
            relay,
            admin_group_id,
            poll_timeout,
            restart_delay,
        }
    }

    /// Poll forever, restarting after every polling failure
    pub async fn run(&self) {
        let mut offset = None;
        loop {
            if let Err(e) = self.poll(&mut offset).await {
                error!(
                    "Polling failed: {e}; restarting in {}s...",
                    self.restart_delay.as_secs()
                );
            }
            tokio::time::sleep(self.restart_delay).await;
        }
    }

    async fn poll(&self, offset: &mut Option<i64>) -> std::result::Result<(), TransportError> {
        loop {
            let updates = self.source.get_updates(*offset, self.poll_timeout).await?;
            for update in updates {
                *offset = Some(update.update_id + 1);
                let Some(event) = to_inbound(update, self.admin_group_id) else {
                    continue;
                };
                debug!("Dispatching {event:?}");
                let relay = Arc::clone(&self.relay);
                tokio::spawn(async move { relay.dispatch(event).await });
            }
        }
    }
}

/// Open the store, connect the transport and serve until Ctrl-C
pub async fn run(settings: Settings) -> Result<()> {
    let store = open_store(&settings.store).await?;
    info!("Database initialized");

    let client = Arc::new(TelegramClient::new(&settings.bot_token)?);
    let manager = TicketManager::new(store, client.clone(), settings.admin_group_id);
    let relay = Arc::new(Relay::new(manager));
    info!("Bot initialized successfully");
    info!("Admin group ID: {}", settings.admin_group_id);

    let supervisor = Supervisor::new(
        client,
        relay,
        settings.admin_group_id,
        settings.poll_timeout,
        settings.restart_delay,
    );

    info!("Starting bot...");
    tokio::select! {
        () = supervisor.run() => {},
        signal = tokio::signal::ctrl_c() => {
            signal?;
            warn!("Interrupted; shutting down");
        },
    }
    Ok(())
}
