//! Ticket persistence
//!
//! [`TicketStore`] is the only way tickets are read or written. Two
//! interchangeable backends implement it; the choice is made once at startup
//! by [`open_store`].

mod postgres;
mod repository;
mod sql;
mod sqlite;

pub use postgres::PostgresStore;
pub use repository::TicketStore;
pub use sqlite::SqliteStore;

use crate::config::{StoreBackend, StoreSettings};
use crate::error::Result;
use std::sync::Arc;

/// Connect to the configured backend and make sure the schema exists
pub async fn open_store(settings: &StoreSettings) -> Result<Arc<dyn TicketStore>> {
    let store: Arc<dyn TicketStore> = match &settings.backend {
        StoreBackend::Local { path } => {
            Arc::new(SqliteStore::open(path, settings.max_connections).await?)
        },
        StoreBackend::Postgres { url } => {
            Arc::new(PostgresStore::connect(url, settings.max_connections).await?)
        },
    };
    store.init().await?;
    Ok(store)
}
