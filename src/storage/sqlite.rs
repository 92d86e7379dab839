use super::repository::TicketStore;
use super::sql::{self, TicketRow};
use crate::core::{ChannelBinding, Status, Ticket, TicketNumber, UserId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const TICKETS_COLUMNS: &str = "(
        ticket_number INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL,
        username TEXT,
        channel_id INTEGER,
        shared_channel INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'closed', 'resolved')),
        created_at TEXT NOT NULL,
        closed_at TEXT
    )";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS counter (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        value INTEGER NOT NULL DEFAULT 0
    )",
    "INSERT OR IGNORE INTO counter (id, value) VALUES (1, 0)",
];

// Tables from earlier releases declare `channel_id NOT NULL UNIQUE` and use 0
// as the not-yet-created placeholder. SQLite cannot relax either constraint in
// place, so the table is copied into the current shape.
const REBUILD_TICKETS: &[&str] = &[
    "INSERT INTO tickets_rebuild \
     (ticket_number, user_id, username, channel_id, shared_channel, status, created_at, closed_at) \
     SELECT ticket_number, user_id, username, NULLIF(channel_id, 0), \
            CASE WHEN shared_channel != 0 OR channel_id < 0 THEN 1 ELSE 0 END, \
            COALESCE(status, 'open'), \
            COALESCE(strftime('%Y-%m-%dT%H:%M:%SZ', created_at), strftime('%Y-%m-%dT%H:%M:%SZ', 'now')), \
            strftime('%Y-%m-%dT%H:%M:%SZ', closed_at) \
     FROM tickets",
    "DROP TABLE tickets",
    "ALTER TABLE tickets_rebuild RENAME TO tickets",
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_tickets_user_id ON tickets(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_tickets_channel_id ON tickets(channel_id)",
    "CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status)",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_tickets_dedicated_channel \
     ON tickets(channel_id) WHERE shared_channel = 0",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_tickets_open_per_user \
     ON tickets(user_id) WHERE status = 'open'",
];

/// SQLite-backed ticket store (`DB_TYPE=LOCAL`)
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file at `path`
    pub async fn open(path: impl AsRef<Path>, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        debug!("Opened SQLite store at {}", path.as_ref().display());
        Ok(Self { pool })
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn has_column(&self, column: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('tickets') WHERE name = $1",
        )
        .bind(column)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn channel_id_is_required(&self) -> Result<bool> {
        let required: Option<i64> = sqlx::query_scalar(
            "SELECT \"notnull\" FROM pragma_table_info('tickets') WHERE name = 'channel_id'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(required == Some(1))
    }

    async fn rebuild_legacy_table(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DROP TABLE IF EXISTS tickets_rebuild")
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("CREATE TABLE tickets_rebuild {TICKETS_COLUMNS}"))
            .execute(&mut *tx)
            .await?;
        for statement in REBUILD_TICKETS {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        info!("Rebuilt legacy tickets table with nullable channel_id");
        Ok(())
    }
}

#[async_trait]
impl TicketStore for SqliteStore {
    async fn init(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("CREATE TABLE IF NOT EXISTS tickets {TICKETS_COLUMNS}"))
            .execute(&mut *tx)
            .await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        // Databases created before degraded-mode tracking lack this column.
        if !self.has_column("shared_channel").await? {
            sqlx::query(
                "ALTER TABLE tickets ADD COLUMN shared_channel INTEGER NOT NULL DEFAULT 0",
            )
            .execute(&self.pool)
            .await?;
            info!("Added shared_channel column to tickets table");
        }
        if self.channel_id_is_required().await? {
            self.rebuild_legacy_table().await?;
        }

        let superseded = sqlx::query(sql::CLOSE_SUPERSEDED_OPEN)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?
            .rows_affected();
        if superseded > 0 {
            warn!("Closed {superseded} older open tickets held by users with a newer open ticket");
        }

        for statement in INDEXES {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("SQLite database initialized successfully");
        Ok(())
    }

    async fn next_ticket_number(&self) -> Result<TicketNumber> {
        let value: i64 = sqlx::query_scalar(sql::NEXT_NUMBER)
            .fetch_one(&self.pool)
            .await?;
        debug!("Generated ticket number: {value}");
        Ok(TicketNumber::new(value))
    }

    async fn create_ticket(
        &self,
        user_id: UserId,
        username: Option<&str>,
        channel: ChannelBinding,
    ) -> Result<TicketNumber> {
        let (channel_id, shared) = channel.to_columns();
        let mut tx = self.pool.begin().await?;
        let value: i64 = sqlx::query_scalar(sql::NEXT_NUMBER)
            .fetch_one(&mut *tx)
            .await?;
        sqlx::query(sql::INSERT_TICKET)
            .bind(value)
            .bind(user_id)
            .bind(username)
            .bind(channel_id)
            .bind(shared)
            .bind(Status::Open.as_str())
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Created ticket #{value} for user {user_id}");
        Ok(TicketNumber::new(value))
    }

    async fn update_channel(
        &self,
        ticket_number: TicketNumber,
        channel: ChannelBinding,
    ) -> Result<bool> {
        let (channel_id, shared) = channel.to_columns();
        let result = sqlx::query(sql::UPDATE_CHANNEL)
            .bind(channel_id)
            .bind(shared)
            .bind(ticket_number.get())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_by_channel(&self, channel_id: i64) -> Result<Option<Ticket>> {
        let row: Option<TicketRow> = sqlx::query_as(&sql::select_by_channel())
            .bind(channel_id)
            .fetch_optional(&self.pool)
            .await?;
        sql::into_ticket(row)
    }

    async fn get_by_user(&self, user_id: UserId, status: Status) -> Result<Option<Ticket>> {
        let row: Option<TicketRow> = sqlx::query_as(&sql::select_by_user_status())
            .bind(user_id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?;
        sql::into_ticket(row)
    }

    async fn latest_by_user(&self, user_id: UserId) -> Result<Option<Ticket>> {
        let row: Option<TicketRow> = sqlx::query_as(&sql::select_latest_by_user())
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        sql::into_ticket(row)
    }

    async fn get_by_number(&self, ticket_number: TicketNumber) -> Result<Option<Ticket>> {
        let row: Option<TicketRow> = sqlx::query_as(&sql::select_by_number())
            .bind(ticket_number.get())
            .fetch_optional(&self.pool)
            .await?;
        sql::into_ticket(row)
    }

    async fn transition(&self, ticket_number: TicketNumber, new_status: Status) -> Result<bool> {
        let result = sqlx::query(&sql::transition(new_status))
            .bind(new_status.as_str())
            .bind(sql::closed_at_for(new_status))
            .bind(ticket_number.get())
            .execute(&self.pool)
            .await?;
        let changed = result.rows_affected() > 0;
        if changed {
            info!("Ticket #{ticket_number} is now {new_status}");
        }
        Ok(changed)
    }
}
