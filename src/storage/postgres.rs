use super::repository::TicketStore;
use super::sql::{self, TicketRow};
use crate::core::{ChannelBinding, Status, Ticket, TicketNumber, UserId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::{debug, info, warn};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS tickets (
        ticket_number BIGINT PRIMARY KEY,
        user_id BIGINT NOT NULL,
        username VARCHAR(255),
        channel_id BIGINT,
        shared_channel BOOLEAN NOT NULL DEFAULT FALSE,
        status VARCHAR(20) NOT NULL DEFAULT 'open',
        created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
        closed_at TIMESTAMPTZ,
        CONSTRAINT tickets_status_check CHECK (status IN ('open', 'closed', 'resolved'))
    )",
    "CREATE TABLE IF NOT EXISTS counter (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        value BIGINT NOT NULL DEFAULT 0
    )",
    "INSERT INTO counter (id, value) VALUES (1, 0) ON CONFLICT (id) DO NOTHING",
];

// Brings tables created by earlier releases up to the current shape; safe to
// rerun against a current schema.
const MIGRATIONS: &[&str] = &[
    "ALTER TABLE tickets ADD COLUMN IF NOT EXISTS shared_channel BOOLEAN NOT NULL DEFAULT FALSE",
    "ALTER TABLE tickets ALTER COLUMN channel_id DROP NOT NULL",
    "ALTER TABLE tickets DROP CONSTRAINT IF EXISTS tickets_channel_id_key",
    "ALTER TABLE tickets ALTER COLUMN ticket_number TYPE BIGINT",
    "ALTER TABLE tickets ALTER COLUMN user_id TYPE BIGINT",
    "ALTER TABLE tickets ALTER COLUMN channel_id TYPE BIGINT",
    "ALTER TABLE counter ALTER COLUMN value TYPE BIGINT",
    "ALTER TABLE tickets DROP CONSTRAINT IF EXISTS tickets_status_check",
    "ALTER TABLE tickets ADD CONSTRAINT tickets_status_check \
     CHECK (status IN ('open', 'closed', 'resolved'))",
];

// Row fixups for data written by earlier releases: 0 was the channel
// placeholder and degraded-mode tickets stored the admin group id.
const LEGACY_ROWS: &[&str] = &[
    "UPDATE tickets SET channel_id = NULL WHERE channel_id = 0",
    "UPDATE tickets SET shared_channel = TRUE WHERE channel_id < 0 AND NOT shared_channel",
    "UPDATE tickets SET status = 'open' WHERE status IS NULL",
    "UPDATE tickets SET created_at = CURRENT_TIMESTAMP WHERE created_at IS NULL",
    "ALTER TABLE tickets ALTER COLUMN status SET NOT NULL",
    "ALTER TABLE tickets ALTER COLUMN created_at SET NOT NULL",
];

const COLUMN_TYPE: &str = "SELECT data_type FROM information_schema.columns \
     WHERE table_schema = current_schema() AND table_name = 'tickets' AND column_name = $1";

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_tickets_user_id ON tickets(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_tickets_channel_id ON tickets(channel_id)",
    "CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status)",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_tickets_dedicated_channel \
     ON tickets(channel_id) WHERE NOT shared_channel",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_tickets_open_per_user \
     ON tickets(user_id) WHERE status = 'open'",
];

/// PostgreSQL-backed ticket store (`DB_TYPE=POSTGRES`)
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect a pool to `database_url`
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        info!("PostgreSQL connection pool initialized");
        Ok(Self { pool })
    }

}

#[async_trait]
impl TicketStore for PostgresStore {
    async fn init(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA.iter().chain(MIGRATIONS) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        // Earlier releases used naive TIMESTAMP columns holding UTC wall time.
        for column in ["created_at", "closed_at"] {
            let data_type: Option<String> = sqlx::query_scalar(COLUMN_TYPE)
                .bind(column)
                .fetch_optional(&mut *tx)
                .await?;
            if data_type.as_deref() == Some("timestamp without time zone") {
                sqlx::query(&format!(
                    "ALTER TABLE tickets ALTER COLUMN {column} TYPE TIMESTAMPTZ \
                     USING {column} AT TIME ZONE 'UTC'"
                ))
                .execute(&mut *tx)
                .await?;
                info!("Converted tickets.{column} to TIMESTAMPTZ");
            }
        }

        for statement in LEGACY_ROWS {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        let superseded = sqlx::query(sql::CLOSE_SUPERSEDED_OPEN)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if superseded > 0 {
            warn!("Closed {superseded} older open tickets held by users with a newer open ticket");
        }

        for statement in INDEXES {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        info!("PostgreSQL database initialized successfully");
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
