//! Startup configuration
//!
//! Values come from an optional config file layered under the process
//! environment, so `BOT_TOKEN=... ticket-relay run` always wins over the file.
//! Validation happens once here; the rest of the crate receives resolved,
//! typed settings.

use crate::core::ChatId;
use crate::error::{RelayError, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SQLITE_PATH: &str = "tickets.db";
const DEFAULT_RESTART_DELAY_SECS: u64 = 5;
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Persistence backend selected by `DB_TYPE`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// `DB_TYPE=LOCAL`: SQLite file
    Local { path: PathBuf },
    /// `DB_TYPE=POSTGRES`: connection string from `DATABASE_URL`
    Postgres { url: String },
}

/// Everything needed to open the ticket store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub max_connections: u32,
}

/// Fully validated bot settings
#[derive(Clone)]
pub struct Settings {
    pub bot_token: String,
    pub admin_group_id: ChatId,
    pub store: StoreSettings,
    pub restart_delay: Duration,
    pub poll_timeout: Duration,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("bot_token", &"<redacted>")
            .field("admin_group_id", &self.admin_group_id)
            .field("store", &self.store)
            .field("restart_delay", &self.restart_delay)
            .field("poll_timeout", &self.poll_timeout)
            .finish()
    }
}

/// Unvalidated values as read from file and environment
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSettings {
    pub bot_token: Option<String>,
    pub admin_group_id: Option<String>,
    pub db_type: Option<String>,
    pub database_url: Option<String>,
    pub sqlite_path: Option<String>,
    pub restart_delay_secs: Option<u64>,
    pub poll_timeout_secs: Option<u64>,
    pub max_connections: Option<u32>,
}

impl RawSettings {
    /// Read `file` (if given) and then the environment
    ///
    /// `env` replaces the process environment when provided.
    pub fn load_from(file: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(Environment::default().source(env));
        Ok(builder.build()?.try_deserialize()?)
    }

    /// Resolve the store section only
    pub fn store(&self) -> Result<StoreSettings> {
        let db_type = self
            .db_type
            .as_deref()
            .map_or_else(|| "LOCAL".to_string(), str::to_uppercase);

        let backend = match db_type.as_str() {
            "LOCAL" => StoreBackend::Local {
                path: PathBuf::from(
                    self.sqlite_path
                        .clone()
                        .unwrap_or_else(|| DEFAULT_SQLITE_PATH.to_string()),
                ),
            },
            "POSTGRES" => match non_empty(self.database_url.as_deref()) {
                Some(url) => StoreBackend::Postgres {
                    url: url.to_string(),
                },
                None => {
                    return Err(RelayError::Config(
                        "DATABASE_URL environment variable is required when DB_TYPE=POSTGRES"
                            .to_string(),
                    ));
                },
            },
            _ => {
                return Err(RelayError::Config(
                    "DB_TYPE must be either 'LOCAL' or 'POSTGRES'".to_string(),
                ));
            },
        };

        Ok(StoreSettings {
            backend,
            max_connections: self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
        })
    }

    /// Validate every field needed to run the bot
    pub fn validate(&self) -> Result<Settings> {
        let bot_token = non_empty(self.bot_token.as_deref())
            .ok_or_else(|| {
                RelayError::Config("BOT_TOKEN environment variable is required".to_string())
            })?
            .to_string();

        let admin_group_id = non_empty(self.admin_group_id.as_deref())
            .ok_or_else(|| {
                RelayError::Config("ADMIN_GROUP_ID environment variable is required".to_string())
            })?
            .trim()
            .parse::<ChatId>()
            .map_err(|_| RelayError::Config("ADMIN_GROUP_ID must be a valid integer".to_string()))?;

        Ok(Settings {
            bot_token,
            admin_group_id,
            store: self.store()?,
            restart_delay: Duration::from_secs(
                self.restart_delay_secs.unwrap_or(DEFAULT_RESTART_DELAY_SECS),
            ),
            poll_timeout: Duration::from_secs(
                self.poll_timeout_secs.unwrap_or(DEFAULT_POLL_TIMEOUT_SECS),
            ),
        })
    }
}

impl Settings {
    /// Load and validate from `file` and the process environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        RawSettings::load_from(file, None)?.validate()
    }
}

impl StoreSettings {
    /// Load only the store section; the bot credentials may be absent
    pub fn load(file: Option<&Path>) -> Result<Self> {
        RawSettings::load_from(file, None)?.store()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
