/// Connection configuration
///
/// Where the store lives and how the pool behaves. Built from defaults,
/// environment variables, or a JSON document.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Target name that selects a private in-memory database
pub const IN_MEMORY: &str = ":memory:";

/// Environment variable naming the database file
pub const ENV_DATABASE: &str = "RECORD_STORE_DATABASE";

/// Environment variable overriding the pool size
pub const ENV_MAX_CONNECTIONS: &str = "RECORD_STORE_MAX_CONNECTIONS";

// One caller, one connection.
const DEFAULT_MAX_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// SQLite file path, or `:memory:`
    pub database: String,
    pub create_if_missing: bool,
    pub foreign_keys: bool,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    pub busy_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            database: default_database_path().display().to_string(),
            create_if_missing: true,
            foreign_keys: true,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl ConnectionConfig {
    /// Config for the given database file
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    /// Config for a fresh private in-memory database
    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY)
    }

    /// Defaults, overridden by `RECORD_STORE_DATABASE` and
    /// `RECORD_STORE_MAX_CONNECTIONS` when they are set
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(database) = std::env::var(ENV_DATABASE) {
            config.database = database;
        }

        if let Ok(raw) = std::env::var(ENV_MAX_CONNECTIONS) {
            config.max_connections = raw.trim().parse().map_err(|_| {
                StoreError::Config(format!("{} must be a positive integer, got '{}'", ENV_MAX_CONNECTIONS, raw))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document; missing keys take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database == IN_MEMORY
    }

    /// Pool size actually used. An in-memory database exists once per
    /// connection, so it is pinned to one.
    pub fn effective_max_connections(&self) -> u32 {
        if self.is_in_memory() {
            1
        } else {
            self.max_connections
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(StoreError::Config("database target is empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(StoreError::Config("max_connections must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// `~/.record-store/records.db`, falling back to the working directory
/// when there is no home directory
pub fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".record-store"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("records.db")
}
