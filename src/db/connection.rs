/// Store connection management
///
/// `RecordStore` owns the SQLite pool and the registry of defined schemas.

use crate::config::ConnectionConfig;
use crate::db::schema::Schema;
use crate::error::{Result, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info};

/// Handle to a relational store
pub struct RecordStore {
    pool: SqlitePool,
    target: String,
    schemas: RwLock<HashMap<String, Arc<Schema>>>,
}

impl RecordStore {
    /// Open the configured database
    ///
    /// # Arguments
    /// * `config` - Target and pool settings
    ///
    /// # Returns
    /// * `Ok(RecordStore)` - Connected store with an empty schema registry
    /// * `Err(StoreError::Connection)` - If the database cannot be opened
    ///
    /// # Examples
    /// ```no_run
    /// use record_store::{ConnectionConfig, RecordStore};
    ///
    /// # async fn example() -> record_store::Result<()> {
    /// let store = RecordStore::connect(&ConnectionConfig::new("chinook.db")).await?;
    /// store.close().await;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;

        let options = if config.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(StoreError::Connection)?
        } else {
            let path = Path::new(&config.database);
            // Create parent directory if it doesn't exist
            if config.create_if_missing {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
            }
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(config.create_if_missing)
        };

        let options = options
            .foreign_keys(config.foreign_keys)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.effective_max_connections())
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms));

        if config.is_in_memory() {
            // The database dies with its connection; keep the one we have.
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        }

        // Every failure here means the target could not be reached.
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(StoreError::Connection)?;

        info!(database = %config.database, "connected to record store");

        Ok(Self {
            pool,
            target: config.database.clone(),
            schemas: RwLock::new(HashMap::new()),
        })
    }

    /// Create a test store in memory
    ///
    /// Used for testing. Creates a fresh database for each test.
    #[cfg(test)]
    pub async fn new_test() -> Result<Self> {
        Self::connect(&ConnectionConfig::in_memory()).await
    }

    /// Get reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The database path, or `:memory:`
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Fail with `StoreError::Connection` once the store has been closed
    ///
    /// Checked before the schema registry is consulted, so cached
    /// definitions cannot answer for a closed store.
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.pool.is_closed() {
            return Err(StoreError::Connection(sqlx::Error::PoolClosed));
        }
        Ok(())
    }

    /// Close all connections in the pool
    ///
    /// Safe to call more than once. Later operations fail with
    /// `StoreError::Connection`.
    pub async fn close(&self) {
        if self.pool.is_closed() {
            debug!(database = %self.target, "record store already closed");
            return;
        }
        self.pool.close().await;
        info!(database = %self.target, "closed record store");
    }

    /// Look up a defined schema by name
    pub fn schema(&self, name: &str) -> Result<Arc<Schema>> {
        self.registry_read()?
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::validation(format!("schema '{}' is not defined", name)))
    }

    /// Names of all defined schemas, sorted
    pub fn schemas(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.registry_read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub(crate) fn register(&self, schema: Schema) -> Result<Arc<Schema>> {
        let mut registry = self
            .schemas
            .write()
            .map_err(|_| StoreError::Config("schema registry lock poisoned".to_string()))?;
        let schema = Arc::new(schema);
        registry.insert(schema.name().to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    fn registry_read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Schema>>>> {
        self.schemas
            .read()
            .map_err(|_| StoreError::Config("schema registry lock poisoned".to_string()))
    }

    /// Get store statistics
    ///
    /// Row counts for every defined schema plus pool usage.
    pub async fn stats(&self) -> Result<StoreStats> {
        self.ensure_open()?;
        let mut record_counts = Vec::new();
        for name in self.schemas()? {
            let count = self.count(&name).await?;
            record_counts.push((name, count));
        }

        Ok(StoreStats {
            record_counts,
            pool_size: self.pool.size(),
            idle_connections: self.pool.num_idle(),
        })
    }
}

/// Store statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// (schema name, rows), sorted by schema name
    pub record_counts: Vec<(String, i64)>,
    pub pool_size: u32,
    pub idle_connections: usize,
}
