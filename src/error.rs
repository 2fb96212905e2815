/// Error types for record-store
///
/// Every operation surfaces one of these to its immediate caller.
/// Nothing is retried and nothing is swallowed.

use thiserror::Error;

/// Main error type for record-store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend unreachable, pool closed, or the target could not be opened
    #[error("Connection error: {0}")]
    Connection(#[source] sqlx::Error),

    /// Record or schema rejected before anything was sent to the backend
    #[error("Validation error: {0}")]
    Validation(String),

    /// Update or delete target does not exist
    #[error("Record not found: {schema} with key {id}")]
    NotFound { schema: String, id: i64 },

    /// Backend rejected a well-formed statement
    #[error("Backend error: {0}")]
    Backend(#[source] sqlx::Error),

    /// I/O errors (creating the database directory, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for record-store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Sort sqlx failures into "could not talk to the backend" and
/// "the backend said no".
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => StoreError::Connection(err),
            _ => StoreError::Backend(err),
        }
    }
}

impl StoreError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }

    pub(crate) fn not_found(schema: &str, id: i64) -> Self {
        StoreError::NotFound {
            schema: schema.to_string(),
            id,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// True when the backend refused the statement because of a foreign key
    pub fn is_foreign_key_violation(&self) -> bool {
        match self {
            StoreError::Backend(sqlx::Error::Database(db_err)) => db_err.is_foreign_key_violation(),
            _ => false,
        }
    }

    /// Convert StoreError to a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            StoreError::Connection(e) => {
                format!("Could not reach the database. Check the target path. Details: {}", e)
            }
            StoreError::Validation(reason) => {
                format!("Record rejected: {}", reason)
            }
            StoreError::NotFound { schema, id } => {
                format!("No {} record with key {}", schema, id)
            }
            StoreError::Backend(e) => {
                format!("The database refused the operation. Details: {}", e)
            }
            StoreError::Io(e) => {
                format!("File system error. Check permissions. Details: {}", e)
            }
            StoreError::Config(msg) => {
                format!("Configuration issue: {}", msg)
            }
            StoreError::Serialization(e) => {
                format!("Data format error: {}", e)
            }
        }
    }
}
