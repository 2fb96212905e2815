/// record-store library
///
/// Typed records over SQLite with parameterized create/read/update/delete.

pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod telemetry;

// Re-exports for convenience
pub use config::ConnectionConfig;
pub use db::{Field, FieldType, Predicate, Record, RecordStore, Schema, Value};
pub use error::{Result, StoreError};
