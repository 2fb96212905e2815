/// Database module for record-store
///
/// Connection handling, schema registration and parameterized CRUD over
/// SQLite using sqlx.

pub mod connection;
pub mod models;
pub mod predicate;
pub mod queries;
pub mod schema;

pub use connection::{RecordStore, StoreStats};
pub use models::*;
pub use predicate::{Condition, Predicate};
pub use schema::{Field, ForeignKey, Schema};
