/// Typed layer over the record store
///
/// Entities map plain structs to schemas; repositories run CRUD for them.

pub mod entities;
pub mod repository;

pub use entities::{Album, Artist, Game, Programmer, Track};
pub use repository::{Entity, Repository};
