/// Typed access to a record store
///
/// Entities are plain structs that know their schema and how to convert
/// to and from a `Record`. A `Repository` does the conversion around each
/// store call.

use crate::db::{Predicate, Record, RecordStore, Schema};
use crate::error::{Result, StoreError};
use std::marker::PhantomData;
use std::sync::Arc;

/// A struct stored as one row of its schema
pub trait Entity: Sized + Send + Sync {
    /// Shape registered with the store
    fn schema() -> Schema;

    fn id(&self) -> Option<i64>;

    fn set_id(&mut self, id: i64);

    /// All non-key fields. The key travels in `Record::id`.
    fn to_record(&self) -> Record;

    fn from_record(record: &Record) -> Result<Self>;
}

/// Handles CRUD for one entity type
pub struct Repository<E: Entity> {
    store: Arc<RecordStore>,
    schema: Arc<Schema>,
    _entity: PhantomData<E>,
}

impl<E: Entity> Repository<E> {
    /// Create a repository, defining the entity's schema if needed
    pub async fn new(store: Arc<RecordStore>) -> Result<Self> {
        let schema = store.define_schema(E::schema()).await?;
        Ok(Self {
            store,
            schema,
            _entity: PhantomData,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Insert an entity and write the assigned key back into it
    pub async fn create(&self, entity: &mut E) -> Result<i64> {
        let mut record = entity.to_record();
        let id = self.store.create(&mut record).await?;
        entity.set_id(id);
        Ok(id)
    }

    /// Insert several entities as one unit
    ///
    /// Nothing is stored if any entity is rejected.
    pub async fn create_all(&self, entities: &mut [E]) -> Result<Vec<i64>> {
        let mut records: Vec<Record> = entities.iter().map(E::to_record).collect();
        let ids = self.store.create_all(&mut records).await?;
        for (entity, id) in entities.iter_mut().zip(&ids) {
            entity.set_id(*id);
        }
        Ok(ids)
    }

    /// Get all entities, ordered by key
    pub async fn all(&self) -> Result<Vec<E>> {
        let records = self.store.read_all(self.schema.name()).await?;
        records.iter().map(E::from_record).collect()
    }

    /// Get entities matching a predicate
    pub async fn find(&self, predicate: &Predicate) -> Result<Vec<E>> {
        let records = self.store.read_filtered(self.schema.name(), predicate).await?;
        records.iter().map(E::from_record).collect()
    }

    /// Get an entity by key
    pub async fn get(&self, id: i64) -> Result<Option<E>> {
        self.store
            .get(self.schema.name(), id)
            .await?
            .as_ref()
            .map(E::from_record)
            .transpose()
    }

    /// Write back a stored entity
    ///
    /// Only fields that differ from the stored row are sent.
    pub async fn save(&self, entity: &E) -> Result<()> {
        let Some(id) = entity.id() else {
            return Err(StoreError::validation(format!(
                "{}: entity has no primary key; create it first",
                self.schema.name()
            )));
        };

        let wanted = entity.to_record();
        let mut stored = self
            .store
            .get(self.schema.name(), id)
            .await?
            .ok_or_else(|| StoreError::not_found(self.schema.name(), id))?;
        for (field, value) in wanted.fields() {
            if stored.get(field) != Some(value) {
                stored.set(field, value.clone());
            }
        }
        self.store.update(&mut stored).await
    }

    /// Delete an entity by key
    pub async fn remove(&self, id: i64) -> Result<()> {
        self.store.delete(self.schema.name(), id).await
    }

    pub async fn count(&self) -> Result<i64> {
        self.store.count(self.schema.name()).await
    }
}
