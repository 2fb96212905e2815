/// CRUD operations on defined schemas
///
/// Statements are assembled with `QueryBuilder`: identifiers come from
/// validated schemas and are quoted, values are always bound.

use crate::db::models::{FieldType, Record, Value};
use crate::db::predicate::{push_value, Predicate};
use crate::db::schema::{quote, Field, Schema};
use crate::db::RecordStore;
use crate::error::{Result, StoreError};
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl RecordStore {
    /// Register a record shape and create its table if absent
    ///
    /// Re-registering an identical schema is a no-op. A different schema
    /// under a name already in use is rejected.
    ///
    /// # Returns
    /// * `Ok(Arc<Schema>)` - The registered schema
    /// * `Err(StoreError::Validation)` - Bad identifiers, key or references
    /// * `Err(StoreError::Connection)` - Store is closed
    pub async fn define_schema(&self, schema: Schema) -> Result<Arc<Schema>> {
        self.ensure_open()?;
        schema.validate()?;

        if let Ok(existing) = self.schema(schema.name()) {
            if *existing == schema {
                debug!(schema = schema.name(), "schema already defined");
                return Ok(existing);
            }
            return Err(StoreError::validation(format!(
                "schema '{}' is already defined with a different shape",
                schema.name()
            )));
        }

        for (field, fk) in schema.foreign_keys() {
            let target_key = if fk.schema == schema.name() {
                schema.primary_key().to_string()
            } else {
                self.schema(&fk.schema)
                    .map_err(|_| {
                        StoreError::validation(format!(
                            "{}.{} references undefined schema '{}'",
                            schema.name(),
                            field.name,
                            fk.schema
                        ))
                    })?
                    .primary_key()
                    .to_string()
            };
            if fk.field != target_key {
                return Err(StoreError::validation(format!(
                    "{}.{} must reference the primary key of '{}'",
                    schema.name(),
                    field.name,
                    fk.schema
                )));
            }
        }

        sqlx::query(&schema.create_table_sql())
            .execute(self.pool())
            .await?;
        self.verify_columns(&schema).await?;

        info!(schema = schema.name(), fields = schema.fields().len(), "defined schema");
        self.register(schema)
    }

    /// A table left behind by an earlier run may not match the declaration
    async fn verify_columns(&self, schema: &Schema) -> Result<()> {
        let rows = sqlx::query(&format!("PRAGMA table_info({})", quote(schema.name())))
            .fetch_all(self.pool())
            .await?;
        let existing: Vec<String> = rows
            .iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<std::result::Result<_, _>>()?;

        for column in schema.column_names() {
            if !existing.iter().any(|c| c == column) {
                return Err(StoreError::validation(format!(
                    "table '{}' exists without column '{}'",
                    schema.name(),
                    column
                )));
            }
        }
        Ok(())
    }

    /// Insert a new record
    ///
    /// # Arguments
    /// * `record` - Unsaved record; receives its key on success
    ///
    /// # Returns
    /// * `Ok(i64)` - The assigned primary key
    /// * `Err(StoreError::Validation)` - Missing/unknown fields or dangling foreign keys
    /// * `Err(StoreError::Backend)` - Constraint rejected by the database
    pub async fn create(&self, record: &mut Record) -> Result<i64> {
        self.ensure_open()?;
        let schema = self.prepare_insert(record)?;

        let mut tx = self.pool().begin().await?;
        let id = insert_record(&mut tx, &schema, record).await?;
        tx.commit().await?;

        record.assign_id(id);
        record.mark_clean();
        debug!(schema = schema.name(), id, "created record");

        Ok(id)
    }

    /// Insert several records in one transaction
    ///
    /// Either every record is stored or none is. Keys are assigned only
    /// after the transaction commits.
    ///
    /// # Returns
    /// * `Ok(Vec<i64>)` - Assigned keys, in input order
    /// * `Err(StoreError::Validation)` - Some record was rejected; nothing stored
    pub async fn create_all(&self, records: &mut [Record]) -> Result<Vec<i64>> {
        self.ensure_open()?;
        let schemas = records
            .iter_mut()
            .map(|record| self.prepare_insert(record))
            .collect::<Result<Vec<_>>>()?;

        let mut tx = self.pool().begin().await?;
        let mut ids = Vec::with_capacity(records.len());
        for (record, schema) in records.iter().zip(&schemas) {
            ids.push(insert_record(&mut tx, schema, record).await?);
        }
        tx.commit().await?;

        for (record, id) in records.iter_mut().zip(&ids) {
            record.assign_id(*id);
            record.mark_clean();
        }
        debug!(count = ids.len(), "created records");

        Ok(ids)
    }

    /// Check a record against its schema ahead of an insert
    fn prepare_insert(&self, record: &mut Record) -> Result<Arc<Schema>> {
        let schema = self.schema(record.schema())?;
        if let Err(e) = schema.check_record(record, true) {
            warn!(schema = schema.name(), error = %e, "rejected record");
            return Err(e);
        }
        widen_reals(&schema, record);
        Ok(schema)
    }

    /// Get every record of a schema, ordered by primary key
    pub async fn read_all(&self, schema: &str) -> Result<Vec<Record>> {
        self.read_filtered(schema, &Predicate::all()).await
    }

    /// Get the records matching a predicate, ordered by primary key
    ///
    /// # Arguments
    /// * `schema` - Schema name
    /// * `predicate` - Equality / membership conditions, all bound as parameters
    pub async fn read_filtered(&self, schema: &str, predicate: &Predicate) -> Result<Vec<Record>> {
        self.ensure_open()?;
        let schema = self.schema(schema)?;
        predicate.validate(&schema)?;

        let columns: Vec<&str> = schema.column_names().collect();
        let rows = self.select_rows(&schema, &columns, predicate).await?;

        rows.iter().map(|row| row_to_record(&schema, row)).collect()
    }

    /// Get only the named columns of the matching records
    ///
    /// The returned records hold just the requested fields. Their key is
    /// set only when the primary key is among the columns.
    ///
    /// # Arguments
    /// * `schema` - Schema name
    /// * `columns` - Key and/or field names, at least one
    /// * `predicate` - Equality / membership conditions
    pub async fn read_columns(
        &self,
        schema: &str,
        columns: &[&str],
        predicate: &Predicate,
    ) -> Result<Vec<Record>> {
        self.ensure_open()?;
        let schema = self.schema(schema)?;
        predicate.validate(&schema)?;

        if columns.is_empty() {
            return Err(StoreError::validation(format!("{}: no columns selected", schema.name())));
        }
        if let Some(unknown) = columns.iter().find(|c| !schema.has_column(c)) {
            return Err(StoreError::validation(format!(
                "{}: cannot select unknown column '{}'",
                schema.name(),
                unknown
            )));
        }

        let rows = self.select_rows(&schema, columns, predicate).await?;

        rows.iter()
            .map(|row| row_to_projection(&schema, columns, row))
            .collect()
    }

    async fn select_rows(
        &self,
        schema: &Schema,
        columns: &[&str],
        predicate: &Predicate,
    ) -> Result<Vec<SqliteRow>> {
        let selected = columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ");
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM {}",
            selected,
            quote(schema.name())
        ));
        predicate.push_where(&mut qb);
        qb.push(format!(" ORDER BY {}", quote(schema.primary_key())));

        Ok(qb.build().fetch_all(self.pool()).await?)
    }

    /// Get a record by primary key
    pub async fn get(&self, schema: &str, id: i64) -> Result<Option<Record>> {
        self.ensure_open()?;
        let primary_key = self.schema(schema)?.primary_key().to_string();
        let mut records = self
            .read_filtered(schema, &Predicate::eq(primary_key, id))
            .await?;
        Ok(records.pop())
    }

    /// Persist the modified fields of a stored record
    ///
    /// Only fields changed through `Record::set` since the record was
    /// loaded are written.
    ///
    /// # Returns
    /// * `Ok(())` - Changes saved
    /// * `Err(StoreError::NotFound)` - No row with the record's key
    /// * `Err(StoreError::Validation)` - Record has no key or bad values
    pub async fn update(&self, record: &mut Record) -> Result<()> {
        self.ensure_open()?;
        let schema = self.schema(record.schema())?;
        let id = record.id().ok_or_else(|| {
            StoreError::validation(format!(
                "{}: record has no primary key; create it first",
                schema.name()
            ))
        })?;
        if let Err(e) = schema.check_record(record, false) {
            warn!(schema = schema.name(), id, error = %e, "rejected update");
            return Err(e);
        }
        widen_reals(&schema, record);

        let changes: Vec<(&Field, &Value)> = record
            .dirty_fields()
            .filter_map(|name| {
                let field = schema.find_field(name)?;
                record.get(name).map(|v| (field, v))
            })
            .collect();

        let mut tx = self.pool().begin().await?;

        let found = if changes.is_empty() {
            exists(&mut tx, &schema, id).await?
        } else {
            let references: Vec<(&Field, &Value)> = changes
                .iter()
                .filter(|(field, _)| field.references.is_some())
                .copied()
                .collect();
            check_references(&mut tx, &schema, &references).await?;

            let mut qb = update_statement(&schema, &changes);
            qb.push(format!(" WHERE {} = ", quote(schema.primary_key())));
            qb.push_bind(id);
            qb.build().execute(&mut *tx).await?.rows_affected() > 0
        };

        if !found {
            return Err(StoreError::not_found(schema.name(), id));
        }
        tx.commit().await?;

        record.mark_clean();
        debug!(schema = schema.name(), id, "updated record");

        Ok(())
    }

    /// Set the same values on every record matching a predicate
    ///
    /// # Returns
    /// * `Ok(u64)` - Number of rows changed
    pub async fn update_matching(
        &self,
        schema: &str,
        predicate: &Predicate,
        changes: &[(&str, Value)],
    ) -> Result<u64> {
        self.ensure_open()?;
        let schema = self.schema(schema)?;
        predicate.validate(&schema)?;
        if changes.is_empty() {
            return Err(StoreError::validation(format!("{}: no fields to update", schema.name())));
        }

        let mut owned: Vec<(&Field, Value)> = Vec::with_capacity(changes.len());
        for (name, value) in changes {
            if *name == schema.primary_key() {
                return Err(StoreError::validation(format!(
                    "{}: primary key '{}' is immutable",
                    schema.name(),
                    name
                )));
            }
            let field = schema.find_field(name).ok_or_else(|| {
                StoreError::validation(format!("{}: unknown field '{}'", schema.name(), name))
            })?;
            schema.check_value(field, value)?;
            let value = match value {
                Value::Integer(i) if field.field_type == FieldType::Real => Value::Real(*i as f64),
                other => other.clone(),
            };
            owned.push((field, value));
        }
        let resolved: Vec<(&Field, &Value)> = owned.iter().map(|(f, v)| (*f, v)).collect();

        let mut tx = self.pool().begin().await?;

        let references: Vec<(&Field, &Value)> = resolved
            .iter()
            .filter(|(field, _)| field.references.is_some())
            .copied()
            .collect();
        check_references(&mut tx, &schema, &references).await?;

        let mut qb = update_statement(&schema, &resolved);
        predicate.push_where(&mut qb);
        let affected = qb.build().execute(&mut *tx).await?.rows_affected();
        tx.commit().await?;

        debug!(schema = schema.name(), affected, "updated matching records");
        Ok(affected)
    }

    /// Delete a record by primary key
    ///
    /// Deleting a key that is not there, including a second delete of the
    /// same key, fails with `StoreError::NotFound`.
    pub async fn delete(&self, schema: &str, id: i64) -> Result<()> {
        self.ensure_open()?;
        let schema = self.schema(schema)?;

        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE {} = ?",
            quote(schema.name()),
            quote(schema.primary_key())
        ))
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(schema.name(), id));
        }

        debug!(schema = schema.name(), id, "deleted record");
        Ok(())
    }

    /// Number of stored records of a schema
    pub async fn count(&self, schema: &str) -> Result<i64> {
        self.ensure_open()?;
        let schema = self.schema(schema)?;
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", quote(schema.name())))
            .fetch_one(self.pool())
            .await?;
        Ok(count.0)
    }
}

/// `UPDATE "t" SET "a" = ?, "b" = ?` without a WHERE clause
fn update_statement<'a>(schema: &Schema, changes: &[(&Field, &Value)]) -> QueryBuilder<'a, Sqlite> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET ", quote(schema.name())));
    for (i, (field, value)) in changes.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(format!("{} = ", quote(&field.name)));
        push_value(&mut qb, value);
    }
    qb
}

/// `INSERT ... RETURNING` the key of one checked record
async fn insert_record(conn: &mut SqliteConnection, schema: &Schema, record: &Record) -> Result<i64> {
    let references: Vec<(&Field, &Value)> = schema
        .foreign_keys()
        .filter_map(|(field, _)| record.get(&field.name).map(|v| (field, v)))
        .collect();
    check_references(&mut *conn, schema, &references).await?;

    let mut columns: Vec<&str> = Vec::new();
    let mut values: Vec<&Value> = Vec::new();
    let id_value = record.id().map(Value::Integer);
    if let Some(id) = &id_value {
        columns.push(schema.primary_key());
        values.push(id);
    }
    for field in schema.fields() {
        if let Some(value) = record.get(&field.name) {
            columns.push(&field.name);
            values.push(value);
        }
    }

    let mut qb = QueryBuilder::<Sqlite>::new(format!("INSERT INTO {}", quote(schema.name())));
    if columns.is_empty() {
        qb.push(" DEFAULT VALUES");
    } else {
        qb.push(" (");
        qb.push(columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "));
        qb.push(") VALUES (");
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            push_value(&mut qb, value);
        }
        qb.push(")");
    }
    qb.push(format!(" RETURNING {}", quote(schema.primary_key())));

    let row = qb.build().fetch_one(&mut *conn).await?;
    let id: i64 = row.try_get(0)?;
    Ok(id)
}

/// Every non-null foreign key must name an existing row
async fn check_references(
    conn: &mut SqliteConnection,
    schema: &Schema,
    references: &[(&Field, &Value)],
) -> Result<()> {
    for (field, value) in references {
        let (Some(fk), Some(key)) = (&field.references, value.as_i64()) else {
            continue;
        };
        let found = sqlx::query(&format!(
            "SELECT 1 FROM {} WHERE {} = ?",
            quote(&fk.schema),
            quote(&fk.field)
        ))
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;

        if found.is_none() {
            warn!(schema = schema.name(), field = %field.name, key, "dangling foreign key");
            return Err(StoreError::validation(format!(
                "{}.{} = {} does not match any {}.{}",
                schema.name(),
                field.name,
                key,
                fk.schema,
                fk.field
            )));
        }
    }
    Ok(())
}

async fn exists(conn: &mut SqliteConnection, schema: &Schema, id: i64) -> Result<bool> {
    let found = sqlx::query(&format!(
        "SELECT 1 FROM {} WHERE {} = ?",
        quote(schema.name()),
        quote(schema.primary_key())
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(found.is_some())
}

/// Store integers given for real fields as reals so they read back equal
fn widen_reals(schema: &Schema, record: &mut Record) {
    for field in schema.fields().iter().filter(|f| f.field_type == FieldType::Real) {
        if let Some(Value::Integer(i)) = record.get(&field.name) {
            let widened = Value::Real(*i as f64);
            record.replace_value(&field.name, widened);
        }
    }
}

fn row_to_record(schema: &Schema, row: &SqliteRow) -> Result<Record> {
    let id: i64 = row.try_get(schema.primary_key())?;

    let mut values = BTreeMap::new();
    for field in schema.fields() {
        let value = read_value(row, &field.name, field.field_type)?;
        values.insert(field.name.clone(), value);
    }

    Ok(Record::loaded(schema.name(), Some(id), values))
}

/// Record holding only the selected columns
fn row_to_projection(schema: &Schema, columns: &[&str], row: &SqliteRow) -> Result<Record> {
    let mut id = None;
    let mut values = BTreeMap::new();
    for column in columns {
        if *column == schema.primary_key() {
            id = Some(row.try_get::<i64, _>(*column)?);
        } else if let Some(field) = schema.find_field(column) {
            values.insert(field.name.clone(), read_value(row, column, field.field_type)?);
        }
    }

    Ok(Record::loaded(schema.name(), id, values))
}

fn read_value(row: &SqliteRow, name: &str, field_type: FieldType) -> Result<Value> {
    let value = match field_type {
        FieldType::Integer => row.try_get::<Option<i64>, _>(name)?.into(),
        FieldType::Real => row.try_get::<Option<f64>, _>(name)?.into(),
        FieldType::Text => row.try_get::<Option<String>, _>(name)?.into(),
        FieldType::Date => row.try_get::<Option<NaiveDate>, _>(name)?.into(),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::Field;
    use tokio_test::assert_ok;

    async fn chinook() -> RecordStore {
        let store = RecordStore::new_test().await.unwrap();
        store
            .define_schema(Schema::new("Artist", "ArtistId").field(Field::text("Name")))
            .await
            .unwrap();
        store
            .define_schema(
                Schema::new("Album", "AlbumId")
                    .field(Field::text("Title").required())
                    .field(Field::integer("ArtistId").references("Artist", "ArtistId")),
            )
            .await
            .unwrap();
        store
    }

    async fn add_artist(store: &RecordStore, name: &str) -> i64 {
        let mut artist = Record::new("Artist").with("Name", name);
        store.create(&mut artist).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = chinook().await;

        let mut artist = Record::new("Artist").with("Name", "Queen");
        let id = store.create(&mut artist).await.unwrap();
        assert!(id > 0);
        assert_eq!(artist.id(), Some(id));
        assert!(!artist.is_dirty());

        let fetched = store.get("Artist", id).await.unwrap().unwrap();
        assert_eq!(fetched, artist);
    }

    #[tokio::test]
    async fn test_create_with_prepopulated_key() {
        let store = chinook().await;

        let mut artist = Record::new("Artist").with_id(51).with("Name", "Queen");
        assert_eq!(store.create(&mut artist).await.unwrap(), 51);

        // same key again is a backend constraint violation
        let mut clash = Record::new("Artist").with_id(51).with("Name", "Queen II");
        let result = store.create(&mut clash).await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert_eq!(store.count("Artist").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_missing_required_field() {
        let store = chinook().await;
        let mut album = Record::new("Album");
        let result = store.create(&mut album).await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert_eq!(album.id(), None);
    }

    #[tokio::test]
    async fn test_create_with_only_defaults() {
        let store = chinook().await;
        let mut artist = Record::new("Artist");
        let id = store.create(&mut artist).await.unwrap();

        let fetched = store.get("Artist", id).await.unwrap().unwrap();
        assert_eq!(fetched.get("Name"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_dangling_foreign_key_leaves_store_unchanged() {
        let store = chinook().await;

        let mut album = Record::new("Album")
            .with("Title", "A Night at the Opera")
            .with("ArtistId", 999i64);
        let result = store.create(&mut album).await;

        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert_eq!(store.count("Album").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_null_foreign_key_is_allowed() {
        let store = chinook().await;
        let mut album = Record::new("Album")
            .with("Title", "Unknown")
            .with("ArtistId", Value::Null);
        assert_ok!(store.create(&mut album).await);
    }

    #[tokio::test]
    async fn test_update_only_dirty_fields() {
        let store = chinook().await;
        let queen = add_artist(&store, "Queen").await;
        let acdc = add_artist(&store, "AC/DC").await;

        let mut album = Record::new("Album")
            .with("Title", "Opera")
            .with("ArtistId", queen);
        let id = store.create(&mut album).await.unwrap();

        let mut fetched = store.get("Album", id).await.unwrap().unwrap();
        fetched.set("ArtistId", acdc);
        store.update(&mut fetched).await.unwrap();
        assert!(!fetched.is_dirty());

        let stored = store.get("Album", id).await.unwrap().unwrap();
        assert_eq!(stored.get("Title"), Some(&Value::from("Opera")));
        assert_eq!(stored.get("ArtistId"), Some(&Value::Integer(acdc)));
    }

    #[tokio::test]
    async fn test_stale_copy_does_not_clobber_untouched_fields() {
        let store = chinook().await;
        let mut album = Record::new("Album").with("Title", "Jazz");
        let id = store.create(&mut album).await.unwrap();

        let mut first = store.get("Album", id).await.unwrap().unwrap();
        let mut second = store.get("Album", id).await.unwrap().unwrap();

        first.set("Title", "Jazz (Remastered)");
        store.update(&mut first).await.unwrap();

        // second copy touches nothing, so it writes nothing
        store.update(&mut second).await.unwrap();

        let stored = store.get("Album", id).await.unwrap().unwrap();
        assert_eq!(stored.get("Title"), Some(&Value::from("Jazz (Remastered)")));
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let store = chinook().await;

        let mut ghost = Record::new("Artist").with_id(42).with("Name", "Nobody");
        let result = store.update(&mut ghost).await;
        assert!(matches!(result, Err(StoreError::NotFound { id: 42, .. })));

        let mut clean_ghost = Record::loaded("Artist", Some(43), BTreeMap::new());
        let result = store.update(&mut clean_ghost).await;
        assert!(matches!(result, Err(StoreError::NotFound { id: 43, .. })));
    }

    #[tokio::test]
    async fn test_update_requires_key() {
        let store = chinook().await;
        let mut unsaved = Record::new("Artist").with("Name", "Queen");
        let result = store.update(&mut unsaved).await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_rejects_dangling_reference() {
        let store = chinook().await;
        let queen = add_artist(&store, "Queen").await;
        let mut album = Record::new("Album").with("Title", "Jazz").with("ArtistId", queen);
        let id = store.create(&mut album).await.unwrap();

        album.set("ArtistId", 777i64);
        let result = store.update(&mut album).await;
        assert!(matches!(result, Err(StoreError::Validation(_))));

        let stored = store.get("Album", id).await.unwrap().unwrap();
        assert_eq!(stored.get("ArtistId"), Some(&Value::Integer(queen)));
    }

    #[tokio::test]
    async fn test_update_matching() {
        let store = chinook().await;
        for name in ["Queen", "AC/DC", "Accept"] {
            add_artist(&store, name).await;
        }

        let changed = store
            .update_matching(
                "Artist",
                &Predicate::any_of("Name", ["Queen", "Accept"]),
                &[("Name", Value::from("Renamed"))],
            )
            .await
            .unwrap();
        assert_eq!(changed, 2);

        let renamed = store
            .read_filtered("Artist", &Predicate::eq("Name", "Renamed"))
            .await
            .unwrap();
        assert_eq!(renamed.len(), 2);
    }

    #[tokio::test]
    async fn test_update_matching_rejects_key_and_empty_changes() {
        let store = chinook().await;
        let result = store
            .update_matching("Artist", &Predicate::all(), &[("ArtistId", Value::Integer(1))])
            .await;
        assert!(matches!(result, Err(StoreError::Validation(_))));

        let result = store.update_matching("Artist", &Predicate::all(), &[]).await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let store = chinook().await;
        let id = add_artist(&store, "Queen").await;

        store.delete("Artist", id).await.unwrap();
        assert!(store.get("Artist", id).await.unwrap().is_none());

        let result = store.delete("Artist", id).await;
        assert!(result.as_ref().is_err_and(StoreError::is_not_found));
    }

    #[tokio::test]
    async fn test_delete_referenced_row_is_backend_error() {
        let store = chinook().await;
        let queen = add_artist(&store, "Queen").await;
        let mut album = Record::new("Album").with("Title", "Jazz").with("ArtistId", queen);
        store.create(&mut album).await.unwrap();

        let result = store.delete("Artist", queen).await;
        let err = result.unwrap_err();
        assert!(err.is_foreign_key_violation());
        assert_eq!(store.count("Artist").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_read_filtered_any_of() {
        let store = chinook().await;
        for name in ["Queen", "AC/DC", "Aerosmith", "Queen"] {
            add_artist(&store, name).await;
        }

        let matches = store
            .read_filtered("Artist", &Predicate::any_of("Name", ["Queen", "AC/DC", "Queen"]))
            .await
            .unwrap();

        let ids: Vec<i64> = matches.iter().filter_map(Record::id).collect();
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn test_read_filtered_unknown_field() {
        let store = chinook().await;
        let result = store
            .read_filtered("Artist", &Predicate::eq("Composer", "Queen"))
            .await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_define_schema_is_idempotent() {
        let store = chinook().await;
        let again = store
            .define_schema(Schema::new("Artist", "ArtistId").field(Field::text("Name")))
            .await;
        assert_ok!(again);
        assert_eq!(store.schemas().unwrap(), vec!["Album", "Artist"]);
    }

    #[tokio::test]
    async fn test_define_schema_conflict() {
        let store = chinook().await;
        let result = store
            .define_schema(Schema::new("Artist", "ArtistId").field(Field::integer("Name")))
            .await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_define_schema_requires_referenced_schema() {
        let store = RecordStore::new_test().await.unwrap();
        let result = store
            .define_schema(
                Schema::new("Track", "TrackId")
                    .field(Field::integer("AlbumId").references("Album", "AlbumId")),
            )
            .await;
        assert!(matches!(result, Err(StoreError::Validation(_))));

        let result = store
            .define_schema(
                Schema::new("Employee", "EmployeeId")
                    .field(Field::integer("ReportsTo").references("Employee", "EmployeeId")),
            )
            .await;
        assert_ok!(result);
    }

    #[tokio::test]
    async fn test_define_schema_against_mismatched_table() {
        let store = RecordStore::new_test().await.unwrap();
        sqlx::query("CREATE TABLE \"Artist\" (\"ArtistId\" INTEGER PRIMARY KEY)")
            .execute(store.pool())
            .await
            .unwrap();

        let result = store
            .define_schema(Schema::new("Artist", "ArtistId").field(Field::text("Name")))
            .await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_real_fields_widen_integers() {
        let store = RecordStore::new_test().await.unwrap();
        store
            .define_schema(Schema::new("Scores", "id").field(Field::real("score")))
            .await
            .unwrap();

        let mut record = Record::new("Scores").with("score", 10i64);
        let id = store.create(&mut record).await.unwrap();
        assert_eq!(record.get("score"), Some(&Value::Real(10.0)));

        let fetched = store.get("Scores", id).await.unwrap().unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test]
    async fn test_operations_after_close() {
        let store = chinook().await;
        store.close().await;

        let result = store.read_all("Artist").await;
        assert!(matches!(result, Err(StoreError::Connection(_))));

        let mut artist = Record::new("Artist").with("Name", "Queen");
        let result = store.create(&mut artist).await;
        assert!(matches!(result, Err(StoreError::Connection(_))));

        // already registered, so only the closed pool can reject it
        let result = store
            .define_schema(Schema::new("Artist", "ArtistId").field(Field::text("Name")))
            .await;
        assert!(matches!(result, Err(StoreError::Connection(_))));

        let result = store.get("Artist", 1).await;
        assert!(matches!(result, Err(StoreError::Connection(_))));
        let result = store.delete("Artist", 1).await;
        assert!(matches!(result, Err(StoreError::Connection(_))));
        let result = store.stats().await;
        assert!(matches!(result, Err(StoreError::Connection(_))));
    }

    #[tokio::test]
    async fn test_create_all_commits_nothing_on_failure() {
        let store = chinook().await;
        let queen = add_artist(&store, "Queen").await;

        let mut batch = vec![
            Record::new("Album").with("Title", "Opera").with("ArtistId", queen),
            Record::new("Album").with("Title", "Ghost").with("ArtistId", queen + 100),
        ];
        let result = store.create_all(&mut batch).await;

        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert_eq!(store.count("Album").await.unwrap(), 0);
        assert_eq!(batch[0].id(), None);
        assert!(batch[0].is_dirty());
    }

    #[tokio::test]
    async fn test_create_all_mixed_schemas() {
        let store = chinook().await;

        let mut batch = vec![
            Record::new("Artist").with_id(1).with("Name", "Queen"),
            Record::new("Album").with("Title", "Jazz").with("ArtistId", 1i64),
        ];
        let ids = store.create_all(&mut batch).await.unwrap();

        assert_eq!(ids, vec![1, 1]);
        assert_eq!(batch[1].id(), Some(1));
        assert!(!batch[1].is_dirty());
    }

    #[tokio::test]
    async fn test_read_columns_projects_fields() {
        let store = chinook().await;
        add_artist(&store, "AC/DC").await;
        add_artist(&store, "Queen").await;

        let names = store
            .read_columns("Artist", &["Name"], &Predicate::all())
            .await
            .unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].id(), None);
        assert_eq!(names[0].fields().collect::<Vec<_>>(), vec![("Name", &Value::from("AC/DC"))]);

        let queen = store
            .read_columns("Artist", &["ArtistId", "Name"], &Predicate::eq("Name", "Queen"))
            .await
            .unwrap();
        assert_eq!(queen.len(), 1);
        assert_eq!(queen[0].id(), Some(2));
        assert_eq!(queen[0].get("Name"), Some(&Value::from("Queen")));
    }

    #[tokio::test]
    async fn test_read_columns_rejects_bad_selection() {
        let store = chinook().await;

        let result = store.read_columns("Artist", &["Composer"], &Predicate::all()).await;
        assert!(matches!(result, Err(StoreError::Validation(_))));

        let result = store.read_columns("Artist", &[], &Predicate::all()).await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_filter_value_must_match_column_type() {
        let store = chinook().await;
        add_artist(&store, "Queen").await;

        let result = store
            .read_filtered("Artist", &Predicate::eq("ArtistId", "1"))
            .await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_from_deserialized_record() {
        let store = chinook().await;
        let id = add_artist(&store, "Queen").await;

        let json = format!(r#"{{"schema": "Artist", "id": {}, "values": {{"Name": {{"text": "Queen + Adam Lambert"}}}}}}"#, id);
        let mut record: Record = serde_json::from_str(&json).unwrap();
        store.update(&mut record).await.unwrap();

        let stored = store.get("Artist", id).await.unwrap().unwrap();
        assert_eq!(stored.get("Name"), Some(&Value::from("Queen + Adam Lambert")));
    }

    #[tokio::test]
    async fn test_stats_counts_rows() {
        let store = chinook().await;
        add_artist(&store, "Queen").await;

        let stats = store.stats().await.unwrap();
        assert_eq!(
            stats.record_counts,
            vec![("Album".to_string(), 0), ("Artist".to_string(), 1)]
        );
    }
}
