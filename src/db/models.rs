/// Data models for stored records
///
/// A `Record` is the dynamic, in-memory form of one row. Typed entities
/// convert to and from it.

use crate::error::{Result, StoreError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Semantic type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Real,
    Text,
    Date,
}

impl FieldType {
    /// Column type used in `CREATE TABLE`
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldType::Integer => "INTEGER",
            FieldType::Real => "REAL",
            FieldType::Text => "TEXT",
            // Stored as ISO 8601 text
            FieldType::Date => "DATE",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldType::Integer => "integer",
            FieldType::Real => "real",
            FieldType::Text => "text",
            FieldType::Date => "date",
        };
        write!(f, "{}", s)
    }
}

/// A scalar field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers widen to floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Null fits any field. Integer also fits a real field.
    pub fn fits(&self, field_type: FieldType) -> bool {
        matches!(
            (self, field_type),
            (Value::Null, _)
                | (Value::Integer(_), FieldType::Integer)
                | (Value::Integer(_), FieldType::Real)
                | (Value::Real(_), FieldType::Real)
                | (Value::Text(_), FieldType::Text)
                | (Value::Date(_), FieldType::Date)
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// One row of a schema, persisted or not
///
/// The set of modified fields is not serialized. A deserialized record
/// treats every value it carries as modified, so `update` writes them all.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RecordData")]
pub struct Record {
    schema: String,
    id: Option<i64>,
    values: BTreeMap<String, Value>,
    #[serde(skip)]
    dirty: BTreeSet<String>,
}

#[derive(Deserialize)]
struct RecordData {
    schema: String,
    id: Option<i64>,
    #[serde(default)]
    values: BTreeMap<String, Value>,
}

impl From<RecordData> for Record {
    fn from(data: RecordData) -> Self {
        Self {
            dirty: data.values.keys().cloned().collect(),
            schema: data.schema,
            id: data.id,
            values: data.values,
        }
    }
}

impl Record {
    /// Empty, unsaved record of the named schema
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            id: None,
            values: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    /// Pre-populate the primary key instead of letting the store assign it
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Builder form of `set`
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Assign a field and mark it modified
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let field = field.into();
        self.values.insert(field.clone(), value.into());
        self.dirty.insert(field);
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Fields changed since the record was loaded or last saved
    pub fn dirty_fields(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    pub(crate) fn assign_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    /// Swap a stored value without marking it modified
    pub(crate) fn replace_value(&mut self, field: &str, value: Value) {
        if let Some(slot) = self.values.get_mut(field) {
            *slot = value;
        }
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty.clear();
    }

    /// Build a record from stored values. Nothing is dirty.
    pub(crate) fn loaded(schema: &str, id: Option<i64>, values: BTreeMap<String, Value>) -> Self {
        Self {
            schema: schema.to_string(),
            id,
            values,
            dirty: BTreeSet::new(),
        }
    }

    // Typed accessors used by entity conversions. A missing field reads as null.

    fn value_or_null(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&Value::Null)
    }

    fn mismatch(&self, field: &str, expected: FieldType) -> StoreError {
        StoreError::validation(format!(
            "{}.{}: expected {}, found {}",
            self.schema,
            field,
            expected,
            self.value_or_null(field).type_name()
        ))
    }

    pub fn text(&self, field: &str) -> Result<String> {
        self.opt_text(field)?
            .ok_or_else(|| self.mismatch(field, FieldType::Text))
    }

    pub fn opt_text(&self, field: &str) -> Result<Option<String>> {
        match self.value_or_null(field) {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            _ => Err(self.mismatch(field, FieldType::Text)),
        }
    }

    pub fn integer(&self, field: &str) -> Result<i64> {
        self.opt_integer(field)?
            .ok_or_else(|| self.mismatch(field, FieldType::Integer))
    }

    pub fn opt_integer(&self, field: &str) -> Result<Option<i64>> {
        match self.value_or_null(field) {
            Value::Null => Ok(None),
            Value::Integer(i) => Ok(Some(*i)),
            _ => Err(self.mismatch(field, FieldType::Integer)),
        }
    }

    pub fn real(&self, field: &str) -> Result<f64> {
        self.opt_real(field)?
            .ok_or_else(|| self.mismatch(field, FieldType::Real))
    }

    pub fn opt_real(&self, field: &str) -> Result<Option<f64>> {
        match self.value_or_null(field) {
            Value::Null => Ok(None),
            other => other
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.mismatch(field, FieldType::Real)),
        }
    }

    pub fn date(&self, field: &str) -> Result<NaiveDate> {
        self.opt_date(field)?
            .ok_or_else(|| self.mismatch(field, FieldType::Date))
    }

    pub fn opt_date(&self, field: &str) -> Result<Option<NaiveDate>> {
        match self.value_or_null(field) {
            Value::Null => Ok(None),
            Value::Date(d) => Ok(Some(*d)),
            _ => Err(self.mismatch(field, FieldType::Date)),
        }
    }
}

/// Equal when they name the same row with the same values. Pending
/// modifications are not part of identity.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.id == other.id && self.values == other.values
    }
}
