/// Schema declarations
///
/// A schema names a table, its typed fields and the integer primary key.
/// Identifiers are checked once here so query building can quote them
/// without further escaping.

use crate::db::models::{FieldType, Record, Value};
use crate::error::{Result, StoreError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(IDENTIFIER_PATTERN).expect("identifier pattern is valid"))
}

/// Reject anything that is not a plain SQL identifier
pub fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    if identifier_regex().is_match(name) {
        Ok(())
    } else {
        Err(StoreError::validation(format!(
            "invalid {} name '{}': use letters, digits and underscores",
            kind, name
        )))
    }
}

/// Double-quote a checked identifier
pub(crate) fn quote(name: &str) -> String {
    format!("\"{}\"", name)
}

/// Target of a foreign-key field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub schema: String,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub references: Option<ForeignKey>,
}

impl Field {
    /// Nullable field
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            references: None,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn real(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Real)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Date)
    }

    /// NOT NULL; `create` rejects records that leave it out
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Integer field pointing at another schema's key
    pub fn references(mut self, schema: impl Into<String>, field: impl Into<String>) -> Self {
        self.references = Some(ForeignKey {
            schema: schema.into(),
            field: field.into(),
        });
        self
    }

    fn column_sql(&self) -> String {
        let mut sql = format!("{} {}", quote(&self.name), self.field_type.sql_type());
        if self.required {
            sql.push_str(" NOT NULL");
        }
        if let Some(fk) = &self.references {
            sql.push_str(&format!(" REFERENCES {}({})", quote(&fk.schema), quote(&fk.field)));
        }
        sql
    }
}

/// A named record shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    name: String,
    primary_key: String,
    fields: Vec<Field>,
}

impl Schema {
    /// Start a schema with its integer primary key
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            fields: Vec::new(),
        }
    }

    /// Add a non-key field
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn find_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether `name` is the key or a declared field
    pub fn has_column(&self, name: &str) -> bool {
        name == self.primary_key || self.find_field(name).is_some()
    }

    /// Type of the key or a declared field
    pub fn column_type(&self, name: &str) -> Option<FieldType> {
        if name == self.primary_key {
            Some(FieldType::Integer)
        } else {
            self.find_field(name).map(|f| f.field_type)
        }
    }

    /// Key first, then fields in declaration order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary_key.as_str()).chain(self.fields.iter().map(|f| f.name.as_str()))
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = (&Field, &ForeignKey)> {
        self.fields
            .iter()
            .filter_map(|f| f.references.as_ref().map(|fk| (f, fk)))
    }

    /// Structural checks that need no other schema
    pub fn validate(&self) -> Result<()> {
        validate_identifier("schema", &self.name)?;
        validate_identifier("field", &self.primary_key)?;

        let mut seen = vec![self.primary_key.as_str()];
        for field in &self.fields {
            validate_identifier("field", &field.name)?;
            if seen.contains(&field.name.as_str()) {
                return Err(StoreError::validation(format!(
                    "{}: field '{}' declared twice",
                    self.name, field.name
                )));
            }
            seen.push(&field.name);

            if let Some(fk) = &field.references {
                validate_identifier("schema", &fk.schema)?;
                validate_identifier("field", &fk.field)?;
                if field.field_type != FieldType::Integer {
                    return Err(StoreError::validation(format!(
                        "{}.{}: foreign keys must be integer fields",
                        self.name, field.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Check a record's values against this shape. With `require_all`,
    /// required fields must be present and non-null (inserts); otherwise
    /// only the fields present are checked (updates).
    pub fn check_record(&self, record: &Record, require_all: bool) -> Result<()> {
        if record.schema() != self.name {
            return Err(StoreError::validation(format!(
                "record belongs to '{}', not '{}'",
                record.schema(),
                self.name
            )));
        }

        for (name, value) in record.fields() {
            if name == self.primary_key {
                return Err(StoreError::validation(format!(
                    "{}: primary key '{}' cannot be set as a field",
                    self.name, name
                )));
            }
            let field = self.find_field(name).ok_or_else(|| {
                StoreError::validation(format!("{}: unknown field '{}'", self.name, name))
            })?;
            self.check_value(field, value)?;
        }

        if require_all {
            for field in self.fields.iter().filter(|f| f.required) {
                let present = record.get(&field.name).is_some_and(|v| !v.is_null());
                if !present {
                    return Err(StoreError::validation(format!(
                        "{}: missing required field '{}'",
                        self.name, field.name
                    )));
                }
            }
        }

        Ok(())
    }

    pub(crate) fn check_value(&self, field: &Field, value: &Value) -> Result<()> {
        if !value.fits(field.field_type) {
            return Err(StoreError::validation(format!(
                "{}.{}: expected {}, found {}",
                self.name,
                field.name,
                field.field_type,
                value.type_name()
            )));
        }
        if field.required && value.is_null() {
            return Err(StoreError::validation(format!(
                "{}.{}: required field cannot be null",
                self.name, field.name
            )));
        }
        Ok(())
    }

    /// `CREATE TABLE IF NOT EXISTS` for this schema
    pub fn create_table_sql(&self) -> String {
        let mut columns = vec![format!("{} INTEGER PRIMARY KEY", quote(&self.primary_key))];
        columns.extend(self.fields.iter().map(Field::column_sql));
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote(&self.name),
            columns.join(", ")
        )
    }
}
