/// Read filters
///
/// A predicate is a conjunction of conditions, each either `field = value`
/// or `field IN (values...)`. Values only ever reach SQL as bound
/// parameters.

use crate::db::models::Value;
use crate::db::schema::{quote, Schema};
use crate::error::{Result, StoreError};
use sqlx::{QueryBuilder, Sqlite};

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq { field: String, value: Value },
    AnyOf { field: String, values: Vec<Value> },
}

impl Condition {
    pub fn field(&self) -> &str {
        match self {
            Condition::Eq { field, .. } | Condition::AnyOf { field, .. } => field,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    /// Matches every row
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and_eq(field, value)
    }

    /// Set membership. An empty set matches nothing.
    pub fn any_of<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::all().and_any_of(field, values)
    }

    pub fn and_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn and_any_of<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.conditions.push(Condition::AnyOf {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Conjunction of both predicates
    pub fn and(mut self, other: Predicate) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Every condition must name a column of the schema and compare it
    /// with values of the column's type
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        for condition in &self.conditions {
            let Some(field_type) = schema.column_type(condition.field()) else {
                return Err(StoreError::validation(format!(
                    "{}: cannot filter on unknown field '{}'",
                    schema.name(),
                    condition.field()
                )));
            };
            let values = match condition {
                Condition::Eq { value, .. } => std::slice::from_ref(value),
                Condition::AnyOf { values, .. } => values.as_slice(),
            };
            if let Some(bad) = values.iter().find(|v| !v.fits(field_type)) {
                return Err(StoreError::validation(format!(
                    "{}.{}: cannot compare {} field with {} value",
                    schema.name(),
                    condition.field(),
                    field_type,
                    bad.type_name()
                )));
            }
        }
        Ok(())
    }

    /// Append ` WHERE ...` (nothing when the predicate is empty)
    pub(crate) fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        for (i, condition) in self.conditions.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            match condition {
                Condition::Eq { field, value } => {
                    qb.push(quote(field));
                    // `= NULL` never matches
                    if value.is_null() {
                        qb.push(" IS NULL");
                    } else {
                        qb.push(" = ");
                        push_value(qb, value);
                    }
                }
                Condition::AnyOf { values, .. } if values.is_empty() => {
                    qb.push("1 = 0");
                }
                Condition::AnyOf { field, values } => {
                    qb.push(quote(field));
                    qb.push(" IN (");
                    for (j, value) in values.iter().enumerate() {
                        if j > 0 {
                            qb.push(", ");
                        }
                        push_value(qb, value);
                    }
                    qb.push(")");
                }
            }
        }
    }
}

/// Bind one value as a statement parameter
pub(crate) fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: &Value) {
    match value.clone() {
        Value::Null => qb.push_bind(None::<i64>),
        Value::Integer(i) => qb.push_bind(i),
        Value::Real(r) => qb.push_bind(r),
        Value::Text(s) => qb.push_bind(s),
        Value::Date(d) => qb.push_bind(d),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::Field;

    fn artist() -> Schema {
        Schema::new("Artist", "ArtistId").field(Field::text("Name"))
    }

    fn render(predicate: &Predicate) -> String {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM \"Artist\"");
        predicate.push_where(&mut qb);
        qb.sql().to_string()
    }

    #[test]
    fn test_empty_predicate_has_no_where() {
        assert_eq!(render(&Predicate::all()), "SELECT * FROM \"Artist\"");
    }

    #[test]
    fn test_values_are_bound_not_interpolated() {
        let sql = render(&Predicate::eq("Name", "Queen'; DROP TABLE \"Artist\"; --"));
        assert_eq!(sql, "SELECT * FROM \"Artist\" WHERE \"Name\" = ?");
    }

    #[test]
    fn test_any_of_and_conjunction() {
        let predicate = Predicate::any_of("Name", ["Queen", "AC/DC"]).and(Predicate::eq("ArtistId", 51i64));
        assert_eq!(
            render(&predicate),
            "SELECT * FROM \"Artist\" WHERE \"Name\" IN (?, ?) AND \"ArtistId\" = ?"
        );
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        let predicate = Predicate::any_of("Name", Vec::<String>::new());
        assert_eq!(render(&predicate), "SELECT * FROM \"Artist\" WHERE 1 = 0");
    }

    #[test]
    fn test_null_equality_renders_is_null() {
        let predicate = Predicate::eq("Name", Value::Null);
        assert_eq!(render(&predicate), "SELECT * FROM \"Artist\" WHERE \"Name\" IS NULL");
    }

    #[test]
    fn test_validate_unknown_field() {
        let schema = artist();
        assert!(Predicate::eq("Name", "Queen").validate(&schema).is_ok());
        assert!(Predicate::eq("ArtistId", 1i64).validate(&schema).is_ok());
        assert!(matches!(
            Predicate::eq("Composer", "Queen").validate(&schema),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_value_types() {
        let schema = artist();
        assert!(matches!(
            Predicate::eq("ArtistId", "51").validate(&schema),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            Predicate::any_of("Name", vec![Value::from("Queen"), Value::Integer(1)]).validate(&schema),
            Err(StoreError::Validation(_))
        ));
        assert!(Predicate::eq("Name", Value::Null).validate(&schema).is_ok());
        assert!(Predicate::any_of("ArtistId", [1i64, 2]).validate(&schema).is_ok());
    }
}
