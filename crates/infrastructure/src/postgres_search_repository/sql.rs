use pgvector::Vector;
use rust_decimal::Decimal;
use sqlx::Postgres;
use sqlx::postgres::PgArguments;
use sqlx::query::{Query, QueryAs};
use uuid::Uuid;

/// A value bound into a compiled statement.
#[derive(Debug, Clone)]
pub enum BindValue {
    /// TEXT parameter.
    Text(String),
    /// Nullable TEXT parameter.
    OptionalText(Option<String>),
    /// BIGINT parameter.
    Int(i64),
    /// DOUBLE PRECISION parameter.
    Float(f64),
    /// NUMERIC parameter.
    Decimal(Decimal),
    /// UUID parameter.
    Uuid(Uuid),
    /// UUID[] parameter.
    UuidArray(Vec<Uuid>),
    /// TEXT[] parameter.
    TextArray(Vec<String>),
    /// REAL[] parameter.
    FloatArray(Vec<f32>),
    /// pgvector parameter.
    Vector(Vector),
    /// Nullable pgvector parameter.
    OptionalVector(Option<Vector>),
    /// JSONB parameter.
    Json(serde_json::Value),
}

/// Builds parameterized SQL with numbered placeholders.
///
/// Fragments are appended verbatim; values register a bind and return its
/// `$n` placeholder, so dynamically shaped predicates stay parameterized
/// end to end.
#[derive(Debug, Default)]
pub struct SqlBuilder {
    binds: Vec<BindValue>,
}

impl SqlBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a bind value and returns its `$n` placeholder.
    pub fn bind(&mut self, value: BindValue) -> String {
        self.binds.push(value);
        format!("${}", self.binds.len())
    }

    /// Consumes the builder, yielding the collected binds.
    #[must_use]
    pub fn into_binds(self) -> Vec<BindValue> {
        self.binds
    }
}

/// A compiled statement ready for execution.
#[derive(Debug)]
pub struct Statement {
    /// Short label for error messages, e.g. the retriever name.
    pub label: &'static str,
    /// The SQL text with `$n` placeholders.
    pub sql: String,
    /// Bind values in placeholder order.
    pub binds: Vec<BindValue>,
}

/// Applies collected binds to an untyped query in placeholder order.
pub fn apply_binds<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    binds: &'q [BindValue],
) -> Query<'q, Postgres, PgArguments> {
    for bind in binds {
        query = match bind {
            BindValue::Text(value) => query.bind(value.as_str()),
            BindValue::OptionalText(value) => query.bind(value.as_deref()),
            BindValue::Int(value) => query.bind(*value),
            BindValue::Float(value) => query.bind(*value),
            BindValue::Decimal(value) => query.bind(*value),
            BindValue::Uuid(value) => query.bind(*value),
            BindValue::UuidArray(value) => query.bind(value.as_slice()),
            BindValue::TextArray(value) => query.bind(value.as_slice()),
            BindValue::FloatArray(value) => query.bind(value.as_slice()),
            BindValue::Vector(value) => query.bind(value.clone()),
            BindValue::OptionalVector(value) => query.bind(value.clone()),
            BindValue::Json(value) => query.bind(value.clone()),
        };
    }
    query
}

/// Applies collected binds to a typed query in placeholder order.
pub fn apply_binds_as<'q, O>(
    mut query: QueryAs<'q, Postgres, O, PgArguments>,
    binds: &'q [BindValue],
) -> QueryAs<'q, Postgres, O, PgArguments> {
    for bind in binds {
        query = match bind {
            BindValue::Text(value) => query.bind(value.as_str()),
            BindValue::OptionalText(value) => query.bind(value.as_deref()),
            BindValue::Int(value) => query.bind(*value),
            BindValue::Float(value) => query.bind(*value),
            BindValue::Decimal(value) => query.bind(*value),
            BindValue::Uuid(value) => query.bind(*value),
            BindValue::UuidArray(value) => query.bind(value.as_slice()),
            BindValue::TextArray(value) => query.bind(value.as_slice()),
            BindValue::FloatArray(value) => query.bind(value.as_slice()),
            BindValue::Vector(value) => query.bind(value.clone()),
            BindValue::OptionalVector(value) => query.bind(value.clone()),
            BindValue::Json(value) => query.bind(value.clone()),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::{BindValue, SqlBuilder};

    #[test]
    fn placeholders_are_numbered_in_registration_order() {
        let mut builder = SqlBuilder::new();

        assert_eq!(builder.bind(BindValue::Text("a".to_owned())), "$1");
        assert_eq!(builder.bind(BindValue::Int(5)), "$2");
        assert_eq!(builder.into_binds().len(), 2);
    }
}
