use std::fmt::{Display, Formatter};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of domain entity held in the search index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    /// A customer subscription instance.
    Subscription,
    /// A product definition with its block schema.
    Product,
    /// A workflow definition.
    Workflow,
    /// A workflow execution (process) record.
    Process,
}

impl EntityType {
    /// Returns the stable storage value used in the index table.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscription => "SUBSCRIPTION",
            Self::Product => "PRODUCT",
            Self::Workflow => "WORKFLOW",
            Self::Process => "PROCESS",
        }
    }

    /// Returns the lowercase root label all paths of this entity start with.
    #[must_use]
    pub fn root_label(&self) -> &'static str {
        match self {
            Self::Subscription => "subscription",
            Self::Product => "product",
            Self::Workflow => "workflow",
            Self::Process => "process",
        }
    }

    /// Parses a stored entity type value.
    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "SUBSCRIPTION" => Ok(Self::Subscription),
            "PRODUCT" => Ok(Self::Product),
            "WORKFLOW" => Ok(Self::Workflow),
            "PROCESS" => Ok(Self::Process),
            other => Err(format!("unknown entity type '{other}'")),
        }
    }
}

impl Display for EntityType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.as_str())
    }
}

/// Stored kind of an indexed field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free-form text.
    String,
    /// Whole number.
    Integer,
    /// Floating point number.
    Float,
    /// Boolean flag.
    Boolean,
    /// Date or timestamp.
    Datetime,
    /// UUID value.
    Uuid,
    /// Structural marker for a nested sub-object.
    Block,
    /// Leaf marker for a product schema attribute.
    ResourceType,
}

impl FieldKind {
    /// Returns the stable storage value for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Datetime => "datetime",
            Self::Uuid => "uuid",
            Self::Block => "block",
            Self::ResourceType => "resource_type",
        }
    }

    /// Parses a stored field kind value.
    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "float" => Ok(Self::Float),
            "boolean" => Ok(Self::Boolean),
            "datetime" => Ok(Self::Datetime),
            "uuid" => Ok(Self::Uuid),
            "block" => Ok(Self::Block),
            "resource_type" => Ok(Self::ResourceType),
            other => Err(format!("unknown field kind '{other}'")),
        }
    }

    /// Returns the SQL type the stored text value casts to for comparisons.
    #[must_use]
    pub fn sql_cast(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Float => "DOUBLE PRECISION",
            Self::Boolean => "BOOLEAN",
            Self::Datetime => "TIMESTAMPTZ",
            Self::Uuid => "UUID",
            Self::String | Self::Block | Self::ResourceType => "TEXT",
        }
    }

    /// Infers the kind of a JSON value, sniffing string contents.
    #[must_use]
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => Self::Boolean,
            Value::Number(number) => {
                if number.is_i64() || number.is_u64() {
                    Self::Integer
                } else {
                    Self::Float
                }
            }
            Value::String(text) => Self::infer_from_str(text),
            _ => Self::String,
        }
    }

    fn infer_from_str(text: &str) -> Self {
        if is_uuid_string(text) {
            Self::Uuid
        } else if is_iso_datetime_string(text) {
            Self::Datetime
        } else if is_bool_string(text) {
            Self::Boolean
        } else if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
            Self::Integer
        } else if text.parse::<f64>().is_ok() {
            Self::Float
        } else {
            Self::String
        }
    }

    /// Whether a value of this kind should receive an embedding.
    ///
    /// Only non-trivial string values are embedded; identifiers, timestamps
    /// and structural markers are semantic noise.
    #[must_use]
    pub fn is_embeddable(&self, value: &str) -> bool {
        *self == Self::String && value.trim().len() > 1
    }
}

impl Display for FieldKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.as_str())
    }
}

/// Value kind presented to query clients for a filterable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiType {
    /// Text input.
    String,
    /// Numeric input.
    Number,
    /// Boolean toggle.
    Boolean,
    /// Date/time picker.
    Datetime,
    /// Structural component, not directly filterable by value.
    Component,
}

impl UiType {
    /// Maps a stored field kind to the client-facing value kind.
    #[must_use]
    pub fn from_field_kind(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Integer | FieldKind::Float => Self::Number,
            FieldKind::Boolean => Self::Boolean,
            FieldKind::Datetime => Self::Datetime,
            FieldKind::Block | FieldKind::ResourceType => Self::Component,
            FieldKind::String | FieldKind::Uuid => Self::String,
        }
    }
}

/// One field produced by traversing a domain entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedField {
    /// Dotted label path addressing the field.
    pub path: String,
    /// Stringified field value.
    pub value: String,
    /// Inferred kind of the value.
    pub value_type: FieldKind,
}

impl ExtractedField {
    /// Creates a field from a scalar JSON value, inferring its kind.
    #[must_use]
    pub fn from_value(path: impl Into<String>, value: &Value) -> Self {
        let value_type = FieldKind::infer(value);
        let value = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };

        Self {
            path: path.into(),
            value,
            value_type,
        }
    }

    /// Creates a structural or leaf marker field.
    #[must_use]
    pub fn marker(path: impl Into<String>, value: impl Into<String>, value_type: FieldKind) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
            value_type,
        }
    }

    /// Number of segments in the field's path.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.path.split('.').count()
    }
}

/// Checks whether a string is a valid UUID.
#[must_use]
pub fn is_uuid_string(value: &str) -> bool {
    Uuid::parse_str(value).is_ok()
}

/// Checks whether a string is an ISO 8601 date or datetime.
#[must_use]
pub fn is_iso_datetime_string(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
        || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").is_ok()
}

/// Checks whether a string explicitly spells a boolean value.
#[must_use]
pub fn is_bool_string(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "false")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{EntityType, ExtractedField, FieldKind, UiType};

    #[test]
    fn infers_scalar_kinds() {
        assert_eq!(FieldKind::infer(&json!(true)), FieldKind::Boolean);
        assert_eq!(FieldKind::infer(&json!(42)), FieldKind::Integer);
        assert_eq!(FieldKind::infer(&json!(2.5)), FieldKind::Float);
        assert_eq!(FieldKind::infer(&json!("plain text")), FieldKind::String);
    }

    #[test]
    fn sniffs_string_contents() {
        assert_eq!(
            FieldKind::infer(&json!("c0ffee00-0000-4000-8000-000000000001")),
            FieldKind::Uuid
        );
        assert_eq!(FieldKind::infer(&json!("2025-06-01")), FieldKind::Datetime);
        assert_eq!(FieldKind::infer(&json!("false")), FieldKind::Boolean);
        assert_eq!(FieldKind::infer(&json!("1234")), FieldKind::Integer);
        assert_eq!(FieldKind::infer(&json!("12.5")), FieldKind::Float);
    }

    #[test]
    fn only_nontrivial_strings_are_embeddable() {
        assert!(FieldKind::String.is_embeddable("core link"));
        assert!(!FieldKind::String.is_embeddable(" "));
        assert!(!FieldKind::Uuid.is_embeddable("c0ffee00-0000-4000-8000-000000000001"));
        assert!(!FieldKind::Block.is_embeddable("port_block"));
    }

    #[test]
    fn extracted_field_keeps_raw_string_value() {
        let field = ExtractedField::from_value("subscription.status", &json!("active"));

        assert_eq!(field.value, "active");
        assert_eq!(field.value_type, FieldKind::String);
        assert_eq!(field.segment_count(), 2);
    }

    #[test]
    fn entity_type_round_trips_storage_value() {
        for entity_type in [
            EntityType::Subscription,
            EntityType::Product,
            EntityType::Workflow,
            EntityType::Process,
        ] {
            assert_eq!(EntityType::parse(entity_type.as_str()), Ok(entity_type));
        }
    }

    #[test]
    fn ui_type_groups_numeric_kinds() {
        assert_eq!(UiType::from_field_kind(FieldKind::Integer), UiType::Number);
        assert_eq!(UiType::from_field_kind(FieldKind::Float), UiType::Number);
        assert_eq!(UiType::from_field_kind(FieldKind::Block), UiType::Component);
    }
}
