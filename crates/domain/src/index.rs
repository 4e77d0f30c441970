use searchlight_core::{EntityType, ExtractedField, FieldKind, content_hash};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row of the flat search index.
///
/// Primary key is `(entity_id, path)`; the content hash enables differential
/// updates and the optional embedding powers semantic retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRow {
    /// Owning entity id.
    pub entity_id: Uuid,
    /// Kind of the owning entity.
    pub entity_type: EntityType,
    /// Display title of the owning entity.
    pub entity_title: Option<String>,
    /// Dotted label path of the field.
    pub path: String,
    /// Stringified field value.
    pub value: String,
    /// Stored kind of the value.
    pub value_type: FieldKind,
    /// SHA-256 over `path:value:value_type:title`.
    pub content_hash: String,
    /// Embedding of `path: value`, present only for embeddable values that
    /// were successfully embedded.
    pub embedding: Option<Vec<f32>>,
}

impl IndexRow {
    /// Builds a row from an extracted field, computing its content hash.
    #[must_use]
    pub fn from_field(
        entity_id: Uuid,
        entity_type: EntityType,
        entity_title: Option<&str>,
        field: &ExtractedField,
        embedding: Option<Vec<f32>>,
    ) -> Self {
        let content_hash = content_hash(&field.path, &field.value, field.value_type, entity_title);

        Self {
            entity_id,
            entity_type,
            entity_title: entity_title.map(str::to_owned),
            path: field.path.clone(),
            value: field.value.clone(),
            value_type: field.value_type,
            content_hash,
            embedding,
        }
    }

    /// Text submitted to the embedder for this row's field.
    #[must_use]
    pub fn embedding_text(field: &ExtractedField) -> String {
        format!("{}: {}", field.path, field.value)
    }
}

#[cfg(test)]
mod tests {
    use searchlight_core::{EntityType, ExtractedField, FieldKind, content_hash};
    use uuid::Uuid;

    use super::IndexRow;

    #[test]
    fn row_hash_matches_the_hash_function() {
        let field = ExtractedField::marker("subscription.status", "active", FieldKind::String);
        let row = IndexRow::from_field(
            Uuid::nil(),
            EntityType::Subscription,
            Some("Core subscription"),
            &field,
            None,
        );

        assert_eq!(
            row.content_hash,
            content_hash(
                "subscription.status",
                "active",
                FieldKind::String,
                Some("Core subscription"),
            )
        );
    }

    #[test]
    fn embedding_text_joins_path_and_value() {
        let field = ExtractedField::marker("subscription.note", "fast pancakes", FieldKind::String);
        assert_eq!(
            IndexRow::embedding_text(&field),
            "subscription.note: fast pancakes"
        );
    }
}
