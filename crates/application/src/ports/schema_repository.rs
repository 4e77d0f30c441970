use std::collections::BTreeMap;

use async_trait::async_trait;
use searchlight_core::{AppResult, FieldKind};

/// Port answering schema questions about indexed paths.
#[async_trait]
pub trait FilterSchemaRepository: Send + Sync {
    /// Stored kind of the given path, or `None` when no row carries it.
    async fn field_kind(&self, path: &str) -> AppResult<Option<FieldKind>>;

    /// All distinct filterable paths with their stored kinds.
    async fn filterable_paths(&self) -> AppResult<BTreeMap<String, FieldKind>>;

    /// Whether a pattern is syntactically valid lquery, checked by
    /// dry-casting inside a savepoint.
    async fn lquery_is_valid(&self, pattern: &str) -> AppResult<bool>;
}
