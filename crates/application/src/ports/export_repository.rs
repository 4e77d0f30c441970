use async_trait::async_trait;
use searchlight_core::{AppResult, EntityType};
use serde_json::{Map, Value};

/// Port fetching flattened entity data for exports.
///
/// Each entity type flattens to its own shape: subscriptions join their
/// product, workflows summarize their products, processes carry their
/// workflow reference.
#[async_trait]
pub trait ExportRepository: Send + Sync {
    /// Fetches export rows for the given entity ids, one flat JSON object
    /// per entity.
    async fn export_rows(
        &self,
        entity_type: EntityType,
        entity_ids: &[String],
    ) -> AppResult<Vec<Map<String, Value>>>;
}
