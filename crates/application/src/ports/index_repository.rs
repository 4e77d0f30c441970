use std::collections::HashMap;

use async_trait::async_trait;
use searchlight_core::AppResult;
use searchlight_domain::IndexRow;
use uuid::Uuid;

/// Port for the flat index table; the indexer is its sole writer.
#[async_trait]
pub trait IndexRepository: Send + Sync {
    /// Fetches the stored `path -> content_hash` map for each entity in
    /// one query. Entities without rows are absent from the result.
    async fn existing_hashes(
        &self,
        entity_ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, HashMap<String, String>>>;

    /// Applies one chunk's changes atomically: deletes the stale
    /// `(entity_id, path)` pairs (sub-batched internally against statement
    /// depth limits) and executes one upsert per batch with
    /// last-writer-wins semantics on `(entity_id, path)`.
    async fn apply_chunk(
        &self,
        stale_paths: &[(Uuid, String)],
        upsert_batches: &[Vec<IndexRow>],
    ) -> AppResult<()>;
}
