use async_trait::async_trait;
use searchlight_core::AppResult;

/// Port for text-to-vector embedding.
///
/// Implementations are idempotent and order-preserving. Per-text failures
/// surface as empty vectors rather than errors so a bulk indexing run is
/// never halted by one bad field; a batch-level failure yields an empty
/// vector for every text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a batch of texts, returning one vector per input in order.
    ///
    /// With `dry_run` set, no API call is made and every text maps to an
    /// empty vector.
    async fn embed_batch(&self, texts: &[String], dry_run: bool) -> AppResult<Vec<Vec<f32>>>;

    /// Embeds a single query text, lowercased before submission.
    /// Returns an empty vector when the call fails.
    async fn embed_text(&self, text: &str) -> AppResult<Vec<f32>>;
}
