use searchlight_core::AppResult;

/// Port for counting tokens the way the embedding model does.
///
/// Counting is CPU-bound and stays synchronous.
pub trait Tokenizer: Send + Sync {
    /// Number of tokens the embedding model sees for `text`.
    fn count_tokens(&self, text: &str) -> AppResult<usize>;
}
