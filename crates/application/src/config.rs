use searchlight_core::{AppError, AppResult};

/// Configuration for indexing and retrieval, passed explicitly at
/// construction.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Embedding model identifier sent to the embeddings endpoint.
    pub embedding_model: String,
    /// Dimension of stored embedding vectors.
    pub embedding_dimension: usize,
    /// Safety margin subtracted from the model context window when
    /// budgeting embedding batches, as a fraction (0.1 = 10%).
    pub embedding_safe_margin_percent: f64,
    /// Context window override for models the table does not know.
    pub embedding_fallback_max_tokens: Option<usize>,
    /// Hard cap on embedding batch size; only set for self-hosted
    /// endpoints with small request limits.
    pub embedding_max_batch_size: Option<usize>,
    /// Entities processed per indexing transaction.
    pub chunk_size: usize,
    /// Reciprocal rank fusion constant.
    pub rrf_k: u32,
    /// Average fuzzy score at which a match counts as perfect.
    pub perfect_match_threshold: f64,
    /// Row limit of the hybrid retriever's field candidate scan.
    pub field_candidates_limit: u32,
    /// Word-similarity threshold of the fuzzy retriever.
    pub fuzzy_similarity_threshold: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            embedding_model: "text-embedding-3-small".to_owned(),
            embedding_dimension: 1536,
            embedding_safe_margin_percent: 0.1,
            embedding_fallback_max_tokens: Some(512),
            embedding_max_batch_size: None,
            chunk_size: 1000,
            rrf_k: 60,
            perfect_match_threshold: 0.9,
            field_candidates_limit: 100,
            fuzzy_similarity_threshold: 0.3,
        }
    }
}

impl SearchConfig {
    /// Context window of the configured embedding model, falling back to
    /// the configured constant for unknown models.
    pub fn max_context_tokens(&self) -> AppResult<usize> {
        if let Some(known) = known_model_max_tokens(&self.embedding_model) {
            return Ok(known);
        }

        self.embedding_fallback_max_tokens.ok_or_else(|| {
            AppError::Validation(format!(
                "embedding model '{}' is not recognized and no fallback token limit is configured",
                self.embedding_model
            ))
        })
    }

    /// Token budget for one embedding batch: the context window minus the
    /// safety margin, never below one.
    pub fn token_budget(&self) -> AppResult<usize> {
        let max_context = self.max_context_tokens()?;
        let margin = (max_context as f64 * self.embedding_safe_margin_percent) as usize;
        Ok((max_context - margin).max(1))
    }
}

/// Context windows of the embedding models this engine is deployed with.
fn known_model_max_tokens(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-3-large" | "text-embedding-ada-002" => {
            Some(8191)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::SearchConfig;

    #[test]
    fn known_model_budget_applies_the_margin() {
        let config = SearchConfig::default();
        let budget = config.token_budget();

        assert!(budget.is_ok_and(|budget| budget == 8191 - 819));
    }

    #[test]
    fn unknown_model_uses_the_fallback() {
        let config = SearchConfig {
            embedding_model: "all-minilm-l6-v2".to_owned(),
            embedding_fallback_max_tokens: Some(512),
            ..SearchConfig::default()
        };

        assert!(config.max_context_tokens().is_ok_and(|max| max == 512));
    }

    #[test]
    fn unknown_model_without_fallback_is_refused() {
        let config = SearchConfig {
            embedding_model: "all-minilm-l6-v2".to_owned(),
            embedding_fallback_max_tokens: None,
            ..SearchConfig::default()
        };

        assert!(config.max_context_tokens().is_err());
    }
}
