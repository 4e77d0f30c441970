use std::time::Duration;

use async_trait::async_trait;
use searchlight_application::Embedder;
use searchlight_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Configuration of the OpenAI-compatible embeddings client.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedderConfig {
    /// Base URL of the embeddings API, without the `/embeddings` suffix.
    pub base_url: String,
    /// Bearer token; self-hosted endpoints may not need one.
    pub api_key: Option<String>,
    /// Embedding model identifier.
    pub model: String,
    /// Attempts per request, transient failures included.
    pub max_attempts: u8,
    /// Base backoff between attempts, multiplied by the attempt number.
    pub retry_backoff_ms: u64,
}

impl Default for OpenAiEmbedderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_owned(),
            api_key: None,
            model: "text-embedding-3-small".to_owned(),
            max_attempts: 3,
            retry_backoff_ms: 250,
        }
    }
}

/// Embeddings client for any OpenAI-compatible endpoint.
///
/// Batch failures degrade to empty vectors so indexing keeps going; the
/// indexer stores such fields without an embedding.
pub struct OpenAiEmbedder {
    http_client: reqwest::Client,
    config: OpenAiEmbedderConfig,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    /// Creates an embedder with the provided HTTP client and config.
    #[must_use]
    pub fn new(http_client: reqwest::Client, config: OpenAiEmbedderConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    async fn request_embeddings(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0_u8;
        let mut last_error: Option<String> = None;

        while attempt < max_attempts {
            attempt = attempt.saturating_add(1);

            let mut request = self.http_client.post(&url).json(&EmbeddingRequest {
                model: &self.config.model,
                input: texts,
            });
            if let Some(api_key) = &self.config.api_key {
                request = request.bearer_auth(api_key);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    let parsed: EmbeddingResponse = response.json().await.map_err(|error| {
                        AppError::Internal(format!(
                            "embeddings endpoint returned an unreadable body: {error}"
                        ))
                    })?;
                    return Ok(order_embeddings(parsed, texts.len()));
                }
                Ok(response)
                    if response.status().is_server_error()
                        || response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS =>
                {
                    last_error = Some(format!(
                        "transient HTTP status {} from embeddings endpoint",
                        response.status()
                    ));
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<response body unavailable>".to_owned());
                    return Err(AppError::Internal(format!(
                        "embeddings request failed with status {status}: {body}"
                    )));
                }
                Err(error) => {
                    last_error = Some(format!("embeddings transport error: {error}"));
                }
            }

            if attempt < max_attempts {
                let delay = self.config.retry_backoff_ms.saturating_mul(u64::from(attempt));
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(AppError::Internal(last_error.unwrap_or_else(|| {
            "embeddings request exhausted retries".to_owned()
        })))
    }
}

/// Reorders response vectors by their index, padding gaps with empties.
fn order_embeddings(response: EmbeddingResponse, expected: usize) -> Vec<Vec<f32>> {
    let mut vectors = vec![Vec::new(); expected];
    for data in response.data {
        if let Some(slot) = vectors.get_mut(data.index) {
            *slot = data.embedding;
        }
    }
    vectors
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[String], dry_run: bool) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if dry_run {
            info!(batch = texts.len(), "dry run: skipping embeddings request");
            return Ok(vec![Vec::new(); texts.len()]);
        }

        match self.request_embeddings(texts).await {
            Ok(vectors) => Ok(vectors),
            Err(request_error) => {
                error!(%request_error, batch = texts.len(), "batch embedding failed; returning empty vectors");
                Ok(vec![Vec::new(); texts.len()])
            }
        }
    }

    async fn embed_text(&self, text: &str) -> AppResult<Vec<f32>> {
        let normalized = vec![text.to_lowercase()];
        match self.request_embeddings(&normalized).await {
            Ok(mut vectors) => Ok(vectors.pop().unwrap_or_default()),
            Err(request_error) => {
                error!(%request_error, "query embedding failed");
                Ok(Vec::new())
            }
        }
    }
}
