//! Embedding provider abstraction and the Ollama implementation.
//!
//! The [`EmbeddingProvider`] trait is the narrow capability interface the
//! pipelines consume: `embed(text) -> vector`. Alternate providers plug in
//! without touching orchestration logic.
//!
//! # Retry Strategy
//!
//! [`OllamaEmbedder`] retries transient failures with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Every request carries the configured timeout, so a hung provider call
//! fails the operation instead of blocking it forever. Provider calls are
//! never made while holding a store resource.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

/// Capability interface for mapping text to a fixed-dimension vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality the provider is
    /// configured for.
    fn dims(&self) -> usize;

    /// Embed a single text span.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Cheap reachability check, used by `GET /health` and `grd status`.
    async fn healthy(&self) -> bool;
}

/// Embedding provider backed by a local Ollama instance.
///
/// Calls `POST {base_url}/api/embeddings` with the configured model.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::EmbeddingProvider(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = EmbeddingsRequest {
            model: &self.model,
            prompt: text,
        };

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.post(&url).json(&body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: EmbeddingsResponse = response
                            .json()
                            .await
                            .map_err(|e| RagError::EmbeddingProvider(e.to_string()))?;
                        // Drift here means the store and the provider no
                        // longer agree on the model — fatal, not transient.
                        if parsed.embedding.len() != self.dims {
                            return Err(RagError::DimensionMismatch {
                                expected: self.dims,
                                actual: parsed.embedding.len(),
                            });
                        }
                        return Ok(parsed.embedding);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(%status, attempt, "embedding call failed, retrying");
                        last_err = Some(RagError::EmbeddingProvider(format!(
                            "Ollama API error {status}: {body_text}"
                        )));
                        continue;
                    }

                    return Err(RagError::EmbeddingProvider(format!(
                        "Ollama API error {status}: {body_text}"
                    )));
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "embedding request error, retrying");
                    last_err = Some(RagError::EmbeddingProvider(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| RagError::EmbeddingProvider("failed after retries".to_string())))
    }

    async fn healthy(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
