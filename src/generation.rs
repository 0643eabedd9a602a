//! Generation provider abstraction and the Ollama implementation.
//!
//! The [`GenerationProvider`] trait is the second narrow capability
//! interface: `generate(system_prompt, user_message) -> text`. The query
//! orchestrator composes the grounding instruction and hands it here; what
//! model produces the answer is not its concern.
//!
//! The retry discipline matches the embedding provider: bounded attempts
//! with exponential backoff on 429/5xx/network errors, explicit request
//! timeout, immediate failure on other client errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::{RagError, Result};

/// Capability interface for producing a natural-language answer.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"llama3.2:3b"`).
    fn model_name(&self) -> &str;

    /// Generate an answer conditioned on the system-level instruction.
    async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String>;

    /// Cheap reachability check, used by `GET /health` and `grd status`.
    async fn healthy(&self) -> bool;
}

/// Generation provider backed by a local Ollama instance.
///
/// Calls `POST {base_url}/api/chat` with a system + user message pair and
/// streaming disabled.
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::GenerationProvider(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
            stream: false,
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
                        let parsed: ChatResponse = response
                            .json()
                            .await
                            .map_err(|e| RagError::GenerationProvider(e.to_string()))?;
                        return Ok(parsed.message.content);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(%status, attempt, "generation call failed, retrying");
                        last_err = Some(RagError::GenerationProvider(format!(
                            "Ollama API error {status}: {body_text}"
                        )));
                        continue;
                    }

                    return Err(RagError::GenerationProvider(format!(
                        "Ollama API error {status}: {body_text}"
                    )));
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "generation request error, retrying");
                    last_err = Some(RagError::GenerationProvider(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| RagError::GenerationProvider("failed after retries".to_string())))
    }

    async fn healthy(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
