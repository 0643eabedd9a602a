//! Query pipeline orchestration.
//!
//! Coordinates one chat turn: retrieve → compose → generate. Provider
//! failures never escape as transport faults; they degrade into a readable
//! error answer with `context_used = false`, which callers cannot
//! distinguish from a legitimate answer except by content (a deliberate
//! simplification carried over from the upload/chat API contract).

use std::sync::Arc;

use crate::generation::GenerationProvider;
use crate::models::ChatOutcome;
use crate::prompt;
use crate::retrieve::Retriever;

/// Orchestrates retrieval-grounded answering of a user message.
pub struct QueryPipeline {
    retriever: Retriever,
    generator: Arc<dyn GenerationProvider>,
    top_k: usize,
}

impl QueryPipeline {
    pub fn new(retriever: Retriever, generator: Arc<dyn GenerationProvider>, top_k: usize) -> Self {
        Self {
            retriever,
            generator,
            top_k,
        }
    }

    /// Answer a user message, grounding it in retrieved chunks when any
    /// exist. Infallible by contract: failures become the answer text.
    pub async fn answer(&self, user_message: &str) -> ChatOutcome {
        let retrieved = match self.retriever.retrieve(user_message, self.top_k).await {
            Ok(retrieved) => retrieved,
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed, degrading to error answer");
                return ChatOutcome {
                    response: format!("Error: {e}"),
                    context_used: false,
                };
            }
        };

        let context_used = !retrieved.is_empty();
        let documents: Vec<String> = retrieved.into_iter().map(|c| c.document).collect();
        let instruction = prompt::compose(&documents);

        match self.generator.generate(&instruction, user_message).await {
            Ok(response) => ChatOutcome {
                response,
                context_used,
            },
            Err(e) => {
                tracing::warn!(error = %e, "generation failed, degrading to error answer");
                ChatOutcome {
                    response: format!("Error: {e}"),
                    context_used: false,
                }
            }
        }
    }
}
