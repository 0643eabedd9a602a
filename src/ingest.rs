//! Ingestion pipeline orchestration.
//!
//! Coordinates the flow for one uploaded document: chunking → embedding →
//! durable upsert, sequentially per chunk. There is no transactional
//! rollback: if a chunk fails, earlier chunks stay committed and the
//! failure reports the failing index and committed count (a documented
//! consistency weakness, not a hidden one).
//!
//! Re-ingesting a source overwrites records positionally (deterministic
//! ids), skips the embedding call for chunks whose content hash is
//! unchanged, and deletes the stale tail when the source shrank.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::chunk::chunk_text;
use crate::embedding::EmbeddingProvider;
use crate::error::{IngestFailure, RagError, Result};
use crate::models::{IngestReport, RecordMetadata, VectorRecord};
use crate::store::VectorStore;

/// Orchestrates chunk → embed → upsert for one source document.
///
/// Holds no cache of its own; all state lives in the store.
pub struct IngestPipeline {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    min_chunk_chars: usize,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        min_chunk_chars: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            min_chunk_chars,
        }
    }

    /// Ingest one document. On failure, chunks committed before the failing
    /// one remain in the store.
    pub async fn ingest(
        &self,
        source_id: &str,
        raw_text: &str,
    ) -> std::result::Result<IngestReport, IngestFailure> {
        let chunks: Vec<&str> = chunk_text(raw_text, self.min_chunk_chars).collect();

        let mut embedded = 0;
        let mut skipped_unchanged = 0;

        for (index, text) in chunks.iter().enumerate() {
            match self.ingest_chunk(source_id, index as i64, text).await {
                Ok(true) => embedded += 1,
                Ok(false) => skipped_unchanged += 1,
                Err(source) => {
                    return Err(IngestFailure {
                        chunk_index: index,
                        committed: index,
                        source,
                    })
                }
            }
        }

        // A shrinking re-upload must not leave stale tail chunks retrievable.
        // All chunks are committed at this point, so the failure carries the
        // chunk count in both fields and names the cleanup stage explicitly.
        if let Err(source) = self
            .store
            .delete_tail(source_id, chunks.len() as i64)
            .await
        {
            return Err(IngestFailure {
                chunk_index: chunks.len(),
                committed: chunks.len(),
                source: RagError::Persistence(format!(
                    "stale tail cleanup for '{source_id}' failed: {source}"
                )),
            });
        }

        tracing::info!(
            source_id,
            chunks = chunks.len(),
            embedded,
            skipped_unchanged,
            "ingested document"
        );

        Ok(IngestReport {
            chunks_processed: chunks.len(),
            embedded,
            skipped_unchanged,
        })
    }

    /// Returns `Ok(true)` when the chunk was embedded and written,
    /// `Ok(false)` when its stored hash matched and the embedding call was
    /// skipped.
    async fn ingest_chunk(&self, source_id: &str, sequence: i64, text: &str) -> Result<bool> {
        let id = VectorRecord::record_id(source_id, sequence);
        let hash = content_hash(text);

        if self.store.content_hash(&id).await?.as_deref() == Some(hash.as_str()) {
            return Ok(false);
        }

        // Provider call happens with no store resource held.
        let embedding = self.embedder.embed(text).await?;

        self.store
            .upsert(VectorRecord {
                id,
                embedding,
                document: text.to_string(),
                metadata: RecordMetadata {
                    source_id: source_id.to_string(),
                    sequence,
                },
                content_hash: hash,
                ingested_at: Utc::now(),
            })
            .await?;

        Ok(true)
    }
}

/// SHA-256 hex digest of a chunk's text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Decode uploaded bytes as UTF-8 document text.
pub fn decode_utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| RagError::Decode(e.to_string()))
}
