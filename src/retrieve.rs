//! Retrieval: query embedding plus nearest-neighbor lookup.

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::models::RetrievedChunk;
use crate::store::VectorStore;

/// Embeds a query and asks the vector store for the nearest chunks.
///
/// Returns only the document/metadata projection — distances stay internal
/// to retrieval. An empty store yields an empty result, which is a valid
/// outcome, not an error.
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// Retrieve up to `k` chunks nearest to `query_text`.
    pub async fn retrieve(&self, query_text: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        // Provider call first, with no store resource held.
        let query_vec = self.embedder.embed(query_text).await?;
        let scored = self.store.query(&query_vec, k).await?;

        Ok(scored
            .into_iter()
            .map(|s| RetrievedChunk {
                document: s.record.document,
                metadata: s.record.metadata,
            })
            .collect())
    }
}
