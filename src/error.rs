//! Error taxonomy for the ingestion and retrieval pipelines.
//!
//! Every failure the core can produce maps to one [`RagError`] variant, so
//! callers can tell a misconfigured deployment ([`RagError::DimensionMismatch`])
//! apart from a flaky external provider. Stringly-typed fallbacks exist only
//! at the outermost HTTP/CLI boundary.

use thiserror::Error;

/// Errors produced by the core pipeline components.
#[derive(Debug, Error)]
pub enum RagError {
    /// An uploaded document was not valid UTF-8 text.
    #[error("invalid UTF-8 text: {0}")]
    Decode(String),

    /// A vector's length does not match the store's configured dimensionality.
    ///
    /// This is a fatal configuration error — it means the embedding provider
    /// was swapped incompatibly — and halts the affected operation rather
    /// than silently truncating or padding.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality the store was created with.
        expected: usize,
        /// Dimensionality actually observed.
        actual: usize,
    },

    /// The embedding provider call failed or timed out after retries.
    #[error("embedding provider: {0}")]
    EmbeddingProvider(String),

    /// The generation provider call failed or timed out after retries.
    #[error("generation provider: {0}")]
    GenerationProvider(String),

    /// A durable write or read against the vector store failed.
    #[error("persistence: {0}")]
    Persistence(String),
}

impl From<sqlx::Error> for RagError {
    fn from(e: sqlx::Error) -> Self {
        RagError::Persistence(e.to_string())
    }
}

/// Convenience result alias for core operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// Ingestion aborted partway through a document.
///
/// Chunks already upserted before the failing one remain committed — there
/// is no transactional rollback — so the failure names both the chunk index
/// that failed and how many preceding chunks are already retrievable.
#[derive(Debug, Error)]
#[error("ingestion aborted at chunk {chunk_index} ({committed} chunk(s) already committed): {source}")]
pub struct IngestFailure {
    /// Zero-based index of the chunk that failed.
    ///
    /// When every chunk committed and the failure happened while removing
    /// stale tail records from a previous, longer upload, this equals the
    /// chunk count (one past the last chunk) and matches `committed`.
    pub chunk_index: usize,
    /// Number of chunks committed to the store before the failure.
    pub committed: usize,
    /// The underlying error.
    #[source]
    pub source: RagError,
}
