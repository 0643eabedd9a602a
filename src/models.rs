//! Core data models for the ingestion and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Provenance of a stored chunk: which source document produced it and at
/// what position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordMetadata {
    /// Identifier of the source document (typically the uploaded filename).
    pub source_id: String,
    /// Zero-based position of the chunk within its source.
    pub sequence: i64,
}

/// A chunk embedded and stored for nearest-neighbor retrieval.
///
/// The `id` is derived deterministically from `source_id` and `sequence`
/// (see [`VectorRecord::record_id`]), so re-ingesting the same source
/// overwrites the record at that position instead of appending a duplicate.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    /// The chunk text itself, returned verbatim at retrieval time.
    pub document: String,
    pub metadata: RecordMetadata,
    /// SHA-256 of `document`, used to skip re-embedding unchanged chunks.
    pub content_hash: String,
    pub ingested_at: DateTime<Utc>,
}

impl VectorRecord {
    /// Deterministic record id for a chunk position within a source.
    pub fn record_id(source_id: &str, sequence: i64) -> String {
        format!("{source_id}_{sequence}")
    }
}

/// A record paired with its distance from a query vector (nearer = smaller).
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: VectorRecord,
    pub distance: f32,
}

/// Document/metadata projection handed to the prompt composer. Distances
/// stay retrieval-internal.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub document: String,
    pub metadata: RecordMetadata,
}

/// Outcome of a successful ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Meaningful chunks now present in the store for this source.
    pub chunks_processed: usize,
    /// Chunks that were embedded and written this run.
    pub embedded: usize,
    /// Chunks whose stored content hash matched, keeping their existing
    /// embedding without a provider call.
    pub skipped_unchanged: usize,
}

/// Outcome of a chat turn. Provider failures degrade into a readable
/// `response` with `context_used = false`; this type never carries a
/// transport-level fault.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub response: String,
    pub context_used: bool,
}
