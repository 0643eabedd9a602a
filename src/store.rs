//! Vector store abstraction.
//!
//! The [`VectorStore`] trait defines the storage contract consumed by the
//! ingestion and query pipelines: upsert by deterministic id, exact
//! nearest-neighbor query, and a count. The contract deliberately exposes
//! only `{id, vector, metadata}` in and ranked records out, so an
//! approximate index could be substituted for the linear-scan backends
//! without touching callers.
//!
//! Two backends are provided:
//! - [`SqliteVectorStore`](crate::sqlite_store::SqliteVectorStore) — durable,
//!   the production backend.
//! - [`MemoryVectorStore`] — non-durable, for tests and embedding
//!   experiments.
//!
//! Distance metric: cosine distance `1 − cos(a, b)`, ascending (nearer
//! first). Ties are broken by record id ascending for determinism. A
//! zero-norm vector has similarity 0 against everything.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::error::{RagError, Result};
use crate::models::{ScoredRecord, VectorRecord};

/// Abstract storage backend for embedded chunks.
///
/// Implementations must make each `upsert` atomic at single-record
/// granularity: a concurrent `query` sees the old record or the new one,
/// never a torn write. Whole-store snapshot isolation is not required.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embedding dimensionality every stored and queried vector must match.
    fn dims(&self) -> usize;

    /// Insert or replace the record with the same id.
    ///
    /// The write is durable before this returns. Fails with
    /// [`RagError::DimensionMismatch`] when the vector length differs from
    /// [`dims`](VectorStore::dims).
    async fn upsert(&self, record: VectorRecord) -> Result<()>;

    /// Return up to `k` nearest records by cosine distance, ascending,
    /// ties broken by id ascending. An empty store yields an empty result,
    /// not an error.
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredRecord>>;

    /// Number of distinct record ids currently stored.
    async fn count(&self) -> Result<u64>;

    /// Stored content hash for a record id, if present. Lets ingestion skip
    /// re-embedding a chunk whose text has not changed.
    async fn content_hash(&self, id: &str) -> Result<Option<String>>;

    /// Delete records of `source_id` with sequence >= `from_sequence`,
    /// returning how many were removed. Used when a re-ingested source
    /// shrinks, so stale tail chunks do not stay retrievable.
    async fn delete_tail(&self, source_id: &str, from_sequence: i64) -> Result<u64>;

    /// Flush and release backing resources.
    async fn close(&self);
}

pub(crate) fn check_dims(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(RagError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty, zero-norm, or
/// mismatched-length inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Cosine distance: `1 − cos(a, b)`. Identical direction → 0.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Rank records against a query vector: distance ascending, id ascending on
/// ties, truncated to `k`. Shared by the linear-scan backends.
pub(crate) fn rank_records(
    records: impl Iterator<Item = VectorRecord>,
    query: &[f32],
    k: usize,
) -> Vec<ScoredRecord> {
    let mut scored: Vec<ScoredRecord> = records
        .map(|record| {
            let distance = cosine_distance(query, &record.embedding);
            ScoredRecord { record, distance }
        })
        .collect();

    scored.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    scored.truncate(k);
    scored
}

/// Non-durable in-memory vector store.
///
/// A `BTreeMap` keyed by record id behind an async `RwLock`: writers take
/// the lock only around the map mutation, readers scan a consistent view.
/// Exists to prove the [`VectorStore`] contract holds without SQLite and to
/// back orchestrator tests.
pub struct MemoryVectorStore {
    dims: usize,
    records: RwLock<BTreeMap<String, VectorRecord>>,
}

impl MemoryVectorStore {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            records: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, record: VectorRecord) -> Result<()> {
        check_dims(self.dims, record.embedding.len())?;
        self.records
            .write()
            .await
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredRecord>> {
        check_dims(self.dims, embedding.len())?;
        let records = self.records.read().await;
        Ok(rank_records(records.values().cloned(), embedding, k))
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.records.read().await.len() as u64)
    }

    async fn content_hash(&self, id: &str) -> Result<Option<String>> {
        Ok(self
            .records
            .read()
            .await
            .get(id)
            .map(|r| r.content_hash.clone()))
    }

    async fn delete_tail(&self, source_id: &str, from_sequence: i64) -> Result<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| {
            !(r.metadata.source_id == source_id && r.metadata.sequence >= from_sequence)
        });
        Ok((before - records.len()) as u64)
    }

    async fn close(&self) {}
}
