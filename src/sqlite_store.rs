//! Durable SQLite-backed vector store.
//!
//! Records live in a single `records` table with the embedding stored as a
//! little-endian f32 BLOB. Queries are an exact linear scan with cosine
//! distance computed in Rust (O(N·D) per query); the [`VectorStore`] trait
//! keeps callers agnostic so an approximate index could replace this later.
//!
//! The store's dimensionality is pinned in `store_meta` when the database
//! is first created. Re-opening with a different configured `dims` fails
//! with [`RagError::DimensionMismatch`] — drift means the embedding
//! provider was swapped incompatibly, a configuration error rather than a
//! per-record one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::db;
use crate::error::{RagError, Result};
use crate::models::{RecordMetadata, ScoredRecord, VectorRecord};
use crate::store::{blob_to_vec, check_dims, rank_records, vec_to_blob, VectorStore};

#[derive(Debug)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
    dims: usize,
}

impl SqliteVectorStore {
    /// Open the store at `path`, creating the schema if missing, with the
    /// given embedding dimensionality.
    pub async fn open(path: &Path, dims: usize) -> Result<Self> {
        let pool = db::connect(path).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                document TEXT NOT NULL,
                embedding BLOB NOT NULL,
                content_hash TEXT NOT NULL,
                ingested_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_source ON records(source_id)")
            .execute(&pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        let stored: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = 'dims'")
                .fetch_optional(&pool)
                .await?;

        match stored.and_then(|s| s.parse::<usize>().ok()) {
            Some(existing) if existing != dims => {
                pool.close().await;
                return Err(RagError::DimensionMismatch {
                    expected: existing,
                    actual: dims,
                });
            }
            Some(_) => {}
            None => {
                sqlx::query("INSERT OR REPLACE INTO store_meta (key, value) VALUES ('dims', ?)")
                    .bind(dims.to_string())
                    .execute(&pool)
                    .await?;
            }
        }

        Ok(Self { pool, dims })
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, record: VectorRecord) -> Result<()> {
        check_dims(self.dims, record.embedding.len())?;

        let blob = vec_to_blob(&record.embedding);
        sqlx::query(
            r#"
            INSERT INTO records (id, source_id, seq, document, embedding, content_hash, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source_id = excluded.source_id,
                seq = excluded.seq,
                document = excluded.document,
                embedding = excluded.embedding,
                content_hash = excluded.content_hash,
                ingested_at = excluded.ingested_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.metadata.source_id)
        .bind(record.metadata.sequence)
        .bind(&record.document)
        .bind(&blob)
        .bind(&record.content_hash)
        .bind(record.ingested_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredRecord>> {
        check_dims(self.dims, embedding.len())?;

        let rows = sqlx::query(
            "SELECT id, source_id, seq, document, embedding, content_hash, ingested_at FROM records",
        )
        .fetch_all(&self.pool)
        .await?;

        let dims = self.dims;
        let records = rows.iter().filter_map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob);
            if vector.len() != dims {
                // Upsert enforces dims, so this row predates a schema repair
                // or is corrupt. Skip it rather than poison the ranking.
                tracing::warn!(id = %row.get::<String, _>("id"), "skipping record with malformed embedding blob");
                return None;
            }
            let ts: i64 = row.get("ingested_at");
            Some(VectorRecord {
                id: row.get("id"),
                embedding: vector,
                document: row.get("document"),
                metadata: RecordMetadata {
                    source_id: row.get("source_id"),
                    sequence: row.get("seq"),
                },
                content_hash: row.get("content_hash"),
                ingested_at: DateTime::<Utc>::from_timestamp(ts, 0).unwrap_or_default(),
            })
        });

        Ok(rank_records(records, embedding, k))
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn content_hash(&self, id: &str) -> Result<Option<String>> {
        let hash: Option<String> =
            sqlx::query_scalar("SELECT content_hash FROM records WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(hash)
    }

    async fn delete_tail(&self, source_id: &str, from_sequence: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM records WHERE source_id = ? AND seq >= ?")
            .bind(source_id)
            .bind(from_sequence)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
