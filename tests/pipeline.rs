//! In-process integration tests for the ingestion and query pipelines.
//!
//! Providers are stubbed through the provider traits (the real ones need a
//! live Ollama instance); the store is the real SQLite backend in a
//! temporary directory unless a test targets the in-memory backend
//! directly.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;

use grounded::answer::QueryPipeline;
use grounded::embedding::EmbeddingProvider;
use grounded::error::{RagError, Result};
use grounded::generation::GenerationProvider;
use grounded::ingest::{content_hash, IngestPipeline};
use grounded::models::{RecordMetadata, ScoredRecord, VectorRecord};
use grounded::prompt;
use grounded::retrieve::Retriever;
use grounded::sqlite_store::SqliteVectorStore;
use grounded::store::{MemoryVectorStore, VectorStore};

// ============ Stub providers ============

/// Fixed vocabulary so bag-of-words embeddings are collision-free and the
/// nearest-neighbor ordering in these tests is exact.
const VOCAB: &[&str] = &[
    "paris", "berlin", "france", "germany", "capital", "what", "is", "the", "of",
];

fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; VOCAB.len()];
    let lowered = text.to_lowercase();
    for word in lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if let Some(i) = VOCAB.iter().position(|&w| w == word) {
            v[i] += 1.0;
        }
    }
    v
}

/// Deterministic embedder: vocabulary term counts.
struct BagEmbedder;

#[async_trait]
impl EmbeddingProvider for BagEmbedder {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }
    fn dims(&self) -> usize {
        VOCAB.len()
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(bag_of_words(text))
    }
    async fn healthy(&self) -> bool {
        true
    }
}

/// Embedder that succeeds for the first `allow` calls, then fails.
struct FailAfterEmbedder {
    allow: usize,
    calls: AtomicUsize,
    dims: usize,
}

#[async_trait]
impl EmbeddingProvider for FailAfterEmbedder {
    fn model_name(&self) -> &str {
        "fail-after"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.allow {
            return Err(RagError::EmbeddingProvider("provider unreachable".into()));
        }
        let mut v = vec![0.0f32; self.dims];
        v[call % self.dims] = 1.0;
        Ok(v)
    }
    async fn healthy(&self) -> bool {
        false
    }
}

/// Generator that echoes the system prompt, so tests can assert what
/// context the composed instruction carried.
struct EchoGenerator;

#[async_trait]
impl GenerationProvider for EchoGenerator {
    fn model_name(&self) -> &str {
        "echo"
    }
    async fn generate(&self, system_prompt: &str, _user_message: &str) -> Result<String> {
        Ok(system_prompt.to_string())
    }
    async fn healthy(&self) -> bool {
        true
    }
}

/// Store whose reads and writes succeed but whose tail cleanup fails,
/// exercising the post-commit failure path of ingestion.
struct BrokenTailStore(MemoryVectorStore);

#[async_trait]
impl VectorStore for BrokenTailStore {
    fn dims(&self) -> usize {
        self.0.dims()
    }
    async fn upsert(&self, record: VectorRecord) -> Result<()> {
        self.0.upsert(record).await
    }
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredRecord>> {
        self.0.query(embedding, k).await
    }
    async fn count(&self) -> Result<u64> {
        self.0.count().await
    }
    async fn content_hash(&self, id: &str) -> Result<Option<String>> {
        self.0.content_hash(id).await
    }
    async fn delete_tail(&self, _source_id: &str, _from_sequence: i64) -> Result<u64> {
        Err(RagError::Persistence("disk I/O error".into()))
    }
    async fn close(&self) {}
}

struct FailingGenerator;

#[async_trait]
impl GenerationProvider for FailingGenerator {
    fn model_name(&self) -> &str {
        "failing"
    }
    async fn generate(&self, _system_prompt: &str, _user_message: &str) -> Result<String> {
        Err(RagError::GenerationProvider("model not loaded".into()))
    }
    async fn healthy(&self) -> bool {
        false
    }
}

// ============ Helpers ============

const PARIS_BERLIN: &str =
    "Paris is the capital of France.\n\nBerlin is the capital of Germany.";

fn store_path(tmp: &TempDir) -> PathBuf {
    tmp.path().join("data").join("grd.sqlite")
}

async fn open_store(tmp: &TempDir, dims: usize) -> Arc<dyn VectorStore> {
    Arc::new(
        SqliteVectorStore::open(&store_path(tmp), dims)
            .await
            .unwrap(),
    )
}

fn record(id: &str, source_id: &str, sequence: i64, embedding: Vec<f32>) -> VectorRecord {
    VectorRecord {
        id: id.to_string(),
        embedding,
        document: format!("document {id}"),
        metadata: RecordMetadata {
            source_id: source_id.to_string(),
            sequence,
        },
        content_hash: content_hash(id),
        ingested_at: Utc::now(),
    }
}

// ============ Ingestion ============

#[tokio::test]
async fn test_ingest_stores_meaningful_chunks() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, VOCAB.len()).await;
    let pipeline = IngestPipeline::new(store.clone(), Arc::new(BagEmbedder), 10);

    let report = pipeline.ingest("doc1", PARIS_BERLIN).await.unwrap();
    assert_eq!(report.chunks_processed, 2);
    assert_eq!(report.embedded, 2);
    assert_eq!(report.skipped_unchanged, 0);
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_reingest_same_content_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, VOCAB.len()).await;
    let pipeline = IngestPipeline::new(store.clone(), Arc::new(BagEmbedder), 10);

    pipeline.ingest("doc1", PARIS_BERLIN).await.unwrap();
    let query = bag_of_words("What is the capital of France?");
    let before = store.query(&query, 3).await.unwrap();

    let report = pipeline.ingest("doc1", PARIS_BERLIN).await.unwrap();
    assert_eq!(report.chunks_processed, 2);
    assert_eq!(report.embedded, 0);
    assert_eq!(report.skipped_unchanged, 2);

    assert_eq!(store.count().await.unwrap(), 2);
    let after = store.query(&query, 3).await.unwrap();
    let ids = |rs: &[grounded::models::ScoredRecord]| {
        rs.iter().map(|r| r.record.id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&before), ids(&after));
}

#[tokio::test]
async fn test_ingest_abort_reports_failing_chunk_and_committed_count() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, 3).await;
    let embedder = Arc::new(FailAfterEmbedder {
        allow: 2,
        calls: AtomicUsize::new(0),
        dims: 3,
    });
    let pipeline = IngestPipeline::new(store.clone(), embedder, 10);

    let text = "The first paragraph is long enough.\n\n\
                The second paragraph is long enough.\n\n\
                The third paragraph is long enough.";
    let failure = pipeline.ingest("doc1", text).await.unwrap_err();

    assert_eq!(failure.chunk_index, 2);
    assert_eq!(failure.committed, 2);
    assert!(matches!(failure.source, RagError::EmbeddingProvider(_)));
    // The two committed chunks stay committed.
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_tail_cleanup_failure_reports_all_chunks_committed() {
    let store = Arc::new(BrokenTailStore(MemoryVectorStore::new(VOCAB.len())));
    let pipeline = IngestPipeline::new(store.clone(), Arc::new(BagEmbedder), 10);

    let failure = pipeline.ingest("doc1", PARIS_BERLIN).await.unwrap_err();

    // All chunks committed; the failure came from the cleanup stage, so the
    // index sits one past the last chunk and equals the committed count.
    assert_eq!(failure.chunk_index, 2);
    assert_eq!(failure.committed, 2);
    assert!(matches!(failure.source, RagError::Persistence(_)));
    assert!(failure.source.to_string().contains("stale tail cleanup"));
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_shrinking_source_deletes_stale_tail() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, VOCAB.len()).await;
    let pipeline = IngestPipeline::new(store.clone(), Arc::new(BagEmbedder), 10);

    pipeline.ingest("doc1", PARIS_BERLIN).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 2);

    pipeline
        .ingest("doc1", "Paris is the capital of France.")
        .await
        .unwrap();
    assert_eq!(store.count().await.unwrap(), 1);

    let results = store
        .query(&bag_of_words("capital of Germany?"), 3)
        .await
        .unwrap();
    assert!(results
        .iter()
        .all(|r| !r.record.document.contains("Berlin")));
}

#[tokio::test]
async fn test_different_sources_do_not_collide() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, VOCAB.len()).await;
    let pipeline = IngestPipeline::new(store.clone(), Arc::new(BagEmbedder), 10);

    pipeline
        .ingest("a.txt", "Paris is the capital of France.")
        .await
        .unwrap();
    pipeline
        .ingest("b.txt", "Berlin is the capital of Germany.")
        .await
        .unwrap();
    assert_eq!(store.count().await.unwrap(), 2);
}

// ============ Store invariants ============

#[tokio::test]
async fn test_dimension_mismatch_on_upsert_and_query() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, 4).await;

    let err = store
        .upsert(record("doc1_0", "doc1", 0, vec![1.0, 0.0]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RagError::DimensionMismatch {
            expected: 4,
            actual: 2
        }
    ));

    let err = store.query(&[1.0, 0.0, 0.0], 1).await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { .. }));

    // Nothing was silently truncated or padded.
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_ranking_nearest_first_under_cosine() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, 2).await;

    store
        .upsert(record("a", "doc1", 0, vec![1.0, 0.0]))
        .await
        .unwrap();
    store
        .upsert(record("b", "doc1", 1, vec![0.0, 1.0]))
        .await
        .unwrap();
    store
        .upsert(record("c", "doc1", 2, vec![0.9, 0.1]))
        .await
        .unwrap();

    let results = store.query(&[1.0, 0.0], 2).await.unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.record.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);
    assert!(results[0].distance <= results[1].distance);
}

#[tokio::test]
async fn test_query_empty_store_returns_empty() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, 2).await;
    let results = store.query(&[1.0, 0.0], 5).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    {
        let store = open_store(&tmp, VOCAB.len()).await;
        let pipeline = IngestPipeline::new(store.clone(), Arc::new(BagEmbedder), 10);
        pipeline.ingest("doc1", PARIS_BERLIN).await.unwrap();
        store.close().await;
    }

    let store = open_store(&tmp, VOCAB.len()).await;
    assert_eq!(store.count().await.unwrap(), 2);
    let results = store
        .query(&bag_of_words("What is the capital of France?"), 1)
        .await
        .unwrap();
    assert!(results[0].record.document.contains("Paris"));
}

#[tokio::test]
async fn test_reopen_with_different_dims_fails() {
    let tmp = TempDir::new().unwrap();
    {
        let store = open_store(&tmp, 4).await;
        store.close().await;
    }

    let err = SqliteVectorStore::open(&store_path(&tmp), 8)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RagError::DimensionMismatch {
            expected: 4,
            actual: 8
        }
    ));
}

// ============ Retrieval and answering ============

#[tokio::test]
async fn test_retrieve_on_empty_store_is_not_an_error() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, VOCAB.len()).await;
    let retriever = Retriever::new(store, Arc::new(BagEmbedder));

    let retrieved = retriever.retrieve("anything at all", 3).await.unwrap();
    assert!(retrieved.is_empty());
}

#[tokio::test]
async fn test_answer_without_context_uses_generic_instruction() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, VOCAB.len()).await;
    let retriever = Retriever::new(store, Arc::new(BagEmbedder));
    let pipeline = QueryPipeline::new(retriever, Arc::new(EchoGenerator), 3);

    let outcome = pipeline.answer("What is the capital of France?").await;
    assert!(!outcome.context_used);
    // EchoGenerator returns the composed instruction verbatim.
    assert_eq!(outcome.response, prompt::compose(&[]));
}

#[tokio::test]
async fn test_end_to_end_ingest_then_grounded_answer() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, VOCAB.len()).await;
    let embedder = Arc::new(BagEmbedder);

    let ingest = IngestPipeline::new(store.clone(), embedder.clone(), 10);
    let report = ingest.ingest("doc1", PARIS_BERLIN).await.unwrap();
    assert_eq!(report.chunks_processed, 2);

    let retriever = Retriever::new(store.clone(), embedder);
    let pipeline = QueryPipeline::new(retriever, Arc::new(EchoGenerator), 3);

    let outcome = pipeline.answer("What is the capital of France?").await;
    assert!(outcome.context_used);
    assert!(outcome.response.contains("Paris is the capital of France."));
}

#[tokio::test]
async fn test_nearest_chunk_listed_before_farther_one() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, VOCAB.len()).await;
    let embedder = Arc::new(BagEmbedder);

    let ingest = IngestPipeline::new(store.clone(), embedder.clone(), 10);
    ingest.ingest("doc1", PARIS_BERLIN).await.unwrap();

    let retriever = Retriever::new(store, embedder);
    let retrieved = retriever
        .retrieve("What is the capital of France?", 2)
        .await
        .unwrap();

    assert_eq!(retrieved.len(), 2);
    assert!(retrieved[0].document.contains("Paris"));
    assert!(retrieved[1].document.contains("Berlin"));
    assert_eq!(retrieved[0].metadata.source_id, "doc1");
    assert_eq!(retrieved[0].metadata.sequence, 0);
}

#[tokio::test]
async fn test_chat_degrades_when_generator_fails() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, VOCAB.len()).await;
    let embedder = Arc::new(BagEmbedder);

    let ingest = IngestPipeline::new(store.clone(), embedder.clone(), 10);
    ingest.ingest("doc1", PARIS_BERLIN).await.unwrap();

    let retriever = Retriever::new(store, embedder);
    let pipeline = QueryPipeline::new(retriever, Arc::new(FailingGenerator), 3);

    let outcome = pipeline.answer("What is the capital of France?").await;
    assert!(outcome.response.starts_with("Error:"));
    assert!(!outcome.context_used);
}

#[tokio::test]
async fn test_chat_outcome_wire_shape() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, VOCAB.len()).await;
    let retriever = Retriever::new(store, Arc::new(BagEmbedder));
    let pipeline = QueryPipeline::new(retriever, Arc::new(EchoGenerator), 3);

    let outcome = pipeline.answer("hello").await;
    let value = serde_json::to_value(&outcome).unwrap();
    assert!(value["response"].is_string());
    assert_eq!(value["context_used"], serde_json::Value::Bool(false));
}

#[tokio::test]
async fn test_chat_degrades_when_embedder_fails() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, 3).await;
    let embedder = Arc::new(FailAfterEmbedder {
        allow: 0,
        calls: AtomicUsize::new(0),
        dims: 3,
    });

    let retriever = Retriever::new(store, embedder);
    let pipeline = QueryPipeline::new(retriever, Arc::new(EchoGenerator), 3);

    let outcome = pipeline.answer("anything").await;
    assert!(outcome.response.starts_with("Error:"));
    assert!(!outcome.context_used);
}
