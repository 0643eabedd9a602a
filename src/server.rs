//! HTTP transport shell over the ingestion and query pipelines.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Multipart file upload → ingest into the store |
//! | `POST` | `/chat` | `{"message": …}` → grounded answer |
//! | `GET`  | `/health` | Provider reachability + stored record count |
//! | `GET`  | `/` | Liveness marker |
//!
//! # Error Contract
//!
//! Upload failures respond with `{"status":"error","message":…}` and a
//! meaningful HTTP status (400 for malformed requests or non-UTF-8 uploads,
//! 502 for provider failures, 500 otherwise). `/chat` never fails at the
//! transport level; pipeline errors degrade into the answer text with
//! `context_used = false`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted — the expected caller is
//! a browser frontend served from a different local port.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::answer::QueryPipeline;
use crate::config::Config;
use crate::embedding::{EmbeddingProvider, OllamaEmbedder};
use crate::error::{IngestFailure, RagError};
use crate::generation::{GenerationProvider, OllamaGenerator};
use crate::ingest::{decode_utf8, IngestPipeline};
use crate::models::ChatOutcome;
use crate::retrieve::Retriever;
use crate::sqlite_store::SqliteVectorStore;
use crate::store::VectorStore;

/// Shared application state: explicitly constructed service objects,
/// injected into the pipelines per request rather than reached for as
/// globals.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
}

/// Open the store, construct the Ollama providers, and serve until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = SqliteVectorStore::open(&config.store.path, config.embedding.dims).await?;
    let embedder = OllamaEmbedder::new(&config.embedding)?;
    let generator = OllamaGenerator::new(&config.generation)?;

    run_server_with(
        config,
        Arc::new(store),
        Arc::new(embedder),
        Arc::new(generator),
    )
    .await
}

/// Like [`run_server`], but with caller-supplied store and providers.
pub async fn run_server_with(
    config: &Config,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config.clone()),
        store,
        embedder,
        generator,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(handle_root))
        .route("/upload", post(handle_upload))
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    tracing::info!(%bind_addr, "server listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error body for upload failures: `{"status":"error","message":…}`.
#[derive(Serialize)]
struct ErrorBody {
    status: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: "error".to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

/// Map a pipeline error to the most appropriate HTTP status. Provider
/// failures are upstream faults (502); dimension drift and persistence
/// failures are ours (500); bad input is the client's (400).
fn classify_rag_error(err: &RagError) -> StatusCode {
    match err {
        RagError::Decode(_) => StatusCode::BAD_REQUEST,
        RagError::EmbeddingProvider(_) | RagError::GenerationProvider(_) => StatusCode::BAD_GATEWAY,
        RagError::DimensionMismatch { .. } | RagError::Persistence(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<IngestFailure> for AppError {
    fn from(failure: IngestFailure) -> Self {
        AppError {
            status: classify_rag_error(&failure.source),
            message: failure.to_string(),
        }
    }
}

// ============ GET / ============

/// JSON response body for `GET /`.
#[derive(Serialize)]
struct RootResponse {
    status: String,
    service: String,
    version: String,
}

/// Liveness marker; no core logic.
async fn handle_root() -> Json<RootResponse> {
    Json(RootResponse {
        status: "ok".to_string(),
        service: "grounded".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /upload ============

/// JSON response body for a successful `POST /upload`.
#[derive(Serialize)]
struct UploadResponse {
    status: String,
    filename: String,
    chunks_processed: usize,
}

/// Handler for `POST /upload`.
///
/// Reads the first multipart field carrying a filename, decodes it as
/// UTF-8 text, and runs the ingestion pipeline with the filename as the
/// source id.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart body: {e}")))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };

        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {e}")))?;

        let text = decode_utf8(bytes.to_vec()).map_err(|e| bad_request(e.to_string()))?;

        let pipeline = IngestPipeline::new(
            state.store.clone(),
            state.embedder.clone(),
            state.config.chunking.min_chars,
        );
        let report = pipeline.ingest(&filename, &text).await?;

        tracing::info!(
            filename = %filename,
            chunks = report.chunks_processed,
            "upload ingested"
        );

        return Ok(Json(UploadResponse {
            status: "success".to_string(),
            filename,
            chunks_processed: report.chunks_processed,
        }));
    }

    Err(bad_request("multipart body contained no file field"))
}

// ============ POST /chat ============

/// JSON request body for `POST /chat`.
#[derive(Deserialize)]
struct ChatRequestBody {
    message: String,
}

/// Handler for `POST /chat`. Always responds 200 with a [`ChatOutcome`];
/// pipeline failures are carried in the response text.
async fn handle_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequestBody>,
) -> Json<ChatOutcome> {
    let retriever = Retriever::new(state.store.clone(), state.embedder.clone());
    let pipeline = QueryPipeline::new(
        retriever,
        state.generator.clone(),
        state.config.retrieval.top_k,
    );

    let outcome = pipeline.answer(&body.message).await;
    Json(outcome)
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// `"connected"` when both Ollama provider checks succeed.
    provider: String,
    /// `"connected"` when the vector store answers `count()`.
    store: String,
    documents_stored: u64,
}

/// Handler for `GET /health`. Checks provider reachability and the store.
async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let provider_ok = state.embedder.healthy().await && state.generator.healthy().await;

    let (store_status, documents_stored) = match state.store.count().await {
        Ok(count) => ("connected", count),
        Err(_) => ("disconnected", 0),
    };

    Json(HealthResponse {
        provider: if provider_ok {
            "connected".to_string()
        } else {
            "disconnected".to_string()
        },
        store: store_status.to_string(),
        documents_stored,
    })
}
