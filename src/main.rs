//! # Grounded CLI (`grd`)
//!
//! The `grd` binary drives the local RAG backend: store initialization,
//! document ingestion, grounded questions, provider status, and the HTTP
//! server.
//!
//! ## Usage
//!
//! ```bash
//! grd --config ./config/grd.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `grd init` | Create the SQLite vector store and pin its dimensionality |
//! | `grd ingest <file>` | Chunk, embed, and store a UTF-8 text document |
//! | `grd ask "<question>"` | Answer a question grounded in stored chunks |
//! | `grd status` | Check Ollama reachability and report the record count |
//! | `grd serve` | Start the HTTP backend |

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use grounded::answer::QueryPipeline;
use grounded::config::{self, Config};
use grounded::embedding::{EmbeddingProvider, OllamaEmbedder};
use grounded::generation::{GenerationProvider, OllamaGenerator};
use grounded::ingest::{decode_utf8, IngestPipeline};
use grounded::retrieve::Retriever;
use grounded::server;
use grounded::sqlite_store::SqliteVectorStore;
use grounded::store::VectorStore;

/// Grounded — a local-first retrieval-augmented generation backend.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/grd.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "grd",
    about = "Grounded — a local-first retrieval-augmented generation backend",
    version,
    long_about = "Grounded ingests text documents, chunks and embeds them through a local \
    Ollama instance, stores the vectors durably in SQLite, and answers chat questions grounded \
    in the nearest stored chunks."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/grd.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the vector store.
    ///
    /// Creates the SQLite database and pins the embedding dimensionality
    /// from `[embedding].dims`. Idempotent — running it again is safe, but
    /// changing `dims` for an existing store is a fatal mismatch.
    Init,

    /// Ingest a UTF-8 text document.
    ///
    /// Chunks the file on paragraph boundaries, embeds each meaningful
    /// chunk, and upserts the vectors. Re-ingesting the same source
    /// overwrites its records in place.
    Ingest {
        /// Path to the document to ingest.
        path: PathBuf,

        /// Source identifier for the document. Defaults to the filename.
        #[arg(long)]
        source_id: Option<String>,
    },

    /// Ask a question grounded in the stored documents.
    Ask {
        /// The question to answer.
        question: String,

        /// Number of chunks to retrieve (overrides `[retrieval].top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Check provider reachability and report the stored record count.
    Status,

    /// Start the HTTP backend.
    ///
    /// Binds to `[server].bind` and exposes `/upload`, `/chat`, `/health`,
    /// and `/`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = SqliteVectorStore::open(&cfg.store.path, cfg.embedding.dims).await?;
            store.close().await;
            println!(
                "Store initialized at {} ({} dims).",
                cfg.store.path.display(),
                cfg.embedding.dims
            );
        }
        Commands::Ingest { path, source_id } => {
            run_ingest(&cfg, &path, source_id).await?;
        }
        Commands::Ask { question, top_k } => {
            run_ask(&cfg, &question, top_k).await?;
        }
        Commands::Status => {
            run_status(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_ingest(cfg: &Config, path: &Path, source_id: Option<String>) -> anyhow::Result<()> {
    let source_id = source_id.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    });

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read document: {}", path.display()))?;
    let text = decode_utf8(bytes)?;

    let store: Arc<dyn VectorStore> =
        Arc::new(SqliteVectorStore::open(&cfg.store.path, cfg.embedding.dims).await?);
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OllamaEmbedder::new(&cfg.embedding)?);

    let pipeline = IngestPipeline::new(store.clone(), embedder, cfg.chunking.min_chars);
    let report = pipeline.ingest(&source_id, &text).await?;

    println!("ingest {source_id}");
    println!("  chunks processed: {}", report.chunks_processed);
    println!("  embedded: {}", report.embedded);
    println!("  skipped (unchanged): {}", report.skipped_unchanged);
    println!("ok");

    store.close().await;
    Ok(())
}

async fn run_ask(cfg: &Config, question: &str, top_k: Option<usize>) -> anyhow::Result<()> {
    let store: Arc<dyn VectorStore> =
        Arc::new(SqliteVectorStore::open(&cfg.store.path, cfg.embedding.dims).await?);
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OllamaEmbedder::new(&cfg.embedding)?);
    let generator: Arc<dyn GenerationProvider> = Arc::new(OllamaGenerator::new(&cfg.generation)?);

    let retriever = Retriever::new(store.clone(), embedder);
    let pipeline = QueryPipeline::new(retriever, generator, top_k.unwrap_or(cfg.retrieval.top_k));

    let outcome = pipeline.answer(question).await;

    println!("{}", outcome.response);
    println!();
    println!("context used: {}", outcome.context_used);

    store.close().await;
    Ok(())
}

async fn run_status(cfg: &Config) -> anyhow::Result<()> {
    let store: Arc<dyn VectorStore> =
        Arc::new(SqliteVectorStore::open(&cfg.store.path, cfg.embedding.dims).await?);
    let embedder = OllamaEmbedder::new(&cfg.embedding)?;
    let generator = OllamaGenerator::new(&cfg.generation)?;

    let embed_status = if embedder.healthy().await {
        "connected"
    } else {
        "disconnected"
    };
    let gen_status = if generator.healthy().await {
        "connected"
    } else {
        "disconnected"
    };
    let count = store.count().await?;

    println!("status");
    println!(
        "  embedding provider ({}): {embed_status}",
        embedder.model_name()
    );
    println!(
        "  generation provider ({}): {gen_status}",
        generator.model_name()
    );
    println!("  documents stored: {count}");

    store.close().await;
    Ok(())
}
