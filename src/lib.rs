//! # Grounded
//!
//! A local-first retrieval-augmented generation backend.
//!
//! Grounded ingests text documents, splits them into paragraph chunks,
//! embeds each chunk through a local Ollama instance, and stores the
//! vectors durably in SQLite. At chat time it retrieves the nearest chunks
//! to the question and conditions the generated answer on them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────┐
//! │ Upload   │──▶│   Pipeline    │──▶│  SQLite  │
//! │ (text)   │   │ Chunk + Embed │   │ vectors  │
//! └──────────┘   └───────────────┘   └────┬─────┘
//!                                         │
//!                ┌───────────────┐        │
//! ┌──────────┐   │   Pipeline    │◀───────┘
//! │ Chat     │──▶│ Retrieve +    │──▶ grounded answer
//! │ (query)  │   │ Compose + Gen │
//! └──────────┘   └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! grd init                          # create the vector store
//! grd ingest notes.txt              # chunk, embed, and store a document
//! grd ask "what do my notes say?"   # grounded answer
//! grd serve                         # start the HTTP backend
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed error taxonomy |
//! | [`chunk`] | Paragraph chunker |
//! | [`store`] | Vector store trait + in-memory backend |
//! | [`sqlite_store`] | Durable SQLite vector store |
//! | [`embedding`] | Embedding provider (Ollama) |
//! | [`generation`] | Generation provider (Ollama) |
//! | [`prompt`] | Grounding instruction composer |
//! | [`retrieve`] | Query-time retriever |
//! | [`ingest`] | Ingestion pipeline |
//! | [`answer`] | Query pipeline |
//! | [`server`] | HTTP transport shell |
//! | [`db`] | Database connection |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod models;
pub mod prompt;
pub mod retrieve;
pub mod server;
pub mod sqlite_store;
pub mod store;
