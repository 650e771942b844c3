//! # ragchat core
//!
//! Runtime-agnostic logic for ragchat: the document model, error taxonomy,
//! collaborator traits (embedding, storage, extraction, generation), the
//! similarity ranking algorithm, context assembly, the ingestion pipeline
//! and the chat orchestrator.
//!
//! This crate contains no tokio, sqlx, HTTP client or filesystem I/O.
//! Concrete collaborators (SQLite store, remote model clients, PDF/DOCX
//! extraction) live in the `ragchat` application crate.
//!
//! ## Data flow
//!
//! ```text
//! write path:  upload ─▶ Ingestor ─▶ Embedder ─▶ DocumentStore
//! query path:  message ─▶ Embedder ─▶ DocumentStore::match_documents
//!                      ─▶ context::assemble ─▶ ChatModel ─▶ token stream
//! ```

pub mod chat;
pub mod context;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod models;
pub mod search;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{RagError, Result};
