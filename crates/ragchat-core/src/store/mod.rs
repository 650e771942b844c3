//! Storage abstraction for documents.
//!
//! The [`DocumentStore`] trait defines the operations the ingestion and
//! retrieval pipelines need, enabling pluggable backends (SQLite in the app
//! crate, [`memory::InMemoryStore`] here).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{DeleteOutcome, DocumentSummary, NewDocument, RetrievedDocument};

/// Abstract document store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](DocumentStore::insert) | Atomically persist a new document, returning its id |
/// | [`list`](DocumentStore::list) | All documents without embeddings, newest first |
/// | [`delete`](DocumentStore::delete) | Remove by id; unknown ids are not an error |
/// | [`match_documents`](DocumentStore::match_documents) | Threshold-filtered similarity search |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist a document. Either the whole row is written or nothing is.
    ///
    /// Fails with a persistence error when the embedding's dimensionality
    /// differs from documents already stored.
    async fn insert(&self, doc: &NewDocument) -> Result<String>;

    /// List every document ordered by `created_at` descending.
    async fn list(&self) -> Result<Vec<DocumentSummary>>;

    /// Delete a document by id.
    async fn delete(&self, id: &str) -> Result<DeleteOutcome>;

    /// Return documents whose similarity to `query` is at least
    /// `threshold`, ordered by similarity descending, at most `count`.
    ///
    /// See [`crate::search::rank_candidates`] for the exact ordering contract.
    async fn match_documents(
        &self,
        query: &[f32],
        threshold: f64,
        count: usize,
    ) -> Result<Vec<RetrievedDocument>>;
}
