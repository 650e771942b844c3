//! Core data models that flow through the ingestion and query pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted document, including its embedding.
///
/// Documents are immutable once stored; the only lifecycle transition
/// after insertion is deletion by id.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// Input to [`DocumentStore::insert`](crate::store::DocumentStore::insert).
///
/// The store assigns `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub filename: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// Document listing entry (everything except the embedding).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub filename: String,
    /// Insertion timestamp (ISO 8601, millisecond precision).
    pub created_at: String,
    pub content: String,
}

/// One entry of a retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub filename: String,
    pub content: String,
    /// Similarity between the query vector and this document's embedding.
    pub similarity: f64,
}

/// Outcome of a delete request.
///
/// Deleting an unknown id is not an error; `found` tells the two cases apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub found: bool,
}

/// Speaker of a client-held conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A conversation message as supplied by the caller on every chat request.
///
/// The server never persists these; they are untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub id: String,
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Format a millisecond Unix timestamp as ISO 8601.
pub fn format_ts_iso(ts_millis: i64) -> String {
    DateTime::from_timestamp_millis(ts_millis)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_else(|| ts_millis.to_string())
}
