//! Error taxonomy shared by every stage of the pipeline.
//!
//! Each variant corresponds to one failure class with its own handling
//! policy: validation errors are rejected before any external call,
//! embedding errors are fatal for ingestion but degrade retrieval to an
//! empty context, and generation errors terminate the token stream.

use thiserror::Error;

/// Errors produced by the ingestion, retrieval and chat pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RagError {
    /// Caller-supplied input was rejected (empty content, blank filename,
    /// missing parameter). No external service was contacted.
    #[error("{0}")]
    Validation(String),

    /// The remote embedding model failed or returned a malformed response.
    #[error("embedding service error: {0}")]
    Embedding(String),

    /// The document store rejected a read, write or delete.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Converting a binary document to plain text failed.
    #[error("text extraction failed: {0}")]
    Extraction(String),

    /// The generation service failed to start streaming or was interrupted.
    #[error("generation service error: {0}")]
    Generation(String),
}

impl RagError {
    pub fn validation(message: impl Into<String>) -> Self {
        RagError::Validation(message.into())
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        RagError::Embedding(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        RagError::Persistence(message.into())
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        RagError::Extraction(message.into())
    }

    pub fn generation(message: impl Into<String>) -> Self {
        RagError::Generation(message.into())
    }

    /// Stable machine-readable code, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::Validation(_) => "validation_error",
            RagError::Embedding(_) => "embedding_service_error",
            RagError::Persistence(_) => "persistence_error",
            RagError::Extraction(_) => "extraction_error",
            RagError::Generation(_) => "generation_service_error",
        }
    }
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;
