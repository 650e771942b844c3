//! Embedding trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements,
//! plus pure helpers for vector serialization and similarity computation.
//!
//! Concrete providers (OpenAI, Ollama, Gemini) live in the `ragchat` app
//! crate.

use async_trait::async_trait;

use crate::error::{RagError, Result};

/// A remote (or local) model turning text into a fixed-dimension vector.
///
/// Callers must not invoke [`embed`](Embedder::embed) with blank text; the
/// ingestion and retrieval paths short-circuit before reaching it.
/// Failures are never retried here: each call site decides whether to
/// degrade (retrieval) or fail the request (ingestion).
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-004"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding dimensionality (e.g. `768`).
    fn dims(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Reject a vector whose length does not match the configured model.
pub fn check_dims(vector: Vec<f32>, expected: usize) -> Result<Vec<f32>> {
    if vector.is_empty() {
        return Err(RagError::embedding("response contained an empty vector"));
    }
    if vector.len() != expected {
        return Err(RagError::embedding(format!(
            "expected a {}-dimensional vector, got {}",
            expected,
            vector.len()
        )));
    }
    Ok(vector)
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use ragchat_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), Some(v));
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Returns `None` when the byte length is not a multiple of 4.
pub fn blob_to_vec(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors
/// of different lengths, or zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}
