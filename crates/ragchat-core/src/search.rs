//! Similarity search: ranking, boundary validation and query retrieval.
//!
//! The ranking contract is the same for every backend:
//!
//! 1. Compute similarity between the query vector and each embedding.
//! 2. Keep documents with `similarity >= threshold`.
//! 3. Sort by similarity (desc), then `created_at` (desc), then id (asc).
//! 4. Truncate to `count`.
//!
//! Backends either call [`rank_candidates`] directly (in-process scan) or
//! push the query down to a server-side capability; in both cases the rows
//! pass through [`validate_matches`] before they enter a retrieval result.

use std::cmp::Ordering;

use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::models::RetrievedDocument;
use crate::store::DocumentStore;

/// Default minimum similarity for search.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.7;
/// Default maximum number of matches.
pub const DEFAULT_MATCH_COUNT: usize = 5;
/// Looser threshold used by the chat path to favor recall.
pub const CHAT_MATCH_THRESHOLD: f64 = 0.3;

/// Retrieval tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub threshold: f64,
    pub count: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
            count: DEFAULT_MATCH_COUNT,
        }
    }
}

impl SearchParams {
    pub fn new(threshold: f64, count: usize) -> Self {
        Self { threshold, count }
    }
}

/// A scored document before ranking.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub filename: String,
    pub content: String,
    /// Insertion time in Unix milliseconds; used as the tie-breaker.
    pub created_at: i64,
    pub similarity: f64,
}

/// Filter, sort and truncate scored candidates.
///
/// NaN similarities never pass the threshold.
pub fn rank_candidates(
    candidates: Vec<Candidate>,
    threshold: f64,
    count: usize,
) -> Vec<RetrievedDocument> {
    let mut kept: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| c.similarity >= threshold)
        .collect();

    kept.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then(b.created_at.cmp(&a.created_at))
            .then(a.id.cmp(&b.id))
    });
    kept.truncate(count);

    kept.into_iter()
        .map(|c| RetrievedDocument {
            id: c.id,
            filename: c.filename,
            content: c.content,
            similarity: c.similarity,
        })
        .collect()
}

/// Check rows returned by a store against the retrieval contract.
///
/// A malformed row (blank filename, non-finite or below-threshold score,
/// out-of-order scores, too many rows) fails fast with a persistence error
/// instead of propagating into the context block.
pub fn validate_matches(
    rows: Vec<RetrievedDocument>,
    threshold: f64,
    count: usize,
) -> Result<Vec<RetrievedDocument>> {
    if rows.len() > count {
        return Err(RagError::persistence(format!(
            "similarity query returned {} rows, more than the requested {}",
            rows.len(),
            count
        )));
    }

    for (i, row) in rows.iter().enumerate() {
        if row.filename.trim().is_empty() {
            return Err(RagError::persistence(format!(
                "similarity row {} has no filename",
                i
            )));
        }
        if !row.similarity.is_finite() {
            return Err(RagError::persistence(format!(
                "similarity row {} has a non-finite score",
                i
            )));
        }
        if row.similarity < threshold {
            return Err(RagError::persistence(format!(
                "similarity row {} scored {} below threshold {}",
                i, row.similarity, threshold
            )));
        }
        if i > 0 && rows[i - 1].similarity < row.similarity {
            return Err(RagError::persistence(
                "similarity rows are not ordered by descending score",
            ));
        }
    }

    Ok(rows)
}

/// Embed `query` and fetch the best-matching documents.
///
/// A blank query short-circuits to an empty result without contacting the
/// embedding service.
pub async fn retrieve(
    store: &dyn DocumentStore,
    embedder: &dyn Embedder,
    query: &str,
    params: SearchParams,
) -> Result<Vec<RetrievedDocument>> {
    if query.trim().is_empty() || params.count == 0 {
        return Ok(Vec::new());
    }

    let query_vec = embedder.embed(query).await?;
    let rows = store
        .match_documents(&query_vec, params.threshold, params.count)
        .await?;

    validate_matches(rows, params.threshold, params.count)
}
