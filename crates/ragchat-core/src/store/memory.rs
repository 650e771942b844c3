//! In-memory [`DocumentStore`] implementation for tests and embedding the
//! core crate without a database.
//!
//! Uses a `Vec` behind `std::sync::RwLock`. Similarity search is brute-force
//! cosine similarity over all stored vectors.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{format_ts_iso, DeleteOutcome, DocumentSummary, NewDocument, RetrievedDocument};
use crate::search::{rank_candidates, Candidate};

use super::DocumentStore;

struct StoredDoc {
    id: String,
    filename: String,
    content: String,
    embedding: Vec<f32>,
    created_at: i64,
}

/// In-memory document store.
pub struct InMemoryStore {
    docs: RwLock<Vec<StoredDoc>>,
    last_ts: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(Vec::new()),
            last_ts: AtomicI64::new(0),
        }
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Strictly increasing millisecond timestamp, so insertion order is
    /// always visible in `created_at` even for back-to-back inserts.
    fn next_timestamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last_ts.load(Ordering::SeqCst);
        loop {
            let next = now.max(prev + 1);
            match self
                .last_ts
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> RagError {
    RagError::persistence("in-memory store lock poisoned")
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert(&self, doc: &NewDocument) -> Result<String> {
        if doc.embedding.is_empty() {
            return Err(RagError::persistence("embedding must not be empty"));
        }
        let created_at = self.next_timestamp();
        let mut docs = self.docs.write().map_err(|_| poisoned())?;
        if let Some(existing) = docs.first() {
            if existing.embedding.len() != doc.embedding.len() {
                return Err(RagError::persistence(format!(
                    "embedding has {} dimensions, store holds {}-dimensional vectors",
                    doc.embedding.len(),
                    existing.embedding.len()
                )));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        docs.push(StoredDoc {
            id: id.clone(),
            filename: doc.filename.clone(),
            content: doc.content.clone(),
            embedding: doc.embedding.clone(),
            created_at,
        });
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<DocumentSummary>> {
        let docs = self.docs.read().map_err(|_| poisoned())?;
        let mut ordered: Vec<&StoredDoc> = docs.iter().collect();
        ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(ordered
            .into_iter()
            .map(|d| DocumentSummary {
                id: d.id.clone(),
                filename: d.filename.clone(),
                created_at: format_ts_iso(d.created_at),
                content: d.content.clone(),
            })
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<DeleteOutcome> {
        let mut docs = self.docs.write().map_err(|_| poisoned())?;
        let before = docs.len();
        docs.retain(|d| d.id != id);
        Ok(DeleteOutcome {
            found: docs.len() != before,
        })
    }

    async fn match_documents(
        &self,
        query: &[f32],
        threshold: f64,
        count: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        let docs = self.docs.read().map_err(|_| poisoned())?;
        let candidates = docs
            .iter()
            .map(|d| Candidate {
                id: d.id.clone(),
                filename: d.filename.clone(),
                content: d.content.clone(),
                created_at: d.created_at,
                similarity: cosine_similarity(query, &d.embedding),
            })
            .collect();
        Ok(rank_candidates(candidates, threshold, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_doc(filename: &str, content: &str, embedding: Vec<f32>) -> NewDocument {
        NewDocument {
            filename: filename.to_string(),
            content: content.to_string(),
            embedding,
        }
    }

    #[tokio::test]
    async fn insert_list_delete_roundtrip() {
        let store = InMemoryStore::new();
        let id = store
            .insert(&new_doc("notes.txt", "hello world", vec![1.0, 0.0]))
            .await
            .unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].filename, "notes.txt");
        assert_eq!(listed[0].content, "hello world");

        assert!(store.delete(&id).await.unwrap().found);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_unknown_id_reports_not_found() {
        let store = InMemoryStore::new();
        let outcome = store.delete("does-not-exist").await.unwrap();
        assert!(!outcome.found);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = InMemoryStore::new();
        for name in ["first.txt", "second.txt", "third.txt"] {
            store
                .insert(&new_doc(name, "x", vec![1.0, 1.0]))
                .await
                .unwrap();
        }
        let names: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.filename)
            .collect();
        assert_eq!(names, vec!["third.txt", "second.txt", "first.txt"]);
    }

    #[tokio::test]
    async fn rejects_mismatched_dimensions() {
        let store = InMemoryStore::new();
        store
            .insert(&new_doc("a.txt", "a", vec![1.0, 0.0]))
            .await
            .unwrap();
        let err = store
            .insert(&new_doc("b.txt", "b", vec![1.0, 0.0, 0.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Persistence(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn match_documents_ranks_and_filters() {
        let store = InMemoryStore::new();
        store
            .insert(&new_doc("same.txt", "s", vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .insert(&new_doc("close.txt", "c", vec![1.0, 1.0]))
            .await
            .unwrap();
        store
            .insert(&new_doc("far.txt", "f", vec![0.0, 1.0]))
            .await
            .unwrap();

        let results = store.match_documents(&[1.0, 0.0], 0.5, 5).await.unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["same.txt", "close.txt"]);
        assert!((results[1].similarity - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }
}
