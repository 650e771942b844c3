//! SQLite-backed [`DocumentStore`] implementation.
//!
//! Embeddings are stored as little-endian `f32` BLOBs next to their
//! dimensionality. Similarity search loads every vector and scores it
//! in-process, then hands the scored rows to
//! [`rank_candidates`](ragchat_core::search::rank_candidates) so the
//! ordering contract matches the in-memory store exactly.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use ragchat_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use ragchat_core::models::{
    format_ts_iso, DeleteOutcome, DocumentSummary, NewDocument, RetrievedDocument,
};
use ragchat_core::search::{rank_candidates, Candidate};
use ragchat_core::store::DocumentStore;
use ragchat_core::{RagError, Result};

/// SQLite implementation of the [`DocumentStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn db_err(err: sqlx::Error) -> RagError {
    RagError::persistence(err.to_string())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert(&self, doc: &NewDocument) -> Result<String> {
        if doc.embedding.is_empty() {
            return Err(RagError::persistence("embedding must not be empty"));
        }

        // One statement, so SQLite takes the write lock before reading the
        // dims and MAX(created_at). created_at stays strictly increasing.
        let id = uuid::Uuid::new_v4().to_string();
        let dims = doc.embedding.len() as i64;
        let result = sqlx::query(
            r#"
            INSERT INTO documents (id, filename, content, embedding, dims, created_at)
            SELECT ?1, ?2, ?3, ?4, ?5,
                   MAX(?6, COALESCE((SELECT MAX(created_at) FROM documents) + 1, ?6))
            WHERE NOT EXISTS (SELECT 1 FROM documents WHERE dims <> ?5)
            "#,
        )
        .bind(&id)
        .bind(&doc.filename)
        .bind(&doc.content)
        .bind(vec_to_blob(&doc.embedding))
        .bind(dims)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            let stored: Option<i64> = sqlx::query_scalar("SELECT dims FROM documents LIMIT 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
            return Err(RagError::persistence(match stored {
                Some(stored) => format!(
                    "embedding has {} dimensions, store holds {}-dimensional vectors",
                    dims, stored
                ),
                None => format!("embedding with {} dimensions was not stored", dims),
            }));
        }

        Ok(id)
    }

    async fn list(&self) -> Result<Vec<DocumentSummary>> {
        let rows = sqlx::query(
            "SELECT id, filename, content, created_at FROM documents ORDER BY created_at DESC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .iter()
            .map(|row| {
                let created_at: i64 = row.get("created_at");
                DocumentSummary {
                    id: row.get("id"),
                    filename: row.get("filename"),
                    created_at: format_ts_iso(created_at),
                    content: row.get("content"),
                }
            })
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<DeleteOutcome> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(DeleteOutcome {
            found: result.rows_affected() > 0,
        })
    }

    async fn match_documents(
        &self,
        query: &[f32],
        threshold: f64,
        count: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        let rows =
            sqlx::query("SELECT id, filename, content, embedding, created_at FROM documents")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("id");
            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob).ok_or_else(|| {
                RagError::persistence(format!("document {} has a corrupt embedding", id))
            })?;
            candidates.push(Candidate {
                similarity: cosine_similarity(query, &vector),
                filename: row.get("filename"),
                content: row.get("content"),
                created_at: row.get("created_at"),
                id,
            });
        }

        Ok(rank_candidates(candidates, threshold, count))
    }
}
