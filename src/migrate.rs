//! Database schema migrations (idempotent).

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Connect to the configured database and bring its schema up to date.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the schema on an open pool. Safe to run repeatedly.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // One row per uploaded document; embeddings are little-endian f32 BLOBs.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            content TEXT NOT NULL,
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
