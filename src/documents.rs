//! `ragchat documents` and `ragchat delete`.

use anyhow::Result;

use crate::config::Config;
use crate::services::Services;

/// Print every stored document, newest first.
pub async fn run_documents(config: &Config) -> Result<()> {
    let services = Services::open(config).await?;
    let documents = services.store.list().await?;

    if documents.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    for doc in &documents {
        println!(
            "{}  {}  {}  ({} chars)",
            doc.id,
            doc.created_at,
            doc.filename,
            doc.content.chars().count()
        );
    }
    Ok(())
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        anyhow::bail!("document id must not be empty");
    }
    let services = Services::open(config).await?;
    let outcome = services.store.delete(id.trim()).await?;
    if outcome.found {
        println!("Deleted {}", id.trim());
    } else {
        println!("No document with id {}", id.trim());
    }
    Ok(())
}
