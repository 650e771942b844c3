//! `ragchat ingest`: index local files through the same pipeline as
//! `POST /upload`.

use std::path::Path;

use anyhow::{Context, Result};

use ragchat_core::ingest::Upload;

use crate::config::Config;
use crate::services::Services;

/// Ingest each file in order. Stops at the first failure; files already
/// indexed stay indexed.
pub async fn run_ingest(config: &Config, files: &[impl AsRef<Path>]) -> Result<()> {
    let services = Services::open(config).await?;
    let ingestor = services.ingestor();

    for path in files {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let receipt = ingestor
            .ingest(Upload::bytes(filename, bytes))
            .await
            .with_context(|| format!("Failed to ingest {}", path.display()))?;

        println!(
            "indexed {} ({} chars{}) id={}",
            receipt.filename,
            receipt.chars,
            if receipt.truncated { ", truncated" } else { "" },
            receipt.id
        );
    }

    Ok(())
}
