//! `ragchat search`: similarity search from the command line.

use anyhow::Result;

use ragchat_core::context::assemble;
use ragchat_core::models::RetrievedDocument;
use ragchat_core::search::{retrieve, SearchParams};

use crate::config::Config;
use crate::services::Services;

const SNIPPET_CHARS: usize = 160;

/// Embed `query`, rank stored documents and print the results.
///
/// `threshold` and `count` override `[retrieval]`. With `as_context`, prints
/// the exact block the chat path would inject into the system message.
pub async fn run_search(
    config: &Config,
    query: &str,
    threshold: Option<f64>,
    count: Option<usize>,
    as_context: bool,
) -> Result<()> {
    let defaults = config.retrieval.search_params();
    let params = SearchParams::new(
        threshold.unwrap_or(defaults.threshold),
        count.unwrap_or(defaults.count),
    );
    if !(-1.0..=1.0).contains(&params.threshold) {
        anyhow::bail!("--threshold must be in [-1.0, 1.0]");
    }

    let services = Services::open(config).await?;
    let results = retrieve(
        services.store.as_ref(),
        services.embedder.as_ref(),
        query,
        params,
    )
    .await?;

    if as_context {
        println!("{}", assemble(&results).context);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!("{}. [{:.3}] {}", i + 1, result.similarity, result.filename);
        println!("    excerpt: \"{}\"", snippet(result));
        println!("    id: {}", result.id);
        println!();
    }

    Ok(())
}

fn snippet(result: &RetrievedDocument) -> String {
    let flat = result.content.replace('\n', " ");
    let trimmed = flat.trim();
    match trimmed.char_indices().nth(SNIPPET_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
