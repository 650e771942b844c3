//! `ragchat chat`: one grounded chat turn from the command line.

use std::io::Write;

use anyhow::Result;
use futures::StreamExt;

use ragchat_core::models::ChatMessage;

use crate::config::Config;
use crate::services::Services;

/// Stream the reply to stdout as fragments arrive; sources go to stderr.
pub async fn run_chat(config: &Config, message: &str, system: Option<&str>) -> Result<()> {
    let services = Services::open(config).await?;
    let orchestrator = services.orchestrator();

    let turn = orchestrator
        .converse(&[ChatMessage::user(message)], system)
        .await?;

    if turn.sources.is_empty() {
        eprintln!("sources: (none)");
    } else {
        eprintln!("sources: {}", turn.sources.join(", "));
    }

    let mut tokens = turn.tokens;
    let mut stdout = std::io::stdout();
    while let Some(token) = tokens.next().await {
        let text = token?;
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
    }
    println!();
    Ok(())
}
