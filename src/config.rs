//! TOML configuration parsing and validation.
//!
//! Configuration is loaded once at startup and shared read-only (behind an
//! `Arc`) by every request handler. API keys are never read from the file;
//! providers pick them up from the environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use ragchat_core::chat::DEFAULT_SYSTEM_PROMPT;
use ragchat_core::ingest::{IngestOptions, UnknownFormatPolicy, MAX_CONTENT_CHARS};
use ragchat_core::search::{
    SearchParams, CHAT_MATCH_THRESHOLD, DEFAULT_MATCH_COUNT, DEFAULT_MATCH_THRESHOLD,
};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (e.g. a proxy or a local Ollama instance).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    #[serde(default = "default_match_count")]
    pub match_count: usize,
    #[serde(default = "default_chat_match_threshold")]
    pub chat_match_threshold: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            match_count: default_match_count(),
            chat_match_threshold: default_chat_match_threshold(),
        }
    }
}

impl RetrievalConfig {
    pub fn search_params(&self) -> SearchParams {
        SearchParams::new(self.match_threshold, self.match_count)
    }

    pub fn chat_params(&self) -> SearchParams {
        SearchParams::new(self.chat_match_threshold, self.match_count)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_system_prompt")]
    pub default_system_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    #[serde(default)]
    pub reject_unknown_extensions: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_content_chars: default_max_content_chars(),
            reject_unknown_extensions: false,
        }
    }
}

impl IngestConfig {
    pub fn options(&self) -> IngestOptions {
        IngestOptions {
            max_content_chars: self.max_content_chars,
            unknown_format: if self.reject_unknown_extensions {
                UnknownFormatPolicy::Reject
            } else {
                UnknownFormatPolicy::PassThrough
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_match_threshold() -> f64 {
    DEFAULT_MATCH_THRESHOLD
}
fn default_match_count() -> usize {
    DEFAULT_MATCH_COUNT
}
fn default_chat_match_threshold() -> f64 {
    CHAT_MATCH_THRESHOLD
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}
fn default_max_content_chars() -> usize {
    MAX_CONTENT_CHARS
}
fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}
fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

const PROVIDERS: &[&str] = &["disabled", "openai", "ollama", "gemini"];

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate retrieval
    for (name, value) in [
        ("retrieval.match_threshold", config.retrieval.match_threshold),
        (
            "retrieval.chat_match_threshold",
            config.retrieval.chat_match_threshold,
        ),
    ] {
        if !(-1.0..=1.0).contains(&value) {
            anyhow::bail!("{} must be in [-1.0, 1.0]", name);
        }
    }
    if config.retrieval.match_count < 1 {
        anyhow::bail!("retrieval.match_count must be >= 1");
    }

    // Validate ingest
    if config.ingest.max_content_chars < 1 {
        anyhow::bail!("ingest.max_content_chars must be >= 1");
    }

    // Validate embedding
    if !PROVIDERS.contains(&config.embedding.provider.as_str()) {
        anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or gemini.",
            config.embedding.provider
        );
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.unwrap_or(0) == 0 {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    // Validate generation
    if !PROVIDERS.contains(&config.generation.provider.as_str()) {
        anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, ollama, or gemini.",
            config.generation.provider
        );
    }
    if config.generation.is_enabled() && config.generation.model.is_none() {
        anyhow::bail!(
            "generation.model must be specified when provider is '{}'",
            config.generation.provider
        );
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/ragchat.sqlite"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.embedding.provider, "disabled");
        assert!(!cfg.generation.is_enabled());
        assert_eq!(cfg.retrieval.match_threshold, 0.7);
        assert_eq!(cfg.retrieval.chat_match_threshold, 0.3);
        assert_eq!(cfg.retrieval.match_count, 5);
        assert_eq!(cfg.ingest.max_content_chars, 50_000);
        assert_eq!(cfg.chat.default_system_prompt, "You are a helpful assistant.");
        assert_eq!(cfg.server.bind, "127.0.0.1:3000");
        assert_eq!(
            cfg.ingest.options().unknown_format,
            UnknownFormatPolicy::PassThrough
        );
    }

    #[test]
    fn full_config_parses() {
        let cfg = parse_config(
            r#"
[db]
path = "/tmp/r.sqlite"

[embedding]
provider = "gemini"
model = "text-embedding-004"
dims = 768

[generation]
provider = "openai"
model = "gpt-4o-mini"
url = "http://localhost:9999/v1"

[retrieval]
match_threshold = 0.8
match_count = 3
chat_match_threshold = 0.25

[ingest]
reject_unknown_extensions = true
"#,
        )
        .unwrap();
        assert_eq!(cfg.embedding.dims, Some(768));
        assert_eq!(cfg.generation.url.as_deref(), Some("http://localhost:9999/v1"));
        assert_eq!(cfg.retrieval.chat_params(), SearchParams::new(0.25, 3));
        assert_eq!(cfg.ingest.options().unknown_format, UnknownFormatPolicy::Reject);
    }

    #[test]
    fn rejects_invalid_values() {
        let cases = [
            "[retrieval]\nmatch_threshold = 1.5",
            "[retrieval]\nmatch_count = 0",
            "[ingest]\nmax_content_chars = 0",
            "[embedding]\nprovider = \"cohere\"",
            "[embedding]\nprovider = \"openai\"\nmodel = \"m\"",
            "[embedding]\nprovider = \"openai\"\ndims = 8",
            "[generation]\nprovider = \"gemini\"",
        ];
        for case in cases {
            let text = format!("{}\n{}", MINIMAL, case);
            assert!(parse_config(&text).is_err(), "accepted: {}", case);
        }
    }
}
