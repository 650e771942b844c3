//! Embedding provider implementations.
//!
//! Concrete [`Embedder`] backends:
//! - **[`DisabledEmbedder`]**: fails every call; used when embeddings are not configured.
//! - **[`OpenAiEmbedder`]**: `POST {base}/embeddings` with a bearer token.
//! - **[`OllamaEmbedder`]**: `POST {base}/api/embed` on a local Ollama instance.
//! - **[`GeminiEmbedder`]**: `POST {base}/models/{model}:embedContent`.
//!
//! Each call embeds exactly one text and is never retried. Response bodies
//! are decoded into typed structs and the vector length is checked against
//! the configured dimensionality before it leaves this module.
//!
//! Use [`create_embedder`] to build the provider named in the config.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Deserialize;

use ragchat_core::embedding::{check_dims, Embedder};
use ragchat_core::{RagError, Result};

use crate::config::EmbeddingConfig;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const GEMINI_API_KEY_ENV: &str = "GOOGLE_GENERATIVE_AI_API_KEY";

pub const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";
pub const GEMINI_DEFAULT_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Build the embedder selected by `config.provider`.
///
/// API keys come from the environment; a missing key is a startup error.
pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    if !config.is_enabled() {
        return Ok(Arc::new(DisabledEmbedder));
    }

    let model = config
        .model
        .clone()
        .context("embedding.model is required")?;
    let dims = config.dims.context("embedding.dims is required")?;
    let timeout = Duration::from_secs(config.timeout_secs);

    let embedder: Arc<dyn Embedder> = match config.provider.as_str() {
        "openai" => Arc::new(OpenAiEmbedder::new(
            model,
            dims,
            config.url.clone(),
            require_env(OPENAI_API_KEY_ENV)?,
            timeout,
        )?),
        "ollama" => Arc::new(OllamaEmbedder::new(model, dims, config.url.clone(), timeout)?),
        "gemini" => Arc::new(GeminiEmbedder::new(
            model,
            dims,
            config.url.clone(),
            require_env(GEMINI_API_KEY_ENV)?,
            timeout,
        )?),
        other => bail!("Unknown embedding provider: {}", other),
    };
    Ok(embedder)
}

pub(crate) fn require_env(name: &str) -> anyhow::Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => bail!("{} environment variable not set", name),
    }
}

fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

fn trim_base(url: Option<String>, default: &str) -> String {
    url.unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Send a prepared request and decode a successful JSON body.
async fn send_json<T: serde::de::DeserializeOwned>(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| RagError::embedding(format!("{} request failed: {}", provider, e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RagError::embedding(format!(
            "{} API error {}: {}",
            provider, status, body
        )));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| RagError::embedding(format!("invalid {} response: {}", provider, e)))
}

// ============ Disabled ============

/// Embedder used when `embedding.provider = "disabled"`.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::embedding("embedding provider is disabled"))
    }
}

// ============ OpenAI ============

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    base_url: String,
    api_key: String,
}

impl OpenAiEmbedder {
    pub fn new(
        model: String,
        dims: usize,
        base_url: Option<String>,
        api_key: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            model,
            dims,
            base_url: trim_base(base_url, OPENAI_DEFAULT_URL),
            api_key,
        })
    }
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingItem>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingItem {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });
        let request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);

        let parsed: OpenAiEmbeddingResponse = send_json("OpenAI", request).await?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| RagError::embedding("OpenAI response contained no embeddings"))?;
        check_dims(vector, self.dims)
    }
}

// ============ Ollama ============

pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    base_url: String,
}

impl OllamaEmbedder {
    pub fn new(
        model: String,
        dims: usize,
        base_url: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            model,
            dims,
            base_url: trim_base(base_url, OLLAMA_DEFAULT_URL),
        })
    }
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });
        let request = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&body);

        let parsed: OllamaEmbedResponse = send_json("Ollama", request).await?;
        let vector = parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding("Ollama response contained no embeddings"))?;
        check_dims(vector, self.dims)
    }
}

// ============ Gemini ============

pub struct GeminiEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    base_url: String,
    api_key: String,
}

impl GeminiEmbedder {
    pub fn new(
        model: String,
        dims: usize,
        base_url: Option<String>,
        api_key: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            model,
            dims,
            base_url: trim_base(base_url, GEMINI_DEFAULT_URL),
            api_key,
        })
    }
}

#[derive(Deserialize)]
struct GeminiEmbedResponse {
    embedding: GeminiEmbeddingValues,
}

#[derive(Deserialize)]
struct GeminiEmbeddingValues {
    values: Vec<f32>,
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [{ "text": text }] },
        });
        let request = self
            .client
            .post(format!(
                "{}/models/{}:embedContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body);

        let parsed: GeminiEmbedResponse = send_json("Gemini", request).await?;
        check_dims(parsed.embedding.values, self.dims)
    }
}
