//! Streaming chat-model clients.
//!
//! Concrete [`ChatModel`] backends:
//! - **[`DisabledChatModel`]**: refuses to start; used when generation is not configured.
//! - **[`OpenAiChatModel`]**: `POST {base}/chat/completions` with `stream: true` (SSE).
//! - **[`OllamaChatModel`]**: `POST {base}/api/chat` (newline-delimited JSON).
//! - **[`GeminiChatModel`]**: `POST {base}/models/{model}:streamGenerateContent?alt=sse`.
//!
//! All three wire formats are line oriented. The response body is split into
//! lines at the byte level (so a multi-byte character straddling two network
//! chunks is reassembled before decoding), each line is mapped to a
//! [`Frame`] by a provider-specific parser, and the frames become the
//! [`TokenStream`] handed to the orchestrator.
//!
//! A transport or decoding failure after the stream has started becomes a
//! single terminal `Err` item.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use ragchat_core::generation::{ChatModel, PromptMessage, PromptRole, TokenStream};
use ragchat_core::{RagError, Result};

use crate::config::GenerationConfig;
use crate::embedding::{
    require_env, GEMINI_API_KEY_ENV, GEMINI_DEFAULT_URL, OLLAMA_DEFAULT_URL, OPENAI_API_KEY_ENV,
    OPENAI_DEFAULT_URL,
};

/// Build the chat model selected by `config.provider`.
pub fn create_chat_model(config: &GenerationConfig) -> anyhow::Result<Arc<dyn ChatModel>> {
    if !config.is_enabled() {
        return Ok(Arc::new(DisabledChatModel));
    }

    let model = config
        .model
        .clone()
        .context("generation.model is required")?;
    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

    let chat: Arc<dyn ChatModel> = match config.provider.as_str() {
        "openai" => Arc::new(OpenAiChatModel::new(
            model,
            config.url.clone(),
            require_env(OPENAI_API_KEY_ENV)?,
            connect_timeout,
        )?),
        "ollama" => Arc::new(OllamaChatModel::new(
            model,
            config.url.clone(),
            connect_timeout,
        )?),
        "gemini" => Arc::new(GeminiChatModel::new(
            model,
            config.url.clone(),
            require_env(GEMINI_API_KEY_ENV)?,
            connect_timeout,
        )?),
        other => bail!("Unknown generation provider: {}", other),
    };
    Ok(chat)
}

/// What a single wire line means for the token stream.
#[derive(Debug, PartialEq)]
pub(crate) enum Frame {
    Token(String),
    /// Keep-alives, comments, role-only deltas.
    Skip,
    /// A final fragment; nothing follows it.
    Last(String),
    Done,
}

type LineParser = fn(&str) -> Result<Frame>;

struct LineState<S> {
    inner: S,
    buf: Vec<u8>,
    eof: bool,
}

fn decode_line(mut line: Vec<u8>) -> Result<String> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line).map_err(|_| RagError::generation("stream contained invalid UTF-8"))
}

/// Split a byte stream into text lines without the trailing `\n` / `\r\n`.
///
/// A trailing fragment without a newline is emitted when the stream ends.
/// A transport error is yielded once and ends the stream.
pub(crate) fn split_lines<S, B, E>(inner: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    let state = LineState {
        inner,
        buf: Vec::new(),
        eof: false,
    };
    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(pos) = st.buf.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = st.buf.drain(..=pos).collect();
                line.pop();
                return Some((decode_line(line), st));
            }
            if st.eof {
                if st.buf.is_empty() {
                    return None;
                }
                let rest = std::mem::take(&mut st.buf);
                return Some((decode_line(rest), st));
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => st.buf.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    st.eof = true;
                    st.buf.clear();
                    let err = RagError::generation(format!("stream interrupted: {}", e));
                    return Some((Err(err), st));
                }
                None => st.eof = true,
            }
        }
    })
}

/// Turn a stream of wire lines into a [`TokenStream`] using `parse`.
pub(crate) fn token_stream<L>(lines: L, parse: LineParser) -> TokenStream
where
    L: Stream<Item = Result<String>> + Send + 'static,
{
    let state = (Box::pin(lines), false);
    Box::pin(futures::stream::unfold(
        state,
        move |(mut lines, finished)| async move {
            if finished {
                return None;
            }
            loop {
                let line = match lines.next().await? {
                    Ok(line) => line,
                    Err(e) => return Some((Err(e), (lines, true))),
                };
                match parse(&line) {
                    Ok(Frame::Token(text)) => return Some((Ok(text), (lines, false))),
                    Ok(Frame::Skip) => continue,
                    Ok(Frame::Last(text)) => return Some((Ok(text), (lines, true))),
                    Ok(Frame::Done) => return None,
                    Err(e) => return Some((Err(e), (lines, true))),
                }
            }
        },
    ))
}

/// Return the payload of an SSE `data:` line, or `None` for any other line.
fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

fn stream_client(connect_timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .context("Failed to build HTTP client")
}

fn trim_base(url: Option<String>, default: &str) -> String {
    url.unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Send the request and turn a successful response into a token stream.
async fn start_stream(
    provider: &str,
    request: reqwest::RequestBuilder,
    parse: LineParser,
) -> Result<TokenStream> {
    let response = request
        .send()
        .await
        .map_err(|e| RagError::generation(format!("{} request failed: {}", provider, e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RagError::generation(format!(
            "{} API error {}: {}",
            provider, status, body
        )));
    }

    tracing::debug!(provider, "generation stream started");
    let lines = split_lines(Box::pin(response.bytes_stream()));
    Ok(token_stream(lines, parse))
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

// ============ Disabled ============

pub struct DisabledChatModel;

#[async_trait]
impl ChatModel for DisabledChatModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn stream_chat(&self, _messages: &[PromptMessage]) -> Result<TokenStream> {
        Err(RagError::generation("generation provider is disabled"))
    }
}

// ============ OpenAI ============

pub struct OpenAiChatModel {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
}

impl OpenAiChatModel {
    pub fn new(
        model: String,
        base_url: Option<String>,
        api_key: String,
        connect_timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: stream_client(connect_timeout)?,
            model,
            base_url: trim_base(base_url, OPENAI_DEFAULT_URL),
            api_key,
        })
    }
}

#[derive(Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    delta: OpenAiDelta,
}

#[derive(Deserialize, Default)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
}

pub(crate) fn parse_openai_line(line: &str) -> Result<Frame> {
    let Some(data) = sse_data(line) else {
        return Ok(Frame::Skip);
    };
    if data.is_empty() {
        return Ok(Frame::Skip);
    }
    if data == "[DONE]" {
        return Ok(Frame::Done);
    }

    let chunk: OpenAiChunk = serde_json::from_str(data)
        .map_err(|e| RagError::generation(format!("invalid OpenAI stream chunk: {}", e)))?;
    if let Some(err) = chunk.error {
        return Err(RagError::generation(format!("OpenAI: {}", err.message)));
    }
    match chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
        Some(text) if !text.is_empty() => Ok(Frame::Token(text)),
        _ => Ok(Frame::Skip),
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream_chat(&self, messages: &[PromptMessage]) -> Result<TokenStream> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });
        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);
        start_stream("OpenAI", request, parse_openai_line).await
    }
}

// ============ Ollama ============

pub struct OllamaChatModel {
    client: reqwest::Client,
    model: String,
    base_url: String,
}

impl OllamaChatModel {
    pub fn new(
        model: String,
        base_url: Option<String>,
        connect_timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: stream_client(connect_timeout)?,
            model,
            base_url: trim_base(base_url, OLLAMA_DEFAULT_URL),
        })
    }
}

#[derive(Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

pub(crate) fn parse_ollama_line(line: &str) -> Result<Frame> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Frame::Skip);
    }

    let chunk: OllamaChunk = serde_json::from_str(line)
        .map_err(|e| RagError::generation(format!("invalid Ollama stream chunk: {}", e)))?;
    if let Some(err) = chunk.error {
        return Err(RagError::generation(format!("Ollama: {}", err)));
    }

    let text = chunk.message.map(|m| m.content).unwrap_or_default();
    Ok(match (chunk.done, text.is_empty()) {
        (true, true) => Frame::Done,
        (true, false) => Frame::Last(text),
        (false, true) => Frame::Skip,
        (false, false) => Frame::Token(text),
    })
}

#[async_trait]
impl ChatModel for OllamaChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream_chat(&self, messages: &[PromptMessage]) -> Result<TokenStream> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });
        let request = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body);
        start_stream("Ollama", request, parse_ollama_line).await
    }
}

// ============ Gemini ============

pub struct GeminiChatModel {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
}

impl GeminiChatModel {
    pub fn new(
        model: String,
        base_url: Option<String>,
        api_key: String,
        connect_timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: stream_client(connect_timeout)?,
            model,
            base_url: trim_base(base_url, GEMINI_DEFAULT_URL),
            api_key,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystem>,
    contents: Vec<GeminiContent>,
}

#[derive(Serialize)]
struct GeminiSystem {
    parts: Vec<GeminiPart>,
}

/// Gemini takes system text out of band and calls the assistant "model".
fn gemini_request(messages: &[PromptMessage]) -> GeminiRequest {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == PromptRole::System)
        .map(|m| m.content.as_str())
        .collect();
    let contents = messages
        .iter()
        .filter_map(|m| {
            let role = match m.role {
                PromptRole::System => return None,
                PromptRole::User => "user",
                PromptRole::Assistant => "model",
            };
            Some(GeminiContent {
                role,
                parts: vec![GeminiPart {
                    text: m.content.clone(),
                }],
            })
        })
        .collect();

    GeminiRequest {
        system_instruction: (!system.is_empty()).then(|| GeminiSystem {
            parts: vec![GeminiPart {
                text: system.join("\n\n"),
            }],
        }),
        contents,
    }
}

#[derive(Deserialize)]
struct GeminiChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

pub(crate) fn parse_gemini_line(line: &str) -> Result<Frame> {
    let Some(data) = sse_data(line) else {
        return Ok(Frame::Skip);
    };
    if data.is_empty() {
        return Ok(Frame::Skip);
    }

    let chunk: GeminiChunk = serde_json::from_str(data)
        .map_err(|e| RagError::generation(format!("invalid Gemini stream chunk: {}", e)))?;
    if let Some(err) = chunk.error {
        return Err(RagError::generation(format!("Gemini: {}", err.message)));
    }

    let text: String = chunk
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();
    Ok(if text.is_empty() {
        Frame::Skip
    } else {
        Frame::Token(text)
    })
}

#[async_trait]
impl ChatModel for GeminiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream_chat(&self, messages: &[PromptMessage]) -> Result<TokenStream> {
        let request = self
            .client
            .post(format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&gemini_request(messages));
        start_stream("Gemini", request, parse_gemini_line).await
    }
}
