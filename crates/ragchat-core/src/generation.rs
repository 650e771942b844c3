//! Language-generation trait and prompt types.
//!
//! A [`ChatModel`] receives the full prompt (one system message followed by
//! the caller's conversation) and returns a lazy, single-pass stream of text
//! fragments. Concrete streaming clients live in the `ragchat` app crate.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;

use crate::error::{RagError, Result};
use crate::models::{ChatMessage, Role};

/// Stream of generated text fragments.
///
/// An `Err` item is terminal: nothing follows it. Dropping the stream
/// abandons the generation and closes the underlying transport.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Role of a message sent to the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

impl From<Role> for PromptRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => PromptRole::User,
            Role::Assistant => PromptRole::Assistant,
        }
    }
}

/// A message in the prompt sent to the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }
}

impl From<&ChatMessage> for PromptMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.into(),
            content: msg.content.clone(),
        }
    }
}

/// A streaming language-generation backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-flash-latest"`).
    fn model_name(&self) -> &str;

    /// Start generating a reply to `messages`.
    ///
    /// Returns `Err` when the stream cannot be started (connection refused,
    /// non-success status). Failures after the stream has started arrive
    /// as a terminal `Err` item inside the stream.
    async fn stream_chat(&self, messages: &[PromptMessage]) -> Result<TokenStream>;
}

/// A stream that yields a single terminal error.
pub fn failed_stream(err: RagError) -> TokenStream {
    Box::pin(futures::stream::once(async move { Err(err) }))
}
