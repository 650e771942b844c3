//! Chat orchestration: retrieve context for the latest message, build the
//! system message, and stream the generation service's reply.
//!
//! Retrieval is best-effort. If embedding or the similarity query fails, the
//! turn proceeds with an empty context instead of failing the request. A
//! generation service that cannot start streaming surfaces as one terminal
//! error item in the returned stream.

use std::sync::Arc;

use crate::context::{assemble, AssembledContext};
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::generation::{failed_stream, ChatModel, PromptMessage, TokenStream};
use crate::models::ChatMessage;
use crate::search::{retrieve, SearchParams, CHAT_MATCH_THRESHOLD, DEFAULT_MATCH_COUNT};
use crate::store::DocumentStore;

/// Instruction used when the caller supplies none.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Line placed between the instruction and the retrieved context.
pub const CONTEXT_HEADER: &str = "USE THE CONTEXT BELOW:";

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub retrieval: SearchParams,
    pub default_system_prompt: String,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            retrieval: SearchParams::new(CHAT_MATCH_THRESHOLD, DEFAULT_MATCH_COUNT),
            default_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// One chat turn: the sources that fed the context, and the reply stream.
pub struct ChatTurn {
    pub sources: Vec<String>,
    pub tokens: TokenStream,
}

/// Build the single system message.
///
/// The header and the context are always present, even when the context is
/// empty. A blank caller instruction falls back to `default_instruction`.
pub fn build_system_message(
    instruction: Option<&str>,
    default_instruction: &str,
    context: &str,
) -> String {
    let instruction = instruction
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(default_instruction);
    format!("{}\n\n{}\n{}", instruction, CONTEXT_HEADER, context)
}

#[derive(Clone)]
pub struct ChatOrchestrator {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn ChatModel>,
    options: ChatOptions,
}

impl ChatOrchestrator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
        options: ChatOptions,
    ) -> Self {
        Self {
            store,
            embedder,
            model,
            options,
        }
    }

    /// Retrieve context for `query`, degrading to an empty context on failure.
    pub async fn context_for(&self, query: &str) -> AssembledContext {
        match retrieve(
            self.store.as_ref(),
            self.embedder.as_ref(),
            query,
            self.options.retrieval,
        )
        .await
        {
            Ok(results) => assemble(&results),
            Err(err) => {
                tracing::warn!(error = %err, kind = err.kind(), "retrieval failed, continuing without context");
                AssembledContext::default()
            }
        }
    }

    /// Run one chat turn over the caller-held `conversation`.
    ///
    /// The last message's content is the retrieval query. The system
    /// message is sent first, followed by the whole conversation in order.
    pub async fn converse(
        &self,
        conversation: &[ChatMessage],
        system_instruction: Option<&str>,
    ) -> Result<ChatTurn> {
        let last = conversation.last().ok_or_else(|| {
            RagError::validation("conversation must contain at least one message")
        })?;

        let assembled = self.context_for(&last.content).await;
        tracing::info!(
            sources = ?assembled.sources,
            context_chars = assembled.context.len(),
            messages = conversation.len(),
            "context assembled"
        );

        let mut prompt = Vec::with_capacity(conversation.len() + 1);
        prompt.push(PromptMessage::system(build_system_message(
            system_instruction,
            &self.options.default_system_prompt,
            &assembled.context,
        )));
        prompt.extend(conversation.iter().map(PromptMessage::from));

        let tokens = match self.model.stream_chat(&prompt).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::error!(error = %err, model = self.model.model_name(), "generation failed to start");
                failed_stream(err)
            }
        };

        Ok(ChatTurn {
            sources: assembled.sources,
            tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::PromptRole;
    use crate::models::NewDocument;
    use crate::store::memory::InMemoryStore;
    use crate::testing::{FailingEmbedder, ScriptedChatModel, WordEmbedder};
    use futures::StreamExt;

    async fn seeded_store(embedder: &WordEmbedder) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert(&NewDocument {
                filename: "notes.txt".to_string(),
                content: "hello world".to_string(),
                embedding: embedder.embed("hello world").await.unwrap(),
            })
            .await
            .unwrap();
        store
    }

    async fn collect(turn: ChatTurn) -> Vec<Result<String>> {
        turn.tokens.collect().await
    }

    #[test]
    fn system_message_always_has_header_and_context() {
        assert_eq!(
            build_system_message(None, DEFAULT_SYSTEM_PROMPT, ""),
            "You are a helpful assistant.\n\nUSE THE CONTEXT BELOW:\n"
        );
        assert_eq!(
            build_system_message(Some("  Talk like a pirate. "), DEFAULT_SYSTEM_PROMPT, "[a]\nb"),
            "Talk like a pirate.\n\nUSE THE CONTEXT BELOW:\n[a]\nb"
        );
        assert_eq!(
            build_system_message(Some("   "), "Default.", "notes"),
            "Default.\n\nUSE THE CONTEXT BELOW:\nnotes"
        );
    }

    #[tokio::test]
    async fn converse_injects_context_and_forwards_conversation() {
        let embedder = Arc::new(WordEmbedder::new());
        let store = seeded_store(&embedder).await;
        let model = Arc::new(ScriptedChatModel::new(&["Hi", " there"]));
        let chat = ChatOrchestrator::new(store, embedder, model.clone(), ChatOptions::default());

        let conversation = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello, how can I help?"),
            ChatMessage::user("hello"),
        ];
        let turn = chat.converse(&conversation, Some("Be brief.")).await.unwrap();
        assert_eq!(turn.sources, vec!["notes.txt"]);

        let tokens: Vec<String> = collect(turn).await.into_iter().map(|t| t.unwrap()).collect();
        assert_eq!(tokens, vec!["Hi", " there"]);

        let prompt = model.last_prompt().unwrap();
        assert_eq!(prompt.len(), 4);
        assert_eq!(prompt[0].role, PromptRole::System);
        assert_eq!(
            prompt[0].content,
            "Be brief.\n\nUSE THE CONTEXT BELOW:\n[notes.txt]\nhello world"
        );
        assert_eq!(prompt[1].content, "hi");
        assert_eq!(prompt[2].role, PromptRole::Assistant);
        assert_eq!(prompt[3].content, "hello");
    }

    #[tokio::test]
    async fn retrieval_failure_degrades_to_empty_context() {
        let model = Arc::new(ScriptedChatModel::new(&["ok"]));
        let chat = ChatOrchestrator::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(FailingEmbedder),
            model.clone(),
            ChatOptions::default(),
        );

        let turn = chat.converse(&[ChatMessage::user("hello")], None).await.unwrap();
        assert!(turn.sources.is_empty());
        let items = collect(turn).await;
        assert_eq!(items, vec![Ok("ok".to_string())]);
        assert_eq!(
            model.last_prompt().unwrap()[0].content,
            "You are a helpful assistant.\n\nUSE THE CONTEXT BELOW:\n"
        );
    }

    #[tokio::test]
    async fn empty_generation_is_not_an_error() {
        let embedder = Arc::new(WordEmbedder::new());
        let store = seeded_store(&embedder).await;
        let chat = ChatOrchestrator::new(
            store,
            embedder,
            Arc::new(ScriptedChatModel::new(&[])),
            ChatOptions::default(),
        );
        let turn = chat.converse(&[ChatMessage::user("hello")], None).await.unwrap();
        assert!(collect(turn).await.is_empty());
    }

    #[tokio::test]
    async fn start_failure_is_a_single_terminal_error() {
        let chat = ChatOrchestrator::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(WordEmbedder::new()),
            Arc::new(ScriptedChatModel::failing_to_start()),
            ChatOptions::default(),
        );
        let turn = chat.converse(&[ChatMessage::user("hello")], None).await.unwrap();
        let items = collect(turn).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(RagError::Generation(_))));
    }

    #[tokio::test]
    async fn empty_conversation_is_rejected() {
        let model = Arc::new(ScriptedChatModel::new(&["x"]));
        let embedder = Arc::new(WordEmbedder::new());
        let chat = ChatOrchestrator::new(
            Arc::new(InMemoryStore::new()),
            embedder.clone(),
            model.clone(),
            ChatOptions::default(),
        );
        let err = chat.converse(&[], None).await.err().unwrap();
        assert!(matches!(err, RagError::Validation(_)));
        assert_eq!(embedder.calls(), 0);
        assert!(model.last_prompt().is_none());
    }
}
