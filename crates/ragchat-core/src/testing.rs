//! Collaborator fakes shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::generation::{ChatModel, PromptMessage, TokenStream};
use crate::ingest::{SourceFormat, TextExtractor};
use crate::models::{DeleteOutcome, DocumentSummary, NewDocument, RetrievedDocument};
use crate::store::DocumentStore;

const WORD_DIMS: usize = 64;

/// Deterministic bag-of-words embedder: each lowercase word increments one
/// FNV-1a bucket.
pub struct WordEmbedder {
    calls: AtomicUsize,
    last_input: Mutex<Option<String>>,
}

impl WordEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            last_input: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_input(&self) -> Option<String> {
        self.last_input.lock().unwrap().clone()
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf29ce484222325u64, |hash, b| {
        (hash ^ b as u64).wrapping_mul(0x100000001b3)
    })
}

#[async_trait]
impl Embedder for WordEmbedder {
    fn model_name(&self) -> &str {
        "word-buckets"
    }

    fn dims(&self) -> usize {
        WORD_DIMS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_input.lock().unwrap() = Some(text.to_string());
        let mut v = vec![0.0f32; WORD_DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            v[(fnv1a(&word.to_lowercase()) % WORD_DIMS as u64) as usize] += 1.0;
        }
        Ok(v)
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }

    fn dims(&self) -> usize {
        WORD_DIMS
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::embedding("rate limited (HTTP 429)"))
    }
}

/// Wraps a store and counts calls that reach it.
pub struct CountingStore<S> {
    inner: S,
    inserts: AtomicUsize,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            inserts: AtomicUsize::new(0),
        }
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for CountingStore<S> {
    async fn insert(&self, doc: &NewDocument) -> Result<String> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(doc).await
    }

    async fn list(&self) -> Result<Vec<DocumentSummary>> {
        self.inner.list().await
    }

    async fn delete(&self, id: &str) -> Result<DeleteOutcome> {
        self.inner.delete(id).await
    }

    async fn match_documents(
        &self,
        query: &[f32],
        threshold: f64,
        count: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        self.inner.match_documents(query, threshold, count).await
    }
}

pub struct StubExtractor {
    output: Option<String>,
    calls: AtomicUsize,
}

impl StubExtractor {
    pub fn returning(text: &str) -> Self {
        Self {
            output: Some(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            output: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextExtractor for StubExtractor {
    async fn extract(&self, _bytes: Vec<u8>, _format: SourceFormat) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.output
            .clone()
            .ok_or_else(|| RagError::extraction("corrupt document"))
    }
}

/// Chat model replaying fixed tokens and recording the prompt it received.
pub struct ScriptedChatModel {
    tokens: Option<Vec<String>>,
    last_prompt: Mutex<Option<Vec<PromptMessage>>>,
}

impl ScriptedChatModel {
    pub fn new(tokens: &[&str]) -> Self {
        Self {
            tokens: Some(tokens.iter().map(|t| t.to_string()).collect()),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn failing_to_start() -> Self {
        Self {
            tokens: None,
            last_prompt: Mutex::new(None),
        }
    }

    pub fn last_prompt(&self) -> Option<Vec<PromptMessage>> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn stream_chat(&self, messages: &[PromptMessage]) -> Result<TokenStream> {
        *self.last_prompt.lock().unwrap() = Some(messages.to_vec());
        match &self.tokens {
            Some(tokens) => {
                let items: Vec<Result<String>> = tokens.iter().cloned().map(Ok).collect();
                Ok(Box::pin(futures::stream::iter(items)))
            }
            None => Err(RagError::generation("connection refused")),
        }
    }
}
