//! Wires configuration to concrete collaborators.
//!
//! Every command and the HTTP server build the same set of services: the
//! SQLite store, the configured embedder and chat model, and the document
//! extractor. The pipelines in `ragchat_core` only see the traits.

use std::sync::Arc;

use anyhow::Result;

use ragchat_core::chat::{ChatOptions, ChatOrchestrator};
use ragchat_core::embedding::Embedder;
use ragchat_core::generation::ChatModel;
use ragchat_core::ingest::{Ingestor, TextExtractor};
use ragchat_core::store::DocumentStore;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::extract::DocumentExtractor;
use crate::generation::create_chat_model;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn DocumentStore>,
    pub embedder: Arc<dyn Embedder>,
    pub model: Arc<dyn ChatModel>,
    pub extractor: Arc<dyn TextExtractor>,
    pub config: Arc<Config>,
}

impl Services {
    /// Open the database (migrating it if needed) and build the providers
    /// named in `config`.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;

        let embedder = create_embedder(&config.embedding)?;
        let model = create_chat_model(&config.generation)?;
        tracing::debug!(
            embedding = embedder.model_name(),
            generation = model.model_name(),
            "services ready"
        );

        Ok(Self::from_parts(
            Arc::new(SqliteStore::new(pool)),
            embedder,
            model,
            Arc::new(DocumentExtractor),
            config,
        ))
    }

    /// Assemble services from explicit collaborators.
    pub fn from_parts(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
        extractor: Arc<dyn TextExtractor>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            embedder,
            model,
            extractor,
            config: Arc::new(config.clone()),
        }
    }

    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(
            self.store.clone(),
            self.embedder.clone(),
            self.extractor.clone(),
            self.config.ingest.options(),
        )
    }

    pub fn orchestrator(&self) -> ChatOrchestrator {
        ChatOrchestrator::new(
            self.store.clone(),
            self.embedder.clone(),
            self.model.clone(),
            ChatOptions {
                retrieval: self.config.retrieval.chat_params(),
                default_system_prompt: self.config.chat.default_system_prompt.clone(),
            },
        )
    }
}
