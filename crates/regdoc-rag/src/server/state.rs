//! Application state for the RAG server

use std::sync::Arc;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::generation::{AnswerGenerator, GenerationSettings};
use crate::providers::{embedder_from_config, llm_from_config, EmbeddingProvider, LlmProvider};
use crate::retrieval::{Retriever, VectorIndex};
use crate::session::SessionStore;

/// Index and LLM state behind `/ready`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub records: usize,
    pub llm_reachable: bool,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.records > 0 && self.llm_reachable
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: RagConfig,
    index: Arc<VectorIndex>,
    generator: AnswerGenerator,
    sessions: SessionStore,
}

impl AppState {
    /// Open the persisted index and connect the configured providers
    pub async fn new(config: RagConfig) -> Result<Self> {
        let index_dir = config.index_dir();
        let index = VectorIndex::open(&index_dir).map_err(|e| match e {
            Error::NotFound { what, .. } => Error::NotFound {
                what,
                remedy: "Run `regdoc ingest` first.".to_string(),
            },
            other => other,
        })?;
        tracing::info!("Vector index loaded: {} records", index.len());

        let embedder = embedder_from_config(&config.embeddings)?;
        index.check_compatible(embedder.model(), embedder.dimensions())?;

        let llm = llm_from_config(&config.llm)?;
        if llm.health_check().await {
            tracing::info!("LLM provider {} is reachable", llm.name());
        } else {
            tracing::warn!(
                "LLM provider {} at {} is not reachable; questions will fail until it is",
                llm.name(),
                config.llm.base_url
            );
        }

        Ok(Self::from_parts(config, Arc::new(index), embedder, llm))
    }

    /// Assemble state from already-built components
    pub fn from_parts(
        config: RagConfig,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        let retriever = Arc::new(Retriever::from_config(&config, index.clone(), embedder));
        let generator = AnswerGenerator::new(retriever, llm, GenerationSettings::from_config(&config));
        let sessions = SessionStore::new(config.memory.max_stored_turns, config.memory.max_sessions);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                index,
                generator,
                sessions,
            }),
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.inner.index
    }

    pub fn generator(&self) -> &AnswerGenerator {
        &self.inner.generator
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    /// Ready when the index holds records and the LLM answers its health check
    pub async fn readiness(&self) -> Readiness {
        let records = self.inner.index.len();
        let llm_reachable = self.inner.generator.llm().health_check().await;
        Readiness { records, llm_reachable }
    }
}
