//! Provider abstractions for embeddings and chat completion
//!
//! Trait objects let the pipeline switch between a local Ollama server and any
//! OpenAI-compatible endpoint. Every adapter classifies its failures into
//! [`ProviderError`] before they reach the core.

pub mod embedding;
pub mod error;
pub mod llm;
pub mod ollama;
pub mod openai_compat;

use std::sync::Arc;

use crate::config::{EmbeddingConfig, LlmConfig, ProviderKind};
use crate::error::Result;

pub use embedding::{normalize, EmbeddingProvider};
pub use error::{with_timeout, ProviderError};
pub use llm::{ChatMessage, CompletionRequest, LlmProvider, Role};

/// Build the configured embedding provider
pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.provider {
        ProviderKind::Ollama => Arc::new(ollama::OllamaEmbedder::new(config)?),
        ProviderKind::OpenaiCompatible => Arc::new(openai_compat::OpenAiCompatEmbedder::new(config)?),
    };
    tracing::info!("Embedding provider: {:?} ({})", config.provider, config.model);
    Ok(embedder)
}

/// Build the configured LLM provider
pub fn llm_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    let llm: Arc<dyn LlmProvider> = match config.provider {
        ProviderKind::Ollama => Arc::new(ollama::OllamaLlm::new(config)?),
        ProviderKind::OpenaiCompatible => Arc::new(openai_compat::OpenAiCompatLlm::new(config)?),
    };
    tracing::info!("LLM provider: {} ({})", llm.name(), llm.model());
    Ok(llm)
}
