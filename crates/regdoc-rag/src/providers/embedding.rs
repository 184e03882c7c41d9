//! Embedding provider trait for generating text embeddings

use async_trait::async_trait;

use super::error::ProviderError;

/// Trait for generating text embeddings
///
/// The same provider and model must embed both chunks and queries, otherwise
/// distances between them are meaningless.
///
/// Implementations:
/// - `OllamaEmbedder`: Local Ollama server (all-minilm, nomic-embed-text)
/// - `OpenAiCompatEmbedder`: Any OpenAI-compatible `/embeddings` endpoint
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Get embedding dimensions (e.g., 384 for all-minilm)
    fn dimensions(&self) -> usize;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> bool;

    /// Model identifier, recorded in the index manifest
    fn model(&self) -> &str;
}

/// Scale a vector to unit length so L2 and cosine orderings agree.
///
/// A zero vector is left unchanged.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}
