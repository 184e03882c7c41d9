//! Query-time retrieval: embed the question, search the index

use std::sync::Arc;
use std::time::Duration;

use crate::config::RagConfig;
use crate::error::Result;
use crate::providers::{normalize, with_timeout, EmbeddingProvider};
use crate::types::Chunk;

use super::index::{ScoredChunk, VectorIndex};

/// Top-k retriever over a shared index
pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
    timeout: Duration,
}

impl Retriever {
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        top_k: usize,
        timeout: Duration,
    ) -> Self {
        Self { index, embedder, top_k, timeout }
    }

    pub fn from_config(
        config: &RagConfig,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self::new(index, embedder, config.retrieval.top_k, config.embeddings.timeout())
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// The `top_k` most relevant chunks, most relevant first
    pub async fn retrieve(&self, question: &str) -> Result<Vec<Chunk>> {
        Ok(self
            .retrieve_with_k(question, self.top_k)
            .await?
            .into_iter()
            .map(|scored| scored.chunk)
            .collect())
    }

    /// Like [`Retriever::retrieve`], keeping distances
    pub async fn retrieve_scored(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        self.retrieve_with_k(question, self.top_k).await
    }

    /// Retrieve an explicit number of chunks.
    ///
    /// Embedding is never retried here; a timeout surfaces as `Unavailable`.
    pub async fn retrieve_with_k(&self, question: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = with_timeout("query embedding", self.timeout, self.embedder.embed(question)).await?;
        normalize(&mut query);

        let results = self.index.search(&query, k)?;
        tracing::debug!(
            "Retrieved {} chunks (best distance {:?})",
            results.len(),
            results.first().map(|r| r.distance)
        );
        Ok(results)
    }
}
