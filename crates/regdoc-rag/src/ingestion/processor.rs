//! Ingestion pipeline: extract, chunk, embed and persist

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::providers::{embedder_from_config, EmbeddingProvider};
use crate::retrieval::{BuildOptions, VectorIndex};
use crate::types::{BuildReport, Chunk, DocumentSummary};

use super::chunker::TextChunker;
use super::parser::load_directory;

/// Builds the vector index from the data directory
pub struct IngestPipeline {
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: TextChunker,
}

impl IngestPipeline {
    pub fn new(config: RagConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        config.validate()?;
        let chunker = TextChunker::from_config(&config.chunking)?;
        Ok(Self { config, embedder, chunker })
    }

    /// Create with the embedding provider named in the configuration
    pub fn from_config(config: RagConfig) -> Result<Self> {
        let embedder = embedder_from_config(&config.embeddings)?;
        Self::new(config, embedder)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.config.data_dir()
    }

    pub fn index_dir(&self) -> PathBuf {
        self.config.index_dir()
    }

    /// Extract and chunk every document, in file name order
    pub async fn load_and_chunk(&self) -> Result<(Vec<DocumentSummary>, Vec<Chunk>)> {
        let data_dir = self.data_dir();
        let chunker = self.chunker.clone();

        tokio::task::spawn_blocking(move || {
            let documents = load_directory(&data_dir)?;

            let per_document: Vec<(DocumentSummary, Vec<Chunk>)> = documents
                .par_iter()
                .map(|doc| {
                    let chunks = chunker.chunk_document(doc);
                    let summary = DocumentSummary {
                        source: doc.source.clone(),
                        format: doc.format,
                        pages: doc.pages.len(),
                        chars: doc.char_count(),
                        chunks: chunks.len(),
                    };
                    (summary, chunks)
                })
                .collect();

            let mut summaries = Vec::with_capacity(per_document.len());
            let mut chunks = Vec::new();
            for (summary, doc_chunks) in per_document {
                tracing::info!(
                    "  {} : {} pages, {} chars, {} chunks",
                    summary.source,
                    summary.pages,
                    summary.chars,
                    summary.chunks
                );
                if summary.chunks == 0 {
                    tracing::warn!("{} contains no text", summary.source);
                }
                summaries.push(summary);
                chunks.extend(doc_chunks);
            }

            if chunks.is_empty() {
                return Err(Error::EmptyCorpus(data_dir));
            }
            Ok((summaries, chunks))
        })
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    /// Build the index, or open the existing one unless `force_rebuild` is set
    pub async fn build_index(&self, force_rebuild: bool) -> Result<(VectorIndex, BuildReport)> {
        let start = Instant::now();
        let index_dir = self.index_dir();
        let reused_existing = !force_rebuild && VectorIndex::exists(&index_dir);

        let (documents, chunks) = self.load_and_chunk().await?;
        tracing::info!("Created {} chunks from {} documents", chunks.len(), documents.len());

        if reused_existing {
            tracing::info!("Index already exists at {}, skipping embedding", index_dir.display());
        }

        let options = BuildOptions::from_config(&self.config, force_rebuild);
        let index = VectorIndex::build(&index_dir, &chunks, self.embedder.as_ref(), &options)
            .await
            .map_err(|e| {
                tracing::error!("Index build aborted: {}", e);
                e
            })?;

        let report = BuildReport {
            documents,
            total_chunks: chunks.len(),
            records: index.len(),
            reused_existing,
            processing_time_ms: start.elapsed().as_millis() as u64,
        };

        tracing::info!(
            "Index ready: {} records in {}ms",
            report.records,
            report.processing_time_ms
        );
        Ok((index, report))
    }
}
