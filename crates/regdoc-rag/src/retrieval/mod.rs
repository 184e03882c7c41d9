//! Vector index and query-time retrieval

pub mod index;
mod search;

pub use index::{corpus_hash, BuildOptions, IndexManifest, ScoredChunk, VectorIndex};
pub use search::Retriever;
