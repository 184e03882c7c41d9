//! regdoc-rag: grounded question answering over UK regulatory documents
//!
//! Documents in the data directory are extracted, split into overlapping chunks,
//! embedded and persisted as a vector index. Questions are answered by retrieving
//! the closest chunks and asking an LLM to answer from that context only, with a
//! short window of the conversation replayed for follow-up questions.

pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod session;
pub mod types;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use generation::AnswerGenerator;
pub use ingestion::IngestPipeline;
pub use retrieval::{Retriever, VectorIndex};
pub use session::{ConversationMemory, SessionStore};
pub use types::{AnswerStatus, AskResponse, Chunk, ChunkMetadata, SourceDescriptor};
