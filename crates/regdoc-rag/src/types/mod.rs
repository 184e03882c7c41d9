//! Core types for the RAG system

pub mod document;
pub mod response;

pub use document::{Chunk, ChunkMetadata, DocumentFormat, ExtractedDocument, PageText};
pub use response::{
    AnswerStatus, AskResponse, BuildReport, DocumentSummary, SourceDescriptor, FALLBACK_ANSWER,
    NO_DOCUMENTS_MESSAGE,
};
