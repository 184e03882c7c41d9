//! Response types for questions and index builds

use serde::{Deserialize, Serialize};

use super::document::{Chunk, DocumentFormat};
use crate::providers::ProviderError;

/// Answer when retrieval finds nothing to ground on
pub const NO_DOCUMENTS_MESSAGE: &str = "No relevant documents found in the database.";

/// Sentence the model must emit when the evidence does not hold the answer
pub const FALLBACK_ANSWER: &str = "I cannot find this information in the provided documents. Please check the official UK government website at gov.uk for the most current guidance.";

pub const RATE_LIMITED_MESSAGE: &str = "Rate limit hit. Wait 60 seconds and try again.";

pub const UNAVAILABLE_MESSAGE: &str = "Model is loading (cold start). Wait 30-60s and retry.";

pub const UNAUTHORIZED_MESSAGE: &str =
    "API key invalid. Check the LLM API key configured for this server.";

pub const CONTACT_SUPPORT_HINT: &str =
    "If this keeps happening, contact support with the message above.";

/// Characters of chunk text shown in a source preview
pub const PREVIEW_CHARS: usize = 100;

/// Display form of a retrieved chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Source document, "Unknown" when absent
    pub source: String,
    /// Page number, "?" when unknown
    pub page: String,
    /// First characters of the chunk followed by an ellipsis
    pub preview: String,
}

impl SourceDescriptor {
    /// Build a descriptor from a retrieved chunk
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            source: chunk.metadata.source_label().to_string(),
            page: chunk.metadata.page_label(),
            preview: preview(&chunk.text),
        }
    }
}

/// Cut text to `PREVIEW_CHARS` characters and append an ellipsis
pub fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    out.push_str("...");
    out
}

/// How a question was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// The model produced an answer
    Answered,
    /// Retrieval returned nothing, no generation attempted
    NoDocuments,
    /// Provider throttled the request
    RateLimited,
    /// Provider cold start, overload or timeout
    Unavailable,
    /// Provider rejected the credentials
    Unauthorized,
    /// Anything else
    Error,
}

impl AnswerStatus {
    /// Whether resubmitting the same question later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Unavailable)
    }
}

/// Response to a question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    /// Generated answer or user-facing failure message
    pub answer: String,
    /// One descriptor per retrieved chunk, in retrieval order
    pub sources: Vec<SourceDescriptor>,
    /// Number of chunks used as evidence
    pub num_chunks: usize,
    /// Outcome tag
    pub status: AnswerStatus,
}

impl AskResponse {
    /// A grounded answer built from the retrieved chunks
    pub fn answered(answer: String, chunks: &[Chunk]) -> Self {
        Self {
            answer,
            sources: chunks.iter().map(SourceDescriptor::from_chunk).collect(),
            num_chunks: chunks.len(),
            status: AnswerStatus::Answered,
        }
    }

    /// Retrieval found nothing
    pub fn no_documents() -> Self {
        Self::empty(NO_DOCUMENTS_MESSAGE.to_string(), AnswerStatus::NoDocuments)
    }

    /// A provider failure mapped to its user-facing message
    pub fn from_provider_error(err: &ProviderError) -> Self {
        match err {
            ProviderError::RateLimited(_) => {
                Self::empty(RATE_LIMITED_MESSAGE.to_string(), AnswerStatus::RateLimited)
            }
            ProviderError::Unavailable(_) => {
                Self::empty(UNAVAILABLE_MESSAGE.to_string(), AnswerStatus::Unavailable)
            }
            ProviderError::Unauthorized(_) => {
                Self::empty(UNAUTHORIZED_MESSAGE.to_string(), AnswerStatus::Unauthorized)
            }
            ProviderError::Unknown { kind, message } => Self::empty(
                format!("Unexpected error ({}): {}. {}", kind, message, CONTACT_SUPPORT_HINT),
                AnswerStatus::Error,
            ),
        }
    }

    fn empty(answer: String, status: AnswerStatus) -> Self {
        Self {
            answer,
            sources: Vec::new(),
            num_chunks: 0,
            status,
        }
    }
}

/// Per-document line of a build report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// Source file name
    pub source: String,
    /// Detected format
    pub format: DocumentFormat,
    /// Pages extracted
    pub pages: usize,
    /// Characters extracted
    pub chars: usize,
    /// Chunks created
    pub chunks: usize,
}

/// Outcome of an index build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    /// Documents read from the data directory
    pub documents: Vec<DocumentSummary>,
    /// Chunks produced by the chunker
    pub total_chunks: usize,
    /// Records in the index after the build
    pub records: usize,
    /// True when an existing index was opened instead of rebuilt
    pub reused_existing: bool,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}
