//! Document and chunk types with source tracking

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Document formats accepted by the extractor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// PDF document
    Pdf,
    /// Plain text file
    Txt,
    /// Markdown file
    Markdown,
}

impl DocumentFormat {
    /// Detect format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" | "text" => Some(Self::Txt),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    /// Detect format from a path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Get display name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Pdf => "PDF",
            Self::Txt => "Text File",
            Self::Markdown => "Markdown",
        }
    }
}

/// Text of a single page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// Page number (1-indexed), unknown for unpaginated formats
    pub page_number: Option<u32>,
    /// Extracted text
    pub text: String,
}

/// A source document reduced to text, pages in order
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// File name, used as the chunk source
    pub source: String,
    /// Detected format
    pub format: DocumentFormat,
    /// Pages in document order
    pub pages: Vec<PageText>,
}

impl ExtractedDocument {
    /// Concatenated text plus the byte offset where each page starts.
    ///
    /// Pages are joined with a single newline.
    pub fn joined(&self) -> (String, Vec<(usize, Option<u32>)>) {
        let mut text = String::new();
        let mut starts = Vec::with_capacity(self.pages.len());

        for page in &self.pages {
            starts.push((text.len(), page.page_number));
            text.push_str(&page.text);
            text.push('\n');
        }

        (text, starts)
    }

    /// Total characters across pages
    pub fn char_count(&self) -> usize {
        self.pages.iter().map(|p| p.text.chars().count()).sum()
    }
}

/// Provenance of a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Source document file name
    pub source: String,
    /// Page holding the first character of the chunk
    pub page: Option<u32>,
}

impl ChunkMetadata {
    /// Source label, "Unknown" when absent
    pub fn source_label(&self) -> &str {
        if self.source.is_empty() {
            "Unknown"
        } else {
            &self.source
        }
    }

    /// Page label, "?" when unknown
    pub fn page_label(&self) -> String {
        self.page
            .map(|p| p.to_string())
            .unwrap_or_else(|| "?".to_string())
    }
}

/// A bounded, overlapping segment of one source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Text content, an exact substring of the document text
    pub text: String,
    /// Source information for display
    pub metadata: ChunkMetadata,
    /// Byte span in the document text
    pub char_start: usize,
    pub char_end: usize,
}

impl Chunk {
    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}
