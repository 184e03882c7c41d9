//! Document ingestion: extraction, chunking and index building

mod chunker;
mod parser;
mod processor;

pub use chunker::{TextChunker, DEFAULT_SEPARATORS};
pub use parser::{list_documents, load_directory, DocumentExtractor};
pub use processor::IngestPipeline;
