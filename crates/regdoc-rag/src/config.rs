//! Configuration for the RAG system

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable that overrides `paths.project_root`
pub const PROJECT_ROOT_ENV: &str = "REGDOC_PROJECT_ROOT";

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "regdoc-rag.toml";

/// Main RAG system configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Corpus and index locations
    pub paths: PathsConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// LLM configuration
    pub llm: LlmConfig,
    /// Retrieval policy
    pub retrieval: RetrievalConfig,
    /// Conversation memory bounds
    pub memory: MemoryConfig,
    /// Server configuration
    pub server: ServerConfig,
}

impl RagConfig {
    /// Load configuration from a TOML file.
    ///
    /// With no explicit path, `regdoc-rag.toml` in the working directory is used if it
    /// exists, otherwise defaults apply. `REGDOC_PROJECT_ROOT` overrides the project root.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        if let Ok(root) = std::env::var(PROJECT_ROOT_ENV) {
            config.paths.project_root = PathBuf::from(root);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config '{}': {}", path.display(), e))
        })?;
        toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("Invalid config '{}': {}", path.display(), e)))
    }

    /// Reject parameter combinations the pipeline cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::Config("chunking.chunk_size must be at least 1".into()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be at least 1".into()));
        }
        if self.memory.window == 0 {
            return Err(Error::Config("memory.window must be at least 1".into()));
        }
        if self.memory.max_stored_turns < self.memory.window {
            return Err(Error::Config(format!(
                "memory.max_stored_turns ({}) must be >= memory.window ({})",
                self.memory.max_stored_turns, self.memory.window
            )));
        }
        if self.memory.max_sessions == 0 {
            return Err(Error::Config("memory.max_sessions must be at least 1".into()));
        }
        if self.embeddings.timeout_secs == 0 || self.llm.timeout_secs == 0 {
            return Err(Error::Config("provider timeouts must be non-zero".into()));
        }
        if self.embeddings.parallelism == 0 {
            return Err(Error::Config("embeddings.parallelism must be at least 1".into()));
        }
        Ok(())
    }

    /// Directory holding the source documents
    pub fn data_dir(&self) -> PathBuf {
        self.paths.project_root.join(&self.paths.data_dir)
    }

    /// Directory holding the persisted vector index
    pub fn index_dir(&self) -> PathBuf {
        self.paths.project_root.join(&self.paths.index_dir)
    }
}

/// Corpus and index locations, relative to a project root
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Project root
    pub project_root: PathBuf,
    /// Source documents directory (relative to the root)
    pub data_dir: PathBuf,
    /// Persisted index directory (relative to the root)
    pub index_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            data_dir: PathBuf::from("data"),
            index_dir: PathBuf::from("vector_index"),
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Which wire protocol a provider speaks
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Local Ollama server
    #[default]
    Ollama,
    /// Any OpenAI-compatible endpoint (Hugging Face router, vLLM, OpenAI)
    OpenaiCompatible,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider protocol
    pub provider: ProviderKind,
    /// Provider base URL
    pub base_url: String,
    /// Model used for both chunks and queries
    pub model: String,
    /// Embedding dimensions (384 for all-MiniLM-L6-v2)
    pub dimensions: usize,
    /// Environment variable holding the API key (OpenAI-compatible only)
    pub api_key_env: Option<String>,
    /// Concurrent embedding requests during index build
    pub parallelism: usize,
    /// Retries per chunk during index build
    pub max_retries: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "all-minilm".to_string(),
            dimensions: 384,
            api_key_env: None,
            parallelism: 4,
            max_retries: 2,
            timeout_secs: 30,
        }
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider protocol
    pub provider: ProviderKind,
    /// Provider base URL
    pub base_url: String,
    /// Generation model name
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Maximum generated tokens
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling
    pub top_p: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "llama3:8b-instruct".to_string(),
            api_key_env: "HUGGINGFACE_API_KEY".to_string(),
            max_tokens: 512,
            temperature: 0.1, // Low for faithful, repeatable answers
            top_p: 0.9,
            timeout_secs: 60,
        }
    }
}

/// Retrieval policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per question
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 4 }
    }
}

/// Conversation memory bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Turns included in each prompt
    pub window: usize,
    /// Turns kept per session before the oldest are evicted
    pub max_stored_turns: usize,
    /// Conversations kept by the server before the least recently used is dropped
    pub max_sessions: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window: 5,
            max_stored_turns: 100,
            max_sessions: 1000,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
        }
    }
}
