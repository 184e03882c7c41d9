//! Persisted vector index over embedded chunks
//!
//! On-disk layout under the index directory:
//! - `manifest.json`: model, dimensions, record count and chunking parameters
//! - `records.redb`: one bincode-encoded record per chunk, keyed by insertion order
//!
//! Records are loaded into memory on open and searched exhaustively, which keeps
//! results exact for corpora of a few thousand chunks. Builds write to a sibling
//! staging directory and are swapped into place only once complete.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use parking_lot::RwLock;
use rayon::prelude::*;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::providers::{normalize, with_timeout, EmbeddingProvider, ProviderError};
use crate::types::Chunk;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const RECORDS_FILE: &str = "records.redb";
pub const FORMAT_VERSION: u32 = 1;

/// Builds of a few thousand chunks finish well within this
pub const DEFAULT_LOCK_STALE_AFTER: Duration = Duration::from_secs(60 * 60);

const RECORDS: TableDefinition<u64, &[u8]> = TableDefinition::new("records");

/// Description of a persisted index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    /// Embedding model the records were produced with
    pub embedding_model: String,
    pub dimensions: usize,
    pub record_count: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub built_at: DateTime<Utc>,
    /// SHA-256 over the chunk sources and texts
    pub corpus_hash: String,
}

/// Parameters of an index build
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Re-embed even if an index already exists
    pub force_rebuild: bool,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Concurrent embedding requests
    pub parallelism: usize,
    /// Retries per chunk for transient provider failures
    pub max_retries: u32,
    /// First backoff delay, doubled on every retry
    pub retry_base_delay: Duration,
    pub embed_timeout: Duration,
    /// Age after which a leftover build lock is considered abandoned
    pub lock_stale_after: Duration,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            force_rebuild: false,
            chunk_size: 1000,
            chunk_overlap: 200,
            parallelism: 4,
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
            embed_timeout: Duration::from_secs(30),
            lock_stale_after: DEFAULT_LOCK_STALE_AFTER,
        }
    }
}

impl BuildOptions {
    pub fn from_config(config: &RagConfig, force_rebuild: bool) -> Self {
        Self {
            force_rebuild,
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            parallelism: config.embeddings.parallelism,
            max_retries: config.embeddings.max_retries,
            retry_base_delay: Duration::from_secs(1),
            embed_timeout: config.embeddings.timeout(),
            lock_stale_after: DEFAULT_LOCK_STALE_AFTER,
        }
    }
}

/// A chunk returned by a search, with its cosine distance to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Record id, equal to the chunk's position at build time
    pub id: u64,
    pub chunk: Chunk,
    /// `1 - cosine similarity`; lower is more relevant
    pub distance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    chunk: Chunk,
    vector: Vec<f32>,
}

struct IndexState {
    manifest: IndexManifest,
    records: Vec<StoredRecord>,
}

/// Read-many, write-rarely vector index
pub struct VectorIndex {
    dir: PathBuf,
    state: RwLock<IndexState>,
}

impl VectorIndex {
    /// Whether an index has been persisted at `dir`
    pub fn exists(dir: &Path) -> bool {
        dir.join(MANIFEST_FILE).is_file()
    }

    /// Open a persisted index
    pub fn open(dir: &Path) -> Result<Self> {
        let state = load_state(dir)?;
        tracing::info!(
            "Opened vector index at {} ({} records, model {})",
            dir.display(),
            state.records.len(),
            state.manifest.embedding_model
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            state: RwLock::new(state),
        })
    }

    /// Embed `chunks` and persist them at `dir`.
    ///
    /// Without `force_rebuild`, an existing index is opened as-is and nothing is embedded.
    pub async fn build(
        dir: &Path,
        chunks: &[Chunk],
        embedder: &dyn EmbeddingProvider,
        options: &BuildOptions,
    ) -> Result<Self> {
        if !options.force_rebuild && Self::exists(dir) {
            let index = Self::open(dir)?;
            if index.manifest().corpus_hash != corpus_hash(chunks) {
                tracing::warn!(
                    "Documents changed since the index was built; rebuild to pick up the changes"
                );
            }
            return Ok(index);
        }

        let _lock = BuildLock::acquire(dir, options.lock_stale_after)?;
        let (staging, state) = stage(dir, chunks, embedder, options).await?;
        swap_into_place(&staging, dir)?;
        tracing::info!("Vector index written to {} ({} records)", dir.display(), state.records.len());

        Ok(Self {
            dir: dir.to_path_buf(),
            state: RwLock::new(state),
        })
    }

    /// Rebuild this index in place; searches keep using the old records until the swap
    pub async fn rebuild(
        &self,
        chunks: &[Chunk],
        embedder: &dyn EmbeddingProvider,
        options: &BuildOptions,
    ) -> Result<()> {
        let _lock = BuildLock::acquire(&self.dir, options.lock_stale_after)?;
        let (staging, new_state) = stage(&self.dir, chunks, embedder, options).await?;

        let mut state = self.state.write();
        swap_into_place(&staging, &self.dir)?;
        *state = new_state;
        tracing::info!("Vector index rebuilt ({} records)", state.records.len());
        Ok(())
    }

    /// The `k` records closest to `query`, nearest first; ties keep insertion order
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let state = self.state.read();
        if k == 0 || state.records.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != state.manifest.dimensions {
            return Err(Error::vector_db(format!(
                "query has {} dimensions, index expects {}",
                query.len(),
                state.manifest.dimensions
            )));
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut scored: Vec<(usize, f32)> = state
            .records
            .par_iter()
            .enumerate()
            .map(|(i, record)| (i, cosine_distance(&query, &record.vector)))
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, distance)| ScoredChunk {
                id: i as u64,
                chunk: state.records[i].chunk.clone(),
                distance,
            })
            .collect())
    }

    /// Fail if the index was built with a different embedding model or size
    pub fn check_compatible(&self, model: &str, dimensions: usize) -> Result<()> {
        let state = self.state.read();
        let manifest = &state.manifest;
        if manifest.embedding_model != model || manifest.dimensions != dimensions {
            return Err(Error::Config(format!(
                "index was built with {} ({} dims) but the configured embedder is {} ({} dims); rebuild the index",
                manifest.embedding_model, manifest.dimensions, model, dimensions
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn manifest(&self) -> IndexManifest {
        self.state.read().manifest.clone()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Vectors are unit length, so the dot product is the cosine similarity
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>()
}

/// Hash identifying the chunked corpus
pub fn corpus_hash(chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.metadata.source.as_bytes());
        hasher.update([0u8]);
        hasher.update(chunk.text.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

fn db_err(e: impl std::fmt::Display) -> Error {
    Error::vector_db(e.to_string())
}

/// `<parent>/.<name>.<suffix>` next to the index directory
fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("vector_index");
    let parent = dir
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    parent.join(format!(".{}.{}", name, suffix))
}

/// Exclusive claim on building one index location, released on drop.
///
/// The lock file records the owner's pid and start time. A lock older than
/// `stale_after` is assumed to belong to a crashed build and is taken over.
struct BuildLock {
    path: PathBuf,
}

impl BuildLock {
    fn acquire(dir: &Path, stale_after: Duration) -> Result<Self> {
        let path = sibling(dir, "lock");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        match Self::create(&path) {
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let owner = fs::read_to_string(&path).unwrap_or_default();
                let owner = owner.trim();
                let age = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|modified| modified.elapsed().ok());

                match age {
                    Some(age) if age > stale_after => {
                        tracing::warn!(
                            "Taking over stale build lock {} ({}, {:?} old)",
                            path.display(),
                            owner,
                            age
                        );
                        fs::remove_file(&path)?;
                        Self::create(&path).map_err(|e| Self::held(&path, owner, e))
                    }
                    _ => Err(Self::held(&path, owner, e)),
                }
            }
            other => other.map_err(Error::from),
        }
    }

    fn create(path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let lock = Self { path: path.to_path_buf() };
        writeln!(file, "pid={} started={}", std::process::id(), Utc::now().to_rfc3339())?;
        Ok(lock)
    }

    fn held(path: &Path, owner: &str, e: std::io::Error) -> Error {
        if e.kind() != ErrorKind::AlreadyExists {
            return e.into();
        }
        Error::vector_db(format!(
            "another build holds {} ({}); wait for it to finish or remove a stale lock",
            path.display(),
            if owner.is_empty() { "owner unknown" } else { owner }
        ))
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove build lock {}: {}", self.path.display(), e);
        }
    }
}

/// Embed every chunk and write a complete index to the staging directory
async fn stage(
    dir: &Path,
    chunks: &[Chunk],
    embedder: &dyn EmbeddingProvider,
    options: &BuildOptions,
) -> Result<(PathBuf, IndexState)> {
    tracing::info!(
        "Embedding {} chunks with {} (parallelism {})",
        chunks.len(),
        embedder.model(),
        options.parallelism
    );

    let vectors = embed_all(chunks, embedder, options).await?;

    let dimensions = embedder.dimensions();
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
        return Err(Error::vector_db(format!(
            "embedding model returned {} dimensions, configured for {}",
            bad.len(),
            dimensions
        )));
    }

    let manifest = IndexManifest {
        format_version: FORMAT_VERSION,
        embedding_model: embedder.model().to_string(),
        dimensions,
        record_count: chunks.len(),
        chunk_size: options.chunk_size,
        chunk_overlap: options.chunk_overlap,
        built_at: Utc::now(),
        corpus_hash: corpus_hash(chunks),
    };

    let records: Vec<StoredRecord> = chunks
        .iter()
        .cloned()
        .zip(vectors)
        .map(|(chunk, vector)| StoredRecord { chunk, vector })
        .collect();

    let staging = sibling(dir, "staging");
    let target = staging.clone();
    let state = tokio::task::spawn_blocking(move || {
        write_records(&target, &manifest, &records)?;
        Ok::<_, Error>(IndexState { manifest, records })
    })
    .await
    .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;

    Ok((staging, state))
}

/// Embed in bounded parallel batches, keeping output order equal to input order
async fn embed_all(
    chunks: &[Chunk],
    embedder: &dyn EmbeddingProvider,
    options: &BuildOptions,
) -> Result<Vec<Vec<f32>>> {
    stream::iter(chunks.iter().enumerate())
        .map(|(i, chunk)| async move {
            let mut vector = embed_with_retry(embedder, &chunk.text, options)
                .await
                .map_err(|e| {
                    tracing::error!("Embedding chunk {} of {} failed: {}", i, chunk.metadata.source, e);
                    Error::Provider(e)
                })?;
            normalize(&mut vector);
            tracing::debug!("Embedded chunk {} ({} chars)", i, chunk.char_len());
            Ok::<_, Error>(vector)
        })
        .buffered(options.parallelism.max(1))
        .try_collect()
        .await
}

async fn embed_with_retry(
    embedder: &dyn EmbeddingProvider,
    text: &str,
    options: &BuildOptions,
) -> std::result::Result<Vec<f32>, ProviderError> {
    let mut attempt = 0u32;
    loop {
        match with_timeout("embedding", options.embed_timeout, embedder.embed(text)).await {
            Ok(vector) => return Ok(vector),
            Err(e) if e.is_transient() && attempt < options.max_retries => {
                let delay = options.retry_base_delay * 2u32.pow(attempt);
                tracing::warn!(
                    "Embedding failed (attempt {}/{}), retrying in {:?}: {}",
                    attempt + 1,
                    options.max_retries + 1,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn write_records(dir: &Path, manifest: &IndexManifest, records: &[StoredRecord]) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;

    let db = Database::create(dir.join(RECORDS_FILE)).map_err(db_err)?;
    let txn = db.begin_write().map_err(db_err)?;
    {
        let mut table = txn.open_table(RECORDS).map_err(db_err)?;
        for (id, record) in records.iter().enumerate() {
            let bytes = bincode::serde::encode_to_vec(record, bincode::config::standard())
                .map_err(db_err)?;
            table.insert(id as u64, bytes.as_slice()).map_err(db_err)?;
        }
    }
    txn.commit().map_err(db_err)?;
    drop(db);

    // Manifest last: its presence marks a complete index
    fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec_pretty(manifest)?)?;
    Ok(())
}

fn load_state(dir: &Path) -> Result<IndexState> {
    let manifest_path = dir.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Err(Error::not_found(
            format!("Vector index at '{}'", dir.display()),
            "Run `regdoc ingest` to build it first.",
        ));
    }

    let manifest: IndexManifest = serde_json::from_slice(&fs::read(&manifest_path)?)?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(Error::vector_db(format!(
            "unsupported index format version {}; rebuild the index",
            manifest.format_version
        )));
    }

    let records_path = dir.join(RECORDS_FILE);
    if !records_path.is_file() {
        return Err(Error::vector_db(format!("index corrupt: {} is missing", RECORDS_FILE)));
    }

    let db = Database::open(&records_path).map_err(db_err)?;
    let txn = db.begin_read().map_err(db_err)?;
    let table = txn.open_table(RECORDS).map_err(db_err)?;

    let mut records = Vec::with_capacity(manifest.record_count);
    for entry in table.iter().map_err(db_err)? {
        let (_, value) = entry.map_err(db_err)?;
        let (record, _): (StoredRecord, usize) =
            bincode::serde::decode_from_slice(value.value(), bincode::config::standard())
                .map_err(db_err)?;

        if record.vector.len() != manifest.dimensions {
            return Err(Error::vector_db(format!(
                "index corrupt: record has {} dimensions, manifest says {}",
                record.vector.len(),
                manifest.dimensions
            )));
        }
        records.push(record);
    }

    if records.len() != manifest.record_count {
        return Err(Error::vector_db(format!(
            "index corrupt: manifest lists {} records but {} were found",
            manifest.record_count,
            records.len()
        )));
    }

    Ok(IndexState { manifest, records })
}

fn swap_into_place(staging: &Path, dir: &Path) -> Result<()> {
    let retired = sibling(dir, "old");
    if retired.exists() {
        fs::remove_dir_all(&retired)?;
    }
    if dir.exists() {
        fs::rename(dir, &retired)?;
    }
    fs::rename(staging, dir)?;

    if retired.exists() {
        if let Err(e) = fs::remove_dir_all(&retired) {
            tracing::warn!("Failed to remove previous index {}: {}", retired.display(), e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkMetadata;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Counts of the letters a, b and c
    struct LetterEmbedder {
        calls: AtomicUsize,
        fail_first: Option<ProviderError>,
    }

    impl LetterEmbedder {
        fn new() -> Self {
            Self { calls: AtomicUsize::new(0), fail_first: None }
        }

        fn failing_first(err: ProviderError) -> Self {
            Self { calls: AtomicUsize::new(0), fail_first: Some(err) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LetterEmbedder {
        async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                if let Some(err) = &self.fail_first {
                    return Err(err.clone());
                }
            }
            Ok(['a', 'b', 'c']
                .iter()
                .map(|l| text.chars().filter(|c| c == l).count() as f32)
                .collect())
        }

        fn dimensions(&self) -> usize {
            3
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn model(&self) -> &str {
            "letters"
        }
    }

    fn chunk(source: &str, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            metadata: ChunkMetadata { source: source.to_string(), page: Some(1) },
            char_start: 0,
            char_end: text.len(),
        }
    }

    fn corpus() -> Vec<Chunk> {
        vec![
            chunk("a.pdf", "aaaa"),
            chunk("b.pdf", "bbbb"),
            chunk("c.pdf", "cccc"),
            chunk("ab.pdf", "aabb"),
        ]
    }

    fn options() -> BuildOptions {
        BuildOptions {
            retry_base_delay: Duration::from_millis(1),
            ..BuildOptions::default()
        }
    }

    #[tokio::test]
    async fn test_build_and_search_nearest_first() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vector_index");
        let index = VectorIndex::build(&path, &corpus(), &LetterEmbedder::new(), &options())
            .await
            .unwrap();

        assert_eq!(index.len(), 4);
        let results = index.search(&[1.0, 0.1, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.text, "aaaa");
        assert_eq!(results[1].chunk.text, "aabb");
        assert!(results[0].distance <= results[1].distance);
    }

    #[tokio::test]
    async fn test_k_larger_than_index_returns_all() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vector_index");
        let index = VectorIndex::build(&path, &corpus(), &LetterEmbedder::new(), &options())
            .await
            .unwrap();

        let results = index.search(&[0.0, 0.0, 1.0], 50).unwrap();
        assert_eq!(results.len(), 4);
        assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert!(index.search(&[0.0, 0.0, 1.0], 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vector_index");
        let chunks = vec![chunk("one.txt", "ab"), chunk("two.txt", "ab"), chunk("three.txt", "ab")];
        let index = VectorIndex::build(&path, &chunks, &LetterEmbedder::new(), &options())
            .await
            .unwrap();

        let ids: Vec<u64> = index.search(&[1.0, 1.0, 0.0], 3).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_open_round_trips_persisted_index() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vector_index");
        let built = VectorIndex::build(&path, &corpus(), &LetterEmbedder::new(), &options())
            .await
            .unwrap();

        let opened = VectorIndex::open(&path).unwrap();
        assert_eq!(opened.len(), 4);
        assert_eq!(opened.manifest(), built.manifest());
        assert_eq!(opened.manifest().embedding_model, "letters");
        assert_eq!(
            opened.search(&[0.0, 1.0, 0.0], 1).unwrap(),
            built.search(&[0.0, 1.0, 0.0], 1).unwrap()
        );
    }

    #[test]
    fn test_open_missing_index_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = VectorIndex::open(&dir.path().join("vector_index")).err().unwrap();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_existing_index_is_reused_without_embedding() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vector_index");
        VectorIndex::build(&path, &corpus(), &LetterEmbedder::new(), &options())
            .await
            .unwrap();

        let embedder = LetterEmbedder::new();
        let index = VectorIndex::build(&path, &corpus()[..1], &embedder, &options())
            .await
            .unwrap();
        assert_eq!(embedder.calls(), 0);
        assert_eq!(index.len(), 4);
    }

    #[tokio::test]
    async fn test_force_rebuild_replaces_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vector_index");
        VectorIndex::build(&path, &corpus(), &LetterEmbedder::new(), &options())
            .await
            .unwrap();

        let force = BuildOptions { force_rebuild: true, ..options() };
        let index = VectorIndex::build(&path, &corpus()[..2], &LetterEmbedder::new(), &force)
            .await
            .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(VectorIndex::open(&path).unwrap().len(), 2);
        assert!(!sibling(&path, "staging").exists());
        assert!(!sibling(&path, "lock").exists());
    }

    #[tokio::test]
    async fn test_rebuild_open_handle_in_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vector_index");
        let index = VectorIndex::build(&path, &corpus()[..1], &LetterEmbedder::new(), &options())
            .await
            .unwrap();

        index.rebuild(&corpus(), &LetterEmbedder::new(), &options()).await.unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(VectorIndex::open(&path).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_manifest_count_mismatch_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vector_index");
        let index = VectorIndex::build(&path, &corpus(), &LetterEmbedder::new(), &options())
            .await
            .unwrap();

        let mut manifest = index.manifest();
        manifest.record_count = 9;
        fs::write(path.join(MANIFEST_FILE), serde_json::to_vec(&manifest).unwrap()).unwrap();

        match VectorIndex::open(&path) {
            Err(Error::VectorDb(msg)) => assert!(msg.contains("corrupt")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("corrupt index opened"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_build_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vector_index");
        let _held = BuildLock::acquire(&path, DEFAULT_LOCK_STALE_AFTER).unwrap();

        let result = VectorIndex::build(&path, &corpus(), &LetterEmbedder::new(), &options()).await;
        match result {
            Err(Error::VectorDb(message)) => {
                assert!(message.contains(&format!("pid={}", std::process::id())))
            }
            other => panic!("expected a held lock, got {:?}", other.map(|i| i.len())),
        }
        assert!(!VectorIndex::exists(&path));
    }

    #[tokio::test]
    async fn test_stale_lock_is_taken_over() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vector_index");
        let lock = sibling(&path, "lock");

        // Left behind by a build that crashed two hours ago
        fs::write(&lock, "pid=999999 started=2024-01-01T00:00:00+00:00\n").unwrap();
        let two_hours_ago = std::time::SystemTime::now() - Duration::from_secs(2 * 60 * 60);
        fs::File::options()
            .write(true)
            .open(&lock)
            .unwrap()
            .set_modified(two_hours_ago)
            .unwrap();

        let index = VectorIndex::build(&path, &corpus(), &LetterEmbedder::new(), &options())
            .await
            .unwrap();
        assert_eq!(index.len(), 4);
        assert!(!lock.exists());
    }

    #[tokio::test]
    async fn test_recent_foreign_lock_is_respected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vector_index");
        let lock = sibling(&path, "lock");
        fs::write(&lock, "pid=999999 started=2024-01-01T00:00:00+00:00\n").unwrap();

        let result = VectorIndex::build(&path, &corpus(), &LetterEmbedder::new(), &options()).await;
        assert!(matches!(result, Err(Error::VectorDb(ref m)) if m.contains("pid=999999")));
        assert!(lock.exists());
    }

    #[tokio::test]
    async fn test_transient_embedding_failure_is_retried() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vector_index");
        let embedder = LetterEmbedder::failing_first(ProviderError::Unavailable("loading".into()));

        let index = VectorIndex::build(&path, &corpus(), &embedder, &options()).await.unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(embedder.calls(), 5);
    }

    #[tokio::test]
    async fn test_failed_build_leaves_previous_index() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vector_index");
        VectorIndex::build(&path, &corpus(), &LetterEmbedder::new(), &options())
            .await
            .unwrap();

        let embedder = LetterEmbedder::failing_first(ProviderError::Unauthorized("401".into()));
        let force = BuildOptions { force_rebuild: true, ..options() };
        let result = VectorIndex::build(&path, &corpus()[..1], &embedder, &force).await;

        assert!(matches!(result, Err(Error::Provider(ProviderError::Unauthorized(_)))));
        assert_eq!(VectorIndex::open(&path).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_empty_index_searches_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vector_index");
        let index = VectorIndex::build(&path, &[], &LetterEmbedder::new(), &options())
            .await
            .unwrap();

        assert!(index.is_empty());
        assert!(index.search(&[1.0, 0.0, 0.0], 4).unwrap().is_empty());
        assert!(VectorIndex::open(&path).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_check_compatible() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vector_index");
        let index = VectorIndex::build(&path, &corpus(), &LetterEmbedder::new(), &options())
            .await
            .unwrap();

        assert!(index.check_compatible("letters", 3).is_ok());
        assert!(matches!(index.check_compatible("all-minilm", 384), Err(Error::Config(_))));
    }

    #[test]
    fn test_corpus_hash_is_order_sensitive() {
        let chunks = corpus();
        let mut reversed = chunks.clone();
        reversed.reverse();
        assert_eq!(corpus_hash(&chunks), corpus_hash(&chunks));
        assert_ne!(corpus_hash(&chunks), corpus_hash(&reversed));
    }
}
