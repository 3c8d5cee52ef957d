//! Core library client for semindex
//!
//! [`CodeIndex`] wires configuration, the embedding provider, the vector store
//! and the persisted index state into an [`IndexSynchronizer`], and answers
//! search and structural queries against what has been indexed.

pub mod fs_lock;


use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{StateError, VectorStoreError};
use crate::paths::PlatformPaths;
use crate::relations::{Relationship, Symbol, SymbolId};
use crate::state::IndexStore;
use crate::sync::{IndexSynchronizer, normalize_relative};
use crate::types::*;
use crate::vector_db::{InMemoryVectorStore, SearchFilter, VectorStore};
use anyhow::{Context, Result};
use fs_lock::FsLockGuard;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// How long a pass waits for another process to finish with the same root
const LOCK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Main entry point for indexing and querying codebases
///
/// # Example
///
/// ```no_run
/// use semindex::{CodeIndex, IndexRequest, SearchRequest};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let index = CodeIndex::new().await?;
///
///     let report = index
///         .index(IndexRequest::new("/path/to/code"), CancellationToken::new())
///         .await?;
///     println!("{} chunks embedded", report.chunks_embedded);
///
///     let response = index.search(SearchRequest::new("parse config file")).await?;
///     for result in response.results {
///         println!("{}:{} {}", result.file_path, result.start_line, result.score);
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct CodeIndex {
    sync: Arc<IndexSynchronizer>,
    lock_dir: PathBuf,
}

impl CodeIndex {
    /// Create an index with configuration from the default location and the
    /// environment
    pub async fn new() -> Result<Self> {
        let config = Config::new().context("Failed to load configuration")?;
        Self::with_config(config).await
    }

    /// Create an index with custom configuration
    pub async fn with_config(config: Config) -> Result<Self> {
        tracing::info!("Initializing index with configuration");
        tracing::debug!(
            "Embedding provider: {} ({})",
            config.embedding.provider,
            config.embedding.model_name
        );
        tracing::debug!("State file: {}", config.storage.state_path.display());

        let embedder =
            embedding::from_config(&config.embedding).context("Failed to initialize embedding provider")?;

        let vectors: Arc<dyn VectorStore> = match &config.storage.vector_store_path {
            Some(path) => {
                tracing::info!("Using vector store at {}", path.display());
                Arc::new(InMemoryVectorStore::open(path).context("Failed to open vector store")?)
            }
            None => {
                tracing::info!("Using in-memory vector store");
                Arc::new(InMemoryVectorStore::new())
            }
        };

        let store = IndexStore::open(&config.storage.state_path, &config.relations.tie_break)
            .context("Failed to load index state")?;

        Self::with_parts(config, store, vectors, embedder).await
    }

    /// Create an index from explicit collaborators
    pub async fn with_parts(
        config: Config,
        store: IndexStore,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let dimension = embedder.dimension();
        match vectors.initialize(dimension).await {
            Err(VectorStoreError::DimensionMismatch { expected, actual }) => {
                // Stored vectors are unusable; the model key change makes the
                // next pass over each root re-embed everything
                tracing::warn!(
                    "Vector store holds {}-dimensional vectors, provider produces {}; clearing it",
                    expected,
                    actual
                );
                vectors.clear().await.context("Failed to clear vector store")?;
                vectors
                    .initialize(dimension)
                    .await
                    .context("Failed to initialize vector store")?;
            }
            other => other.context("Failed to initialize vector store")?,
        }

        let lock_dir = match config.storage.state_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join("locks"),
            _ => PlatformPaths::lock_dir(),
        };

        let sync = IndexSynchronizer::new(Arc::new(config), store, vectors, embedder)
            .context("Failed to create index synchronizer")?;

        Ok(Self {
            sync: Arc::new(sync),
            lock_dir,
        })
    }

    pub fn config(&self) -> &Config {
        self.sync.config()
    }

    pub fn store(&self) -> &IndexStore {
        self.sync.store()
    }

    pub fn synchronizer(&self) -> &IndexSynchronizer {
        &self.sync
    }

    pub fn embedding_dimension(&self) -> usize {
        self.sync.embedder().dimension()
    }

    /// Canonical form of a root path; falls back to the path as given when it
    /// no longer exists
    pub fn normalize_path(path: &str) -> String {
        PlatformPaths::normalize_root(path).unwrap_or_else(|_| path.to_string())
    }

    /// Run a pass over the request's root
    pub async fn index(&self, request: IndexRequest, cancel: CancellationToken) -> Result<PassReport> {
        request.validate()?;
        let root = PlatformPaths::normalize_root(&request.path)
            .with_context(|| format!("Failed to canonicalize path: {}", request.path))?;

        let _lock = self.lock_root(&root).await?;
        let report = self.sync.sync(&request, cancel).await?;
        Ok(report)
    }

    /// Re-derive one file. A file that no longer exists is removed.
    pub async fn reindex_file(
        &self,
        root_path: &str,
        file_path: &str,
        cancel: CancellationToken,
    ) -> Result<PassReport> {
        let root = Self::normalize_path(root_path);
        let relative = PlatformPaths::relative_to(&root, file_path)
            .with_context(|| format!("{} is not inside {}", file_path, root))?;
        self.index_files(&IndexRequest::new(root_path), &[relative], cancel)
            .await
    }

    /// Pass restricted to root-relative `paths`. A path naming a directory
    /// that is no longer on disk covers every indexed file beneath it.
    pub async fn index_files(
        &self,
        request: &IndexRequest,
        paths: &[String],
        cancel: CancellationToken,
    ) -> Result<PassReport> {
        request.validate()?;
        let root = PlatformPaths::normalize_root(&request.path)
            .with_context(|| format!("Failed to canonicalize path: {}", request.path))?;

        let mut scope: BTreeSet<String> = paths.iter().map(|p| normalize_relative(p)).collect();
        {
            let state = self.store().read().await;
            if let Some(root_state) = state.root(&root) {
                let beneath: Vec<String> = scope
                    .iter()
                    .filter(|p| !Path::new(&root).join(p).exists())
                    .flat_map(|dir| {
                        let prefix = format!("{}/", dir);
                        root_state
                            .files
                            .keys()
                            .filter(move |file| file.starts_with(&prefix))
                            .cloned()
                    })
                    .collect();
                scope.extend(beneath);
            }
        }
        let scope: Vec<String> = scope.into_iter().collect();

        let _lock = self.lock_root(&root).await?;
        let report = self.sync.sync_files(request, &scope, cancel).await?;
        Ok(report)
    }

    /// Remove one file from the index whether or not it still exists
    pub async fn remove_file(&self, root_path: &str, file_path: &str) -> Result<PassReport> {
        let root = Self::normalize_path(root_path);
        let relative = PlatformPaths::relative_to(&root, file_path)
            .with_context(|| format!("{} is not inside {}", file_path, root))?;

        let _lock = self.lock_root(&root).await?;
        let report = self.sync.remove_files(&root, &[relative]).await?;
        Ok(report)
    }

    /// Drop everything indexed for a root
    pub async fn clear(&self, root_path: &str) -> Result<ClearResponse> {
        let root = Self::normalize_path(root_path);
        let _lock = self.lock_root(&root).await?;
        let response = self.sync.clear(&root).await?;
        Ok(response)
    }

    /// Semantic search over indexed chunks
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        request.validate()?;
        let start = Instant::now();

        let embedder = self.sync.embedder().clone();
        let query = request.query.clone();
        let vector = tokio::task::spawn_blocking(move || embedder.embed_batch(vec![query]))
            .await
            .context("Query embedding task failed")??
            .into_iter()
            .next()
            .context("No embedding returned for query")?;

        let filter = SearchFilter {
            root: request.path.as_deref().map(Self::normalize_path),
            languages: request.languages.clone(),
            path_prefix: request.path_prefix.clone(),
            min_score: request.min_score,
        };
        let points = self
            .sync
            .vectors()
            .query(&vector, request.limit, &filter)
            .await
            .context("Failed to query vector store")?;

        // Line spans come from the records, which follow chunks that moved
        // without being re-embedded
        let state = self.store().read().await;
        let results = points
            .into_iter()
            .filter_map(|point| {
                let record = state
                    .root(&point.payload.root)?
                    .records
                    .get(&point.payload.chunk_id)
                    .filter(|record| record.embedding_id.as_deref() == Some(point.id.as_str()))?;
                Some(SearchResult {
                    root: point.payload.root,
                    file_path: point.payload.file_path,
                    chunk_id: point.payload.chunk_id,
                    content: point.payload.content,
                    score: point.score,
                    start_line: record.start_line,
                    end_line: record.end_line,
                    language: point.payload.language,
                    symbol: record.symbol.clone(),
                    context: record.context.clone(),
                })
            })
            .collect();

        Ok(SearchResponse {
            results,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Definitions matching a qualified or simple name
    pub async fn symbols(&self, name: &str, root_path: Option<&str>) -> Vec<Symbol> {
        self.collect(root_path, |graph| {
            graph.definitions(name).into_iter().cloned().collect()
        })
        .await
    }

    /// Call edges into a symbol
    pub async fn callers(&self, symbol: &str, root_path: Option<&str>) -> Vec<Relationship> {
        let id = SymbolId::from(symbol);
        self.collect(root_path, |graph| {
            graph.callers(&id).into_iter().cloned().collect()
        })
        .await
    }

    /// Call edges out of a symbol
    pub async fn callees(&self, symbol: &str, root_path: Option<&str>) -> Vec<Relationship> {
        let id = SymbolId::from(symbol);
        self.collect(root_path, |graph| {
            graph.callees(&id).into_iter().cloned().collect()
        })
        .await
    }

    /// Files with an edge into a symbol defined in `file_path`
    pub async fn dependents(&self, file_path: &str, root_path: &str) -> BTreeSet<String> {
        let root = Self::normalize_path(root_path);
        let file = PlatformPaths::relative_to(&root, file_path).unwrap_or_else(|| file_path.to_string());
        let state = self.store().read().await;
        state
            .root(&root)
            .map(|root_state| root_state.graph.dependents_of_file(&file))
            .unwrap_or_default()
    }

    /// Statistics of one root, or of every indexed root
    pub async fn status(&self, root_path: Option<&str>) -> Result<StatusResponse> {
        let wanted = root_path.map(Self::normalize_path);
        let roots: Vec<RootStatus> = {
            let state = self.store().read().await;
            state
                .roots
                .iter()
                .filter(|(root, _)| wanted.as_ref().is_none_or(|w| w == *root))
                .map(|(root, root_state)| RootStatus {
                    root: root.clone(),
                    stats: root_state.stats(),
                    embedding_model: root_state.embedding_model.clone(),
                })
                .collect()
        };
        let total_vectors = self
            .sync
            .vectors()
            .count()
            .await
            .context("Failed to count vectors")?;

        Ok(StatusResponse {
            roots,
            total_vectors,
        })
    }

    async fn collect<T, F>(&self, root_path: Option<&str>, query: F) -> Vec<T>
    where
        F: Fn(&crate::relations::RelationshipGraph) -> Vec<T>,
    {
        let wanted = root_path.map(Self::normalize_path);
        let state = self.store().read().await;
        state
            .roots
            .iter()
            .filter(|(root, _)| wanted.as_ref().is_none_or(|w| w == *root))
            .flat_map(|(_, root_state)| query(&root_state.graph))
            .collect()
    }

    /// Cross-process exclusion for passes over `root`
    async fn lock_root(&self, root: &str) -> Result<FsLockGuard> {
        let lock_dir = self.lock_dir.clone();
        let key = root.to_string();
        let guard = tokio::task::spawn_blocking(move || {
            FsLockGuard::acquire_blocking(&lock_dir, &key, LOCK_TIMEOUT)
        })
        .await
        .context("Lock task failed")??;

        guard.ok_or_else(|| {
            StateError::LockFailed(format!("{} is being indexed by another process", root)).into()
        })
    }

    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }
}
