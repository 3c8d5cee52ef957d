use crate::error::ValidationError;
use crate::indexer::{ChunkId, SkippedFile};
use crate::state::RootStats;
use serde::{Deserialize, Serialize};

/// Request to index a codebase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRequest {
    /// Path to the codebase directory to index
    pub path: String,
    /// Optional glob patterns to include (e.g., ["**/*.rs", "**/*.toml"])
    #[serde(default)]
    pub include_patterns: Vec<String>,
    /// Optional glob patterns to exclude, added to the configured ones
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Re-derive and re-embed every file regardless of stored fingerprints
    #[serde(default)]
    pub force: bool,
}

impl IndexRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            force: false,
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.path.trim().is_empty() {
            return Err(ValidationError::Empty("path".to_string()));
        }
        let path = std::path::Path::new(&self.path);
        if !path.exists() {
            return Err(ValidationError::PathNotFound(self.path.clone()));
        }
        if !path.is_dir() {
            return Err(ValidationError::NotADirectory(self.path.clone()));
        }
        Ok(())
    }
}

/// Whether a pass compared against stored state or rebuilt everything
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassMode {
    /// First pass of a root, or forced
    Full,
    /// Only changed files were re-derived
    Incremental,
}

/// A file whose changes could not be applied in this pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: String,
    pub error: String,
}

/// A file indexed with fallback chunking because it could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    pub path: String,
    pub message: String,
}

/// Outcome of one synchronization pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    pub root: String,
    pub mode: PassMode,
    pub files_scanned: usize,
    /// Files whose chunks or records changed
    pub files_processed: usize,
    pub files_unchanged: usize,
    pub files_removed: usize,
    #[serde(default)]
    pub files_skipped: Vec<SkippedFile>,
    #[serde(default)]
    pub files_failed: Vec<FileFailure>,
    #[serde(default)]
    pub parse_warnings: Vec<ParseWarning>,
    pub chunks_embedded: usize,
    pub chunks_deleted: usize,
    pub chunks_unchanged: usize,
    /// Chunks whose embedding failed and will be retried next pass
    pub chunks_pending: usize,
    pub embedding_calls: usize,
    pub edges_added: usize,
    pub edges_removed: usize,
    /// Dangling-edge violations found and repaired at the end of the pass
    #[serde(default)]
    pub consistency_errors: Vec<String>,
    pub duration_ms: u64,
    pub cancelled: bool,
}

impl PassReport {
    pub fn new(root: impl Into<String>, mode: PassMode) -> Self {
        Self {
            root: root.into(),
            mode,
            files_scanned: 0,
            files_processed: 0,
            files_unchanged: 0,
            files_removed: 0,
            files_skipped: Vec::new(),
            files_failed: Vec::new(),
            parse_warnings: Vec::new(),
            chunks_embedded: 0,
            chunks_deleted: 0,
            chunks_unchanged: 0,
            chunks_pending: 0,
            embedding_calls: 0,
            edges_added: 0,
            edges_removed: 0,
            consistency_errors: Vec::new(),
            duration_ms: 0,
            cancelled: false,
        }
    }

    /// Nothing was embedded, deleted or re-linked
    pub fn is_noop(&self) -> bool {
        self.chunks_embedded == 0
            && self.chunks_deleted == 0
            && self.edges_added == 0
            && self.edges_removed == 0
            && self.files_removed == 0
            && self.files_processed == 0
    }

    pub fn has_failures(&self) -> bool {
        !self.files_failed.is_empty() || self.chunks_pending > 0
    }
}

/// Semantic search over indexed chunks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Natural-language or code query
    pub query: String,
    /// Restrict to one indexed root
    #[serde(default)]
    pub path: Option<String>,
    /// Number of results to return
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Minimum similarity score (0.0 to 1.0)
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    /// Filter by language name (e.g., ["Rust", "Python"])
    #[serde(default)]
    pub languages: Vec<String>,
    /// Only files whose root-relative path starts with this prefix
    #[serde(default)]
    pub path_prefix: Option<String>,
}

fn default_limit() -> usize {
    10
}

fn default_min_score() -> f32 {
    0.3
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            path: None,
            limit: default_limit(),
            min_score: default_min_score(),
            languages: Vec::new(),
            path_prefix: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.query.trim().is_empty() {
            return Err(ValidationError::Empty("query".to_string()));
        }
        if self.limit == 0 {
            return Err(ValidationError::ConstraintViolation {
                field: "limit".to_string(),
                constraint: "greater than 0".to_string(),
                actual: self.limit.to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(ValidationError::ConstraintViolation {
                field: "min_score".to_string(),
                constraint: "between 0.0 and 1.0".to_string(),
                actual: self.min_score.to_string(),
            });
        }
        Ok(())
    }
}

/// A search result with its location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub root: String,
    /// File path relative to the indexed root
    pub file_path: String,
    pub chunk_id: ChunkId,
    /// The code chunk content
    pub content: String,
    /// Cosine similarity (0.0 to 1.0 for related text)
    pub score: f32,
    pub start_line: usize,
    pub end_line: usize,
    pub language: Option<String>,
    pub symbol: Option<String>,
    /// Breadcrumb such as `src/app.py > Server.handle`
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Results ordered by score, best first
    pub results: Vec<SearchResult>,
    pub duration_ms: u64,
}

/// Statistics of one indexed root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootStatus {
    pub root: String,
    #[serde(flatten)]
    pub stats: RootStats,
    /// `{model}:{dimension}` the stored vectors were produced with
    pub embedding_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub roots: Vec<RootStatus>,
    /// Points held by the vector store, across all roots
    pub total_vectors: usize,
}

/// Response from clearing a root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResponse {
    pub root: String,
    pub files_removed: usize,
    pub vectors_removed: usize,
}

#[cfg(test)]
mod tests;
