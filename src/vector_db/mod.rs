// Brute-force in-process store with optional JSON persistence
pub mod memory_store;
pub use memory_store::InMemoryVectorStore;

use crate::error::VectorStoreError;
use crate::indexer::ChunkId;
use serde::{Deserialize, Serialize};

/// What a vector point carries besides its vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointPayload {
    /// Canonical root the chunk was indexed under
    pub root: String,
    pub chunk_id: ChunkId,
    /// File path relative to the root
    pub file_path: String,
    pub language: Option<String>,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub context: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    /// Cosine similarity
    pub score: f32,
    pub payload: PointPayload,
}

/// Restricts a query; empty fields match everything
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub root: Option<String>,
    pub languages: Vec<String>,
    pub path_prefix: Option<String>,
    pub min_score: f32,
}

impl SearchFilter {
    pub fn matches(&self, payload: &PointPayload) -> bool {
        if let Some(root) = &self.root
            && &payload.root != root
        {
            return false;
        }
        if !self.languages.is_empty() {
            let Some(language) = &payload.language else {
                return false;
            };
            if !self.languages.iter().any(|l| l.eq_ignore_ascii_case(language)) {
                return false;
            }
        }
        if let Some(prefix) = &self.path_prefix
            && !payload.file_path.starts_with(prefix.as_str())
        {
            return false;
        }
        true
    }
}

/// Identifier of a chunk's vector; unique across roots sharing one store
pub fn point_id(root: &str, chunk: &ChunkId) -> String {
    format!("{}:{}", root, chunk)
}

/// Trait for vector store operations. Vectors live only in the store; the
/// index state keeps the point ids.
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Prepare the store for vectors of `dimension`
    async fn initialize(&self, dimension: usize) -> Result<(), VectorStoreError>;

    /// Insert or replace points by id
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<usize, VectorStoreError>;

    /// Delete points by id; unknown ids are ignored. Returns how many were removed.
    async fn delete(&self, ids: &[String]) -> Result<usize, VectorStoreError>;

    /// The `k` most similar points passing `filter`, best first
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError>;

    async fn count(&self) -> Result<usize, VectorStoreError>;

    /// Make all changes durable
    async fn flush(&self) -> Result<(), VectorStoreError>;

    /// Remove all points
    async fn clear(&self) -> Result<(), VectorStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(file: &str, language: Option<&str>) -> PointPayload {
        PointPayload {
            root: "/project".to_string(),
            chunk_id: ChunkId::for_lines(file, 1),
            file_path: file.to_string(),
            language: language.map(str::to_string),
            start_line: 1,
            end_line: 1,
            symbol: None,
            context: String::new(),
            content: String::new(),
        }
    }

    #[test]
    fn test_filter_matches() {
        let p = payload("src/lib.rs", Some("Rust"));
        assert!(SearchFilter::default().matches(&p));

        let by_language = SearchFilter {
            languages: vec!["rust".to_string()],
            ..Default::default()
        };
        assert!(by_language.matches(&p));
        assert!(!by_language.matches(&payload("notes", None)));

        let by_prefix = SearchFilter {
            path_prefix: Some("tests/".to_string()),
            ..Default::default()
        };
        assert!(!by_prefix.matches(&p));

        let by_root = SearchFilter {
            root: Some("/other".to_string()),
            ..Default::default()
        };
        assert!(!by_root.matches(&p));
    }

    #[test]
    fn test_point_id() {
        let id = point_id("/project", &ChunkId::for_symbol("a.py", "f"));
        assert_eq!(id, "/project:a.py#f");
    }
}
