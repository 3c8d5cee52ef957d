use super::{PointPayload, ScoredPoint, SearchFilter, VectorPoint, VectorStore};
use crate::error::VectorStoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Exact cosine search over every stored vector.
///
/// With a path, points are loaded on open and written back atomically on
/// [`VectorStore::flush`]; without one the store lives only in memory.
pub struct InMemoryVectorStore {
    path: Option<PathBuf>,
    inner: RwLock<Snapshot>,
    /// Unflushed changes exist
    modified: AtomicBool,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Snapshot {
    dimension: Option<usize>,
    points: BTreeMap<String, StoredPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPoint {
    vector: Vec<f32>,
    /// Cached L2 norm of `vector`
    norm: f32,
    payload: PointPayload,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            path: None,
            inner: RwLock::new(Snapshot::default()),
            modified: AtomicBool::new(false),
        }
    }

    /// Open a persisted store; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, VectorStoreError> {
        let path = path.into();
        let snapshot = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| persist_failed(&path, e))?;
            let snapshot: Snapshot =
                serde_json::from_str(&content).map_err(|e| persist_failed(&path, e))?;
            tracing::info!(
                "Loaded {} vectors from {}",
                snapshot.points.len(),
                path.display()
            );
            snapshot
        } else {
            Snapshot::default()
        };

        Ok(Self {
            path: Some(path),
            inner: RwLock::new(snapshot),
            modified: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Ids of every stored point
    pub async fn ids(&self) -> Vec<String> {
        self.inner.read().await.points.keys().cloned().collect()
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn persist_failed(path: &Path, e: impl std::fmt::Display) -> VectorStoreError {
    VectorStoreError::PersistFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "vectors.json".to_string());
    let temp_path = path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()));
    let result = (|| {
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&temp_path, path)
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

#[async_trait::async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn initialize(&self, dimension: usize) -> Result<(), VectorStoreError> {
        let mut inner = self.inner.write().await;
        match inner.dimension {
            Some(existing) if existing != dimension && !inner.points.is_empty() => {
                Err(VectorStoreError::DimensionMismatch {
                    expected: existing,
                    actual: dimension,
                })
            }
            _ => {
                if inner.dimension != Some(dimension) {
                    inner.dimension = Some(dimension);
                    self.modified.store(true, Ordering::Relaxed);
                }
                Ok(())
            }
        }
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<usize, VectorStoreError> {
        let mut inner = self.inner.write().await;
        let dimension = inner.dimension.ok_or(VectorStoreError::NotInitialized)?;
        if let Some(bad) = points.iter().find(|p| p.vector.len() != dimension) {
            return Err(VectorStoreError::DimensionMismatch {
                expected: dimension,
                actual: bad.vector.len(),
            });
        }

        let count = points.len();
        for point in points {
            let stored = StoredPoint {
                norm: norm(&point.vector),
                vector: point.vector,
                payload: point.payload,
            };
            inner.points.insert(point.id, stored);
        }
        if count > 0 {
            self.modified.store(true, Ordering::Relaxed);
        }
        Ok(count)
    }

    async fn delete(&self, ids: &[String]) -> Result<usize, VectorStoreError> {
        let mut inner = self.inner.write().await;
        let removed = ids
            .iter()
            .filter(|id| inner.points.remove(id.as_str()).is_some())
            .count();
        if removed > 0 {
            self.modified.store(true, Ordering::Relaxed);
        }
        Ok(removed)
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError> {
        let inner = self.inner.read().await;
        let dimension = inner.dimension.ok_or(VectorStoreError::NotInitialized)?;
        if vector.len() != dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }

        let query_norm = norm(vector);
        if query_norm == 0.0 || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredPoint> = inner
            .points
            .iter()
            .filter(|(_, point)| point.norm > 0.0 && filter.matches(&point.payload))
            .filter_map(|(id, point)| {
                let dot: f32 = point.vector.iter().zip(vector).map(|(a, b)| a * b).sum();
                let score = dot / (point.norm * query_norm);
                (score >= filter.min_score).then(|| ScoredPoint {
                    id: id.clone(),
                    score,
                    payload: point.payload.clone(),
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        Ok(self.inner.read().await.points.len())
    }

    async fn flush(&self) -> Result<(), VectorStoreError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        if !self.modified.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let bytes = {
            let inner = self.inner.read().await;
            serde_json::to_vec(&*inner).map_err(|e| persist_failed(&path, e))?
        };
        let target = path.clone();
        let result = tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
            .await
            .map_err(|e| persist_failed(&path, e))?;
        if let Err(e) = result {
            self.modified.store(true, Ordering::Relaxed);
            return Err(persist_failed(&path, e));
        }

        tracing::debug!("Flushed vector store to {}", path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<(), VectorStoreError> {
        let mut inner = self.inner.write().await;
        inner.points.clear();
        self.modified.store(true, Ordering::Relaxed);
        Ok(())
    }
}
