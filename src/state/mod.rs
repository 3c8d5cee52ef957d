//! Persisted index state: per-root file records, chunk index records, the
//! relationship graph and crash-recovery flags.
//!
//! The whole state is one JSON document, written to a temporary file and
//! renamed into place so a crash never leaves a half-written state behind.
//! In memory it lives behind a `tokio::sync::RwLock`; the synchronizer takes
//! the write guard once per file commit and queries take read guards.

use crate::error::StateError;
use crate::indexer::{ChunkId, CodeChunk, Fingerprint, Language, Metrics};
use crate::relations::{EdgeDelta, GraphStats, RelationshipGraph, TieBreak};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[cfg(test)]
mod tests;

/// Bumped whenever the persisted format changes incompatibly
pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Embedded and stored in the vector store
    Indexed,
    /// Embedding failed; always re-embedded on the next pass
    Pending,
}

/// Persisted state of one chunk. The sole source of truth for whether a chunk
/// is up to date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub chunk_id: ChunkId,
    pub file: String,
    pub fingerprint: Fingerprint,
    pub embedding_id: Option<String>,
    pub indexed_at: i64,
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub owner_symbol: Option<String>,
    #[serde(default)]
    pub context: String,
    pub metrics: Metrics,
    pub status: RecordStatus,
}

impl IndexRecord {
    pub fn from_chunk(
        chunk: &CodeChunk,
        metrics: Metrics,
        embedding_id: Option<String>,
        indexed_at: i64,
    ) -> Self {
        let status = if embedding_id.is_some() {
            RecordStatus::Indexed
        } else {
            RecordStatus::Pending
        };
        Self {
            chunk_id: chunk.id.clone(),
            file: chunk.file_path.clone(),
            fingerprint: chunk.fingerprint,
            embedding_id,
            indexed_at,
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            start_byte: chunk.start_byte,
            end_byte: chunk.end_byte,
            symbol: chunk.symbol.clone(),
            owner_symbol: chunk.owner_symbol.clone(),
            context: chunk.context.clone(),
            metrics,
            status,
        }
    }

    /// Embedded with exactly this content; no work needed
    pub fn is_current(&self, fingerprint: &Fingerprint) -> bool {
        self.status == RecordStatus::Indexed && self.embedding_id.is_some() && &self.fingerprint == fingerprint
    }
}

/// Persisted state of one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub language: Option<Language>,
    /// Hash of the raw bytes at the last pass
    pub content_hash: Fingerprint,
    /// Hash of the ordered chunk fingerprints
    pub fingerprint: Fingerprint,
    /// Chunk ids in file order
    pub chunk_ids: Vec<ChunkId>,
    /// Chunking parameters the chunks were produced with
    pub chunker: String,
    pub size: u64,
    pub modified_at: i64,
    pub indexed_at: i64,
    /// Aggregate of the chunk metrics
    pub metrics: Metrics,
    /// Parse failure recorded at the last pass, if any
    #[serde(default)]
    pub parse_warning: Option<String>,
}

/// Everything known about one indexed root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootState {
    pub files: BTreeMap<String, FileRecord>,
    pub records: BTreeMap<ChunkId, IndexRecord>,
    pub graph: RelationshipGraph,
    /// A pass started and has not completed; set before any change is applied
    #[serde(default)]
    pub dirty: bool,
    /// Files whose state is suspect and must be fully re-derived
    #[serde(default)]
    pub needs_rebuild: BTreeSet<String>,
    /// `{model}:{dimension}` the stored vectors were produced with
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub last_indexed_at: Option<i64>,
}

/// Removal of one file from a root
#[derive(Debug, Default)]
pub struct RemovedFile {
    pub records: Vec<IndexRecord>,
    pub edges: EdgeDelta,
}

/// Summary of one root
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootStats {
    pub files: usize,
    pub chunks: usize,
    pub pending_chunks: usize,
    pub languages: BTreeMap<String, usize>,
    pub needs_rebuild: usize,
    pub dirty: bool,
    pub last_indexed_at: Option<i64>,
    pub relations: GraphStats,
}

impl RootState {
    pub fn is_live(&self, chunk: &ChunkId) -> bool {
        self.records.contains_key(chunk)
    }

    pub fn records_for_file(&self, path: &str) -> Vec<&IndexRecord> {
        self.files
            .get(path)
            .into_iter()
            .flat_map(|file| file.chunk_ids.iter())
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    /// Remove a file's records, file record and relationships
    pub fn remove_file(&mut self, path: &str) -> RemovedFile {
        let mut removed = RemovedFile::default();
        if let Some(file) = self.files.remove(path) {
            for id in &file.chunk_ids {
                if let Some(record) = self.records.remove(id) {
                    removed.records.push(record);
                }
            }
        }
        // Records not listed in the file record (left by an interrupted pass)
        let prefix = format!("{}#", path);
        let stray: Vec<ChunkId> = self
            .records
            .range(ChunkId::from(prefix.as_str())..)
            .take_while(|(id, _)| id.as_str().starts_with(&prefix))
            .filter(|(id, _)| id.file_path() == path)
            .map(|(id, _)| id.clone())
            .collect();
        for id in stray {
            if let Some(record) = self.records.remove(&id) {
                removed.records.push(record);
            }
        }
        removed.edges = self.graph.remove_file(path);
        self.needs_rebuild.remove(path);
        removed
    }

    pub fn embedding_ids(&self) -> impl Iterator<Item = &str> {
        self.records.values().filter_map(|r| r.embedding_id.as_deref())
    }

    pub fn stats(&self) -> RootStats {
        let mut languages = BTreeMap::new();
        for file in self.files.values() {
            let name = file.language.map_or("unknown", |l| l.name());
            *languages.entry(name.to_string()).or_insert(0) += 1;
        }

        RootStats {
            files: self.files.len(),
            chunks: self.records.len(),
            pending_chunks: self
                .records
                .values()
                .filter(|r| r.status == RecordStatus::Pending)
                .count(),
            languages,
            needs_rebuild: self.needs_rebuild.len(),
            dirty: self.dirty,
            last_indexed_at: self.last_indexed_at,
            relations: self.graph.stats(),
        }
    }
}

/// The persisted document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    /// Canonical root path to its state
    pub roots: BTreeMap<String, RootState>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            roots: BTreeMap::new(),
        }
    }
}

impl StateFile {
    pub fn root(&self, root: &str) -> Option<&RootState> {
        self.roots.get(root)
    }

    pub fn root_mut(&mut self, root: &str) -> &mut RootState {
        self.roots.entry(root.to_string()).or_default()
    }

    pub fn remove_root(&mut self, root: &str) -> Option<RootState> {
        self.roots.remove(root)
    }

    /// Load from disk; a missing file is an empty state
    pub fn load(path: &Path, tie_break: &[TieBreak]) -> Result<Self, StateError> {
        if !path.exists() {
            tracing::debug!("State file not found, starting with empty state");
            return Ok(Self::default());
        }

        let load_failed = |reason: String| StateError::LoadFailed {
            path: path.display().to_string(),
            reason,
        };

        let content = fs::read_to_string(path).map_err(|e| load_failed(e.to_string()))?;
        let version = serde_json::from_str::<VersionProbe>(&content)
            .map_err(|e| load_failed(e.to_string()))?
            .version;
        if version != STATE_VERSION {
            return Err(StateError::VersionMismatch {
                found: version,
                expected: STATE_VERSION,
            });
        }

        let mut state: StateFile =
            serde_json::from_str(&content).map_err(|e| load_failed(e.to_string()))?;
        for root in state.roots.values_mut() {
            root.graph.set_tie_break(tie_break.to_vec());
            root.graph.rebuild_indexes();
        }

        tracing::info!("Loaded index state with {} roots", state.roots.len());
        Ok(state)
    }

    /// Write to a temporary file next to `path`, then rename over it
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        let save_failed = |reason: String| StateError::SaveFailed {
            path: path.display().to_string(),
            reason,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }

        let content = serde_json::to_vec(self).map_err(|e| save_failed(e.to_string()))?;
        let temp_path = temp_path_for(path);
        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(&content)?;
            file.sync_all()?;
            fs::rename(&temp_path, path)
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&temp_path);
            return Err(save_failed(e.to_string()));
        }

        tracing::debug!("Saved index state to {:?}", path);
        Ok(())
    }
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state.json".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}

/// Shared handle to the index state. Cloning shares the same state.
#[derive(Clone)]
pub struct IndexStore {
    path: Option<PathBuf>,
    state: Arc<RwLock<StateFile>>,
}

impl IndexStore {
    /// Load the state persisted at `path` (or start empty)
    pub fn open(path: impl Into<PathBuf>, tie_break: &[TieBreak]) -> Result<Self, StateError> {
        let path = path.into();
        let state = StateFile::load(&path, tie_break)?;
        Ok(Self {
            path: Some(path),
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// State that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Arc::new(RwLock::new(StateFile::default())),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, StateFile> {
        self.state.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, StateFile> {
        self.state.write().await
    }

    /// Persist atomically. The state is cloned under the read guard so the
    /// saved document is a consistent snapshot.
    pub async fn save(&self) -> Result<(), StateError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let snapshot = self.state.read().await.clone();
        tokio::task::spawn_blocking(move || snapshot.save(&path))
            .await
            .map_err(|e| StateError::SaveFailed {
                path: String::new(),
                reason: e.to_string(),
            })?
    }
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore").field("path", &self.path).finish()
    }
}
