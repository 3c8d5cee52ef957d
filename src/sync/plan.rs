//! Per-file diff between the desired chunks and the persisted index records.

use crate::indexer::{ChunkId, CodeChunk, Fingerprint, Metrics};
use crate::state::{FileRecord, IndexRecord, RecordStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a chunk stands after comparing desired and persisted state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkState {
    /// Not compared yet
    Unseen,
    /// Same fingerprint, embedded; nothing to do
    Unchanged,
    /// Known id whose content changed, or whose record is pending or stale
    Changed,
    /// Id not present in the persisted records
    New,
}

impl ChunkState {
    pub fn needs_embedding(self) -> bool {
        matches!(self, Self::Changed | Self::New)
    }
}

/// What happened to a chunk when its file was committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkOutcome {
    Skipped,
    Embedded,
    /// Embedding failed; recorded as pending
    Pending,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct PlannedChunk {
    pub chunk: CodeChunk,
    pub metrics: Metrics,
    pub state: ChunkState,
    /// Persisted record under the same id, if any
    pub previous: Option<IndexRecord>,
}

/// The changes one file needs
#[derive(Debug, Clone, Default)]
pub struct FilePlan {
    pub path: String,
    /// Desired chunks in file order
    pub chunks: Vec<PlannedChunk>,
    /// Persisted records whose id is no longer desired
    pub obsolete: Vec<IndexRecord>,
}

impl FilePlan {
    /// Diff desired chunks against the file's persisted records.
    ///
    /// With `rebuild` every persisted record is treated as stale, so each
    /// desired chunk is re-embedded and every stored vector replaced.
    pub fn diff(
        path: &str,
        desired: Vec<(CodeChunk, Metrics)>,
        mut previous: BTreeMap<ChunkId, IndexRecord>,
        rebuild: bool,
    ) -> Self {
        let mut chunks = Vec::with_capacity(desired.len());
        for (chunk, metrics) in desired {
            let record = previous.remove(&chunk.id);
            let state = match &record {
                Some(record) if !rebuild && record.is_current(&chunk.fingerprint) => {
                    ChunkState::Unchanged
                }
                Some(_) => ChunkState::Changed,
                None => ChunkState::New,
            };
            // Metrics are reused whenever the content is the same
            let metrics = match &record {
                Some(record) if record.fingerprint == chunk.fingerprint => record.metrics,
                _ => metrics,
            };
            chunks.push(PlannedChunk {
                chunk,
                metrics,
                state,
                previous: record,
            });
        }

        Self {
            path: path.to_string(),
            chunks,
            obsolete: previous.into_values().collect(),
        }
    }

    /// File-level short-circuit: same file fingerprint, same chunk ids and
    /// every record embedded means no chunk needs to be compared
    pub fn file_unchanged(
        file_fingerprint: &Fingerprint,
        chunk_ids: &[ChunkId],
        previous_file: Option<&FileRecord>,
        previous: &BTreeMap<ChunkId, IndexRecord>,
    ) -> bool {
        previous_file.is_some_and(|file| {
            &file.fingerprint == file_fingerprint
                && file.chunk_ids == chunk_ids
                && previous.len() == chunk_ids.len()
                && previous
                    .values()
                    .all(|r| r.status == RecordStatus::Indexed && r.embedding_id.is_some())
        })
    }

    /// Nothing to embed, delete or rewrite
    pub fn is_unchanged(&self) -> bool {
        self.obsolete.is_empty() && self.chunks.iter().all(|c| c.state == ChunkState::Unchanged)
    }

    pub fn to_embed(&self) -> impl Iterator<Item = &PlannedChunk> {
        self.chunks.iter().filter(|c| c.state.needs_embedding())
    }

    /// Stored vectors that must be deleted before the file's new vectors are
    /// written: those of obsolete records and of changed chunks
    pub fn stale_vector_ids(&self) -> Vec<String> {
        let changed = self
            .chunks
            .iter()
            .filter(|c| c.state == ChunkState::Changed)
            .filter_map(|c| c.previous.as_ref());
        self.obsolete
            .iter()
            .chain(changed)
            .filter_map(|record| record.embedding_id.clone())
            .collect()
    }

    pub fn count(&self, state: ChunkState) -> usize {
        self.chunks.iter().filter(|c| c.state == state).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::{file_fingerprint, fingerprint};

    fn chunk(path: &str, name: &str, text: &str) -> CodeChunk {
        CodeChunk {
            id: ChunkId::for_symbol(path, name),
            file_path: path.to_string(),
            language: None,
            content: text.to_string(),
            fingerprint: fingerprint(text.as_bytes()),
            start_byte: 0,
            end_byte: text.len(),
            start_line: 1,
            end_line: 1,
            symbol: Some(name.to_string()),
            owner_symbol: None,
            part: None,
            context: String::new(),
        }
    }

    fn record_for(chunk: &CodeChunk, status: RecordStatus) -> IndexRecord {
        let embedding_id = (status == RecordStatus::Indexed).then(|| format!("r:{}", chunk.id));
        let mut record = IndexRecord::from_chunk(chunk, Metrics::default(), embedding_id, 0);
        record.metrics.lines = 42;
        record
    }

    fn file_record(chunks: &[&CodeChunk]) -> FileRecord {
        FileRecord {
            path: "a.py".to_string(),
            language: None,
            content_hash: fingerprint(b""),
            fingerprint: file_fingerprint(chunks.iter().map(|c| &c.fingerprint)),
            chunk_ids: chunks.iter().map(|c| c.id.clone()).collect(),
            chunker: "symbol:120:50".to_string(),
            size: 0,
            modified_at: 0,
            indexed_at: 0,
            metrics: Metrics::default(),
            parse_warning: None,
        }
    }

    fn desired(chunks: &[&CodeChunk]) -> Vec<(CodeChunk, Metrics)> {
        chunks.iter().map(|c| ((*c).clone(), Metrics::default())).collect()
    }

    #[test]
    fn test_first_pass_everything_new() {
        let f = chunk("a.py", "f", "def f(): pass");
        let plan = FilePlan::diff("a.py", desired(&[&f]), BTreeMap::new(), false);
        assert_eq!(plan.count(ChunkState::New), 1);
        assert!(plan.obsolete.is_empty());
        assert!(plan.stale_vector_ids().is_empty());
    }

    #[test]
    fn test_unchanged_reuses_metrics() {
        let f = chunk("a.py", "f", "def f(): pass");
        let previous = BTreeMap::from([(f.id.clone(), record_for(&f, RecordStatus::Indexed))]);
        let fp = file_fingerprint([&f.fingerprint]);
        assert!(FilePlan::file_unchanged(&fp, &[f.id.clone()], Some(&file_record(&[&f])), &previous));

        let plan = FilePlan::diff("a.py", desired(&[&f]), previous, false);
        assert!(plan.is_unchanged());
        assert_eq!(plan.chunks[0].metrics.lines, 42);
        assert_eq!(plan.to_embed().count(), 0);
    }

    #[test]
    fn test_edit_delete_and_insert() {
        let f_old = chunk("a.py", "f", "def f(): pass");
        let g = chunk("a.py", "g", "def g(): pass");
        let previous = BTreeMap::from([
            (f_old.id.clone(), record_for(&f_old, RecordStatus::Indexed)),
            (g.id.clone(), record_for(&g, RecordStatus::Indexed)),
        ]);

        let f_new = chunk("a.py", "f", "def f(): return 1");
        let h = chunk("a.py", "h", "def h(): pass");
        let plan = FilePlan::diff("a.py", desired(&[&f_new, &h]), previous, false);

        assert_eq!(plan.chunks[0].state, ChunkState::Changed);
        assert_eq!(plan.chunks[0].metrics.lines, 0);
        assert_eq!(plan.chunks[1].state, ChunkState::New);
        assert_eq!(plan.obsolete.len(), 1);
        assert_eq!(plan.obsolete[0].chunk_id, g.id);

        let mut stale = plan.stale_vector_ids();
        stale.sort();
        assert_eq!(stale, vec!["r:a.py#f".to_string(), "r:a.py#g".to_string()]);
    }

    #[test]
    fn test_pending_record_is_changed() {
        let f = chunk("a.py", "f", "def f(): pass");
        let previous = BTreeMap::from([(f.id.clone(), record_for(&f, RecordStatus::Pending))]);
        let fp = file_fingerprint([&f.fingerprint]);
        assert!(!FilePlan::file_unchanged(&fp, &[f.id.clone()], Some(&file_record(&[&f])), &previous));

        let plan = FilePlan::diff("a.py", desired(&[&f]), previous, false);
        assert_eq!(plan.chunks[0].state, ChunkState::Changed);
        // Nothing stored for a pending record
        assert!(plan.stale_vector_ids().is_empty());
    }

    #[test]
    fn test_rebuild_replaces_everything() {
        let f = chunk("a.py", "f", "def f(): pass");
        let previous = BTreeMap::from([(f.id.clone(), record_for(&f, RecordStatus::Indexed))]);
        let plan = FilePlan::diff("a.py", desired(&[&f]), previous, true);
        assert_eq!(plan.chunks[0].state, ChunkState::Changed);
        assert_eq!(plan.stale_vector_ids(), vec!["r:a.py#f".to_string()]);
        assert!(!plan.is_unchanged());
    }

    #[test]
    fn test_file_emptied() {
        let f = chunk("a.py", "f", "def f(): pass");
        let previous = BTreeMap::from([(f.id.clone(), record_for(&f, RecordStatus::Indexed))]);
        let plan = FilePlan::diff("a.py", vec![], previous, false);
        assert!(plan.chunks.is_empty());
        assert_eq!(plan.obsolete.len(), 1);
        assert!(!plan.is_unchanged());
    }
}
