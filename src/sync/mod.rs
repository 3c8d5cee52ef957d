//! Index synchronization: brings the persisted index state, the vector store
//! and the relationship graph of one root in line with the files on disk.
//!
//! ## Pass outline
//!
//! 1. Scan the root. Files whose raw content hash, chunker signature and
//!    records are all current are reused without parsing.
//! 2. Everything else is parsed, chunked and fingerprinted on the worker pool
//!    and diffed against its persisted records ([`FilePlan`]).
//! 3. New and changed chunk texts are embedded once per fingerprint.
//! 4. Removed files are committed first, then changed files in priority
//!    order. A file commit deletes stale vectors, upserts new ones, then
//!    replaces the file's records and relationships under one write guard.
//! 5. Edges with an endpoint outside the live record set are retracted and
//!    their files marked for rebuild.
//!
//! A root is flagged `dirty` for the duration of a pass. A pass that finds the
//! flag still set (the previous one crashed) rebuilds every file.

mod embed;
pub mod pipeline;
pub mod plan;


pub use embed::{EmbedSettings, Embedded};
pub use pipeline::{DeriveJob, DerivedFile, Pipeline};
pub use plan::{ChunkOutcome, ChunkState, FilePlan, PlannedChunk};

use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::{IndexError, RelationshipConsistencyError, ScanError};
use crate::indexer::{
    ChunkId, CodeChunk, CodeChunker, Fingerprint, Metrics, ParserRegistry, ScanOutcome, SourceFile,
};
use crate::indexer::FileWalker;
use crate::paths::PlatformPaths;
use crate::relations::{EdgeDelta, RawReference, ReferenceExtractor, Symbol};
use crate::state::{FileRecord, IndexRecord, IndexStore, RecordStatus};
use crate::types::{ClearResponse, FileFailure, IndexRequest, ParseWarning, PassMode, PassReport};
use crate::vector_db::{PointPayload, VectorPoint, VectorStore, point_id};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Persisted state of one root as seen at the start of a pass
#[derive(Default)]
struct RootSnapshot {
    files: BTreeMap<String, FileRecord>,
    /// Records grouped by the file their id belongs to
    records: BTreeMap<String, BTreeMap<ChunkId, IndexRecord>>,
    needs_rebuild: BTreeSet<String>,
    embedding_model: Option<String>,
    /// Edges re-bound because the configured tie-break order changed
    rebound: EdgeDelta,
}

/// A derived file waiting to be committed
struct FileWork {
    source: SourceFile,
    fingerprint: Fingerprint,
    symbols: Vec<Symbol>,
    references: Vec<RawReference>,
    parse_warning: Option<String>,
    plan: FilePlan,
    /// Same chunks as persisted; only the file record is refreshed
    unchanged: bool,
}

pub struct IndexSynchronizer {
    config: Arc<Config>,
    store: IndexStore,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    pipeline: Pipeline,
    pool: Arc<rayon::ThreadPool>,
    embed_settings: EmbedSettings,
    /// One pass at a time
    pass_lock: Mutex<()>,
}

impl IndexSynchronizer {
    pub fn new(
        config: Arc<Config>,
        store: IndexStore,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, IndexError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.indexing.worker_threads)
            .thread_name(|i| format!("semindex-worker-{}", i))
            .build()
            .map_err(|e| IndexError::other(format!("Failed to build worker pool: {}", e)))?;

        let pipeline = Pipeline {
            parsers: ParserRegistry::with_default_backends(),
            chunker: CodeChunker::from_config(&config.indexing),
            extractor: Arc::new(ReferenceExtractor::new()?),
            relations: config.relations.enabled,
        };

        Ok(Self {
            embed_settings: EmbedSettings::from_config(&config.embedding),
            config,
            store,
            vectors,
            embedder,
            pipeline,
            pool: Arc::new(pool),
            pass_lock: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn vectors(&self) -> &Arc<dyn VectorStore> {
        &self.vectors
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one pass over the request's root
    pub async fn sync(
        &self,
        request: &IndexRequest,
        cancel: CancellationToken,
    ) -> Result<PassReport, IndexError> {
        self.run(request, None, cancel).await
    }

    /// Pass restricted to `paths` (root-relative). Listed files that exist are
    /// fully re-derived; listed files that are gone are removed.
    pub async fn sync_files(
        &self,
        request: &IndexRequest,
        paths: &[String],
        cancel: CancellationToken,
    ) -> Result<PassReport, IndexError> {
        let scope: BTreeSet<String> = paths.iter().map(|p| normalize_relative(p)).collect();
        self.run(request, Some(scope), cancel).await
    }

    async fn run(
        &self,
        request: &IndexRequest,
        scope: Option<BTreeSet<String>>,
        cancel: CancellationToken,
    ) -> Result<PassReport, IndexError> {
        request.validate()?;
        let _pass = self.pass_lock.lock().await;
        let start = Instant::now();
        let root = PlatformPaths::normalize_root(&request.path)?;
        let model_key = self.embedder.model_key();

        let Some(scan) = self.scan(&root, request, &cancel).await? else {
            tracing::info!("Pass over {} cancelled during scan", root);
            let mut report = PassReport::new(&root, PassMode::Incremental);
            report.cancelled = true;
            report.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(report);
        };

        let mut snapshot = self.begin(&root).await?;
        let model_changed = snapshot
            .embedding_model
            .as_deref()
            .is_some_and(|stored| stored != model_key);
        if model_changed {
            tracing::info!(
                "Embedding model changed ({:?} -> {}), re-embedding every file",
                snapshot.embedding_model,
                model_key
            );
        }
        let rebuild_all = request.force || model_changed;
        let mode = if rebuild_all || snapshot.files.is_empty() {
            PassMode::Full
        } else {
            PassMode::Incremental
        };

        let mut report = PassReport::new(&root, mode);
        report.edges_added = snapshot.rebound.added;
        report.edges_removed = snapshot.rebound.removed;
        report.files_scanned = scan.files.len();
        report.files_skipped = scan.skipped;
        tracing::info!(
            "Starting {:?} pass over {} ({} files scanned)",
            mode,
            root,
            report.files_scanned
        );

        let in_scope = |path: &str| scope.as_ref().is_none_or(|s| s.contains(path));
        let scanned: HashSet<String> = scan.files.iter().map(|f| f.relative_path.clone()).collect();
        let removed: BTreeSet<String> = snapshot
            .files
            .keys()
            .chain(snapshot.records.keys())
            .filter(|path| !scanned.contains(path.as_str()) && in_scope(path.as_str()))
            .cloned()
            .collect();

        // Desired state
        let signature = self.pipeline.chunker.signature();
        let mut jobs = Vec::new();
        let mut rebuild_flags = Vec::new();
        for file in scan.files {
            let path = file.relative_path.as_str();
            if !in_scope(path) {
                continue;
            }
            let rebuild = rebuild_all || snapshot.needs_rebuild.contains(path);
            let previous = snapshot.records.get(path);
            // Listed files are always re-derived; their chunks still diff by fingerprint
            let rederive = rebuild || scope.is_some();
            if !rederive && can_reuse(&file, snapshot.files.get(path), previous, &signature) {
                tracing::debug!("Reusing {} (content unchanged)", path);
                report.files_unchanged += 1;
                report.chunks_unchanged += previous.map_or(0, BTreeMap::len);
                continue;
            }
            let known_metrics = previous
                .map(|records| {
                    records
                        .values()
                        .map(|r| (r.fingerprint, r.metrics))
                        .collect()
                })
                .unwrap_or_default();
            jobs.push(DeriveJob {
                source: file,
                known_metrics,
            });
            rebuild_flags.push(rebuild);
        }

        let pipeline = self.pipeline.clone();
        let pool = self.pool.clone();
        let derived = tokio::task::spawn_blocking(move || pipeline.derive_all(&pool, jobs))
            .await
            .map_err(|e| IndexError::other(format!("Derive task failed: {}", e)))?;

        // Diff against actual state
        let mut work = Vec::with_capacity(derived.len());
        for (derived, rebuild) in derived.into_iter().zip(rebuild_flags) {
            work.push(self.plan_file(derived, rebuild, &mut snapshot, &mut report));
        }

        let texts: Vec<(Fingerprint, String)> = work
            .iter()
            .filter(|w| !w.unchanged)
            .flat_map(|w| w.plan.to_embed())
            .map(|c| (c.chunk.fingerprint, c.chunk.content.clone()))
            .collect();
        let embedded =
            embed::embed_texts(self.embedder.clone(), texts, &self.embed_settings, &cancel).await;
        report.embedding_calls = embedded.calls;

        // Apply
        for path in removed {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let records = snapshot.records.remove(&path).unwrap_or_default();
            self.commit_removal(&root, &path, records, &mut report).await;
        }
        for file in work {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            self.commit_file(&root, file, &embedded, &mut report).await;
        }

        self.check_consistency(&root, &mut report).await;
        let complete = !report.cancelled && scope.is_none();
        self.finish(&root, complete.then_some(model_key), &mut report)
            .await?;

        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Pass over {} finished in {}ms: {} processed, {} unchanged, {} removed, {} chunks embedded, {} deleted, {} pending, {} failed files{}",
            root,
            report.duration_ms,
            report.files_processed,
            report.files_unchanged,
            report.files_removed,
            report.chunks_embedded,
            report.chunks_deleted,
            report.chunks_pending,
            report.files_failed.len(),
            if report.cancelled { " (cancelled)" } else { "" }
        );
        Ok(report)
    }

    /// Remove `paths` (root-relative) from the index whether or not they
    /// still exist on disk
    pub async fn remove_files(
        &self,
        root_path: &str,
        paths: &[String],
    ) -> Result<PassReport, IndexError> {
        let _pass = self.pass_lock.lock().await;
        let start = Instant::now();
        let root = PlatformPaths::normalize_root(root_path).unwrap_or_else(|_| root_path.to_string());

        let mut report = PassReport::new(&root, PassMode::Incremental);
        if self.store.read().await.root(&root).is_none() {
            return Ok(report);
        }

        let mut snapshot = self.begin(&root).await?;
        for path in paths.iter().map(|p| normalize_relative(p)) {
            let known = snapshot.files.contains_key(&path) || snapshot.records.contains_key(&path);
            if !known {
                continue;
            }
            let records = snapshot.records.remove(&path).unwrap_or_default();
            self.commit_removal(&root, &path, records, &mut report).await;
        }

        self.check_consistency(&root, &mut report).await;
        self.finish(&root, None, &mut report).await?;
        report.duration_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Drop every record, relationship and vector of a root
    pub async fn clear(&self, root_path: &str) -> Result<ClearResponse, IndexError> {
        let _pass = self.pass_lock.lock().await;
        let root = PlatformPaths::normalize_root(root_path).unwrap_or_else(|_| root_path.to_string());

        let (files, ids) = {
            let state = self.store.read().await;
            match state.root(&root) {
                Some(root_state) => (
                    root_state.files.len(),
                    root_state.embedding_ids().map(str::to_string).collect::<Vec<_>>(),
                ),
                None => (0, Vec::new()),
            }
        };

        let vectors_removed = if ids.is_empty() {
            0
        } else {
            self.vectors.delete(&ids).await?
        };
        self.store.write().await.remove_root(&root);
        self.vectors.flush().await?;
        self.store.save().await?;

        tracing::info!(
            "Cleared {}: {} files, {} vectors",
            root,
            files,
            vectors_removed
        );
        Ok(ClearResponse {
            root,
            files_removed: files,
            vectors_removed,
        })
    }

    async fn scan(
        &self,
        root: &str,
        request: &IndexRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<ScanOutcome>, IndexError> {
        // The walker runs on a blocking thread and polls a plain flag
        let cancelled = Arc::new(AtomicBool::new(cancel.is_cancelled()));
        let flag = cancelled.clone();
        let token = cancel.clone();
        let bridge = tokio::spawn(async move {
            token.cancelled().await;
            flag.store(true, Ordering::Relaxed);
            tracing::debug!("Cancellation flag set for file walker");
        });

        let walker = FileWalker::from_config(
            root,
            &self.config.indexing,
            &request.include_patterns,
            &request.exclude_patterns,
        )?
        .with_cancellation_flag(cancelled);

        let result = tokio::task::spawn_blocking(move || walker.walk()).await;
        bridge.abort();

        match result.map_err(|e| IndexError::other(format!("Scan task failed: {}", e)))? {
            Ok(outcome) => Ok(Some(outcome)),
            Err(ScanError::Cancelled) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Flag the root dirty, persist the flag, and snapshot its state. A root
    /// that is still dirty from an earlier pass has all files marked for rebuild.
    async fn begin(&self, root: &str) -> Result<RootSnapshot, IndexError> {
        let snapshot = {
            let mut state = self.store.write().await;
            let root_state = state.root_mut(root);
            if root_state.dirty {
                tracing::warn!(
                    "Previous pass over {} did not complete, rebuilding all {} files",
                    root,
                    root_state.files.len()
                );
                let files: Vec<String> = root_state.files.keys().cloned().collect();
                root_state.needs_rebuild.extend(files);
            }
            root_state.dirty = true;

            let mut rebound = EdgeDelta::default();
            let tie_break = &self.config.relations.tie_break;
            if root_state.graph.tie_break() != tie_break.as_slice() {
                root_state.graph.set_tie_break(tie_break.clone());
                rebound = root_state.graph.resolve_references();
            }

            let mut records: BTreeMap<String, BTreeMap<ChunkId, IndexRecord>> = BTreeMap::new();
            for (id, record) in &root_state.records {
                records
                    .entry(id.file_path().to_string())
                    .or_default()
                    .insert(id.clone(), record.clone());
            }
            RootSnapshot {
                files: root_state.files.clone(),
                records,
                needs_rebuild: root_state.needs_rebuild.clone(),
                embedding_model: root_state.embedding_model.clone(),
                rebound,
            }
        };
        self.store.save().await?;
        Ok(snapshot)
    }

    fn plan_file(
        &self,
        derived: DerivedFile,
        rebuild: bool,
        snapshot: &mut RootSnapshot,
        report: &mut PassReport,
    ) -> FileWork {
        let DerivedFile {
            source,
            chunks,
            metrics,
            fingerprint,
            symbols,
            references,
            parse_warning,
        } = derived;
        let path = source.relative_path.clone();

        if let Some(message) = &parse_warning {
            report.parse_warnings.push(ParseWarning {
                path: path.clone(),
                message: message.clone(),
            });
        }

        let previous = snapshot.records.remove(&path).unwrap_or_default();
        let chunk_ids: Vec<ChunkId> = chunks.iter().map(|c| c.id.clone()).collect();
        let unchanged = !rebuild
            && FilePlan::file_unchanged(&fingerprint, &chunk_ids, snapshot.files.get(&path), &previous);

        let plan = FilePlan::diff(&path, chunks.into_iter().zip(metrics).collect(), previous, rebuild);
        tracing::debug!(
            "Planned {}: {} new, {} changed, {} unchanged, {} obsolete",
            path,
            plan.count(ChunkState::New),
            plan.count(ChunkState::Changed),
            plan.count(ChunkState::Unchanged),
            plan.obsolete.len()
        );

        FileWork {
            source,
            fingerprint,
            symbols,
            references,
            parse_warning,
            plan,
            unchanged,
        }
    }

    async fn commit_file(
        &self,
        root: &str,
        work: FileWork,
        embedded: &Embedded,
        report: &mut PassReport,
    ) {
        let FileWork {
            source,
            fingerprint,
            symbols,
            references,
            parse_warning,
            plan,
            unchanged,
        } = work;
        let now = chrono::Utc::now().timestamp();

        if unchanged {
            let mut state = self.store.write().await;
            if let Some(record) = state.root_mut(root).files.get_mut(&plan.path) {
                record.content_hash = source.content_hash;
                record.chunker = self.pipeline.chunker.signature();
                record.size = source.size;
                record.modified_at = source.modified_at;
                record.parse_warning = parse_warning;
            }
            report.files_unchanged += 1;
            report.chunks_unchanged += plan.chunks.len();
            return;
        }

        // Vectors of obsolete and changed chunks go before new ones are written
        let stale = plan.stale_vector_ids();
        if !stale.is_empty()
            && let Err(e) = self.vectors.delete(&stale).await
        {
            self.fail_file(root, &plan.path, e, report).await;
            return;
        }

        let mut points = Vec::new();
        let mut first_failure = None;
        for planned in plan.to_embed() {
            match embedded.vector(&planned.chunk.fingerprint) {
                Some(vector) => points.push(VectorPoint {
                    id: point_id(root, &planned.chunk.id),
                    vector: vector.clone(),
                    payload: payload(root, &planned.chunk),
                }),
                None => {
                    if first_failure.is_none() {
                        first_failure = Some(
                            embedded
                                .failures
                                .get(&planned.chunk.fingerprint)
                                .map_or_else(|| "embedding was not attempted".to_string(), |e| e.to_string()),
                        );
                    }
                }
            }
        }
        let stored: HashSet<ChunkId> = points.iter().map(|p| p.payload.chunk_id.clone()).collect();
        if !points.is_empty()
            && let Err(e) = self.vectors.upsert(points).await
        {
            self.fail_file(root, &plan.path, e, report).await;
            return;
        }

        let FilePlan {
            path,
            chunks,
            obsolete,
        } = plan;
        let chunk_ids: Vec<ChunkId> = chunks.iter().map(|c| c.chunk.id.clone()).collect();
        let file_metrics = Metrics::aggregate(chunks.iter().map(|c| &c.metrics));

        let mut records = Vec::with_capacity(chunks.len());
        let (mut skipped, mut embedded_count, mut pending) = (0, 0, 0);
        for planned in chunks {
            let PlannedChunk {
                chunk,
                metrics,
                state,
                previous,
            } = planned;
            let (record, outcome) = match (state, previous) {
                (ChunkState::Unchanged, Some(previous)) => {
                    (refresh_record(previous, &chunk), ChunkOutcome::Skipped)
                }
                _ if stored.contains(&chunk.id) => (
                    IndexRecord::from_chunk(&chunk, metrics, Some(point_id(root, &chunk.id)), now),
                    ChunkOutcome::Embedded,
                ),
                _ => (
                    IndexRecord::from_chunk(&chunk, metrics, None, now),
                    ChunkOutcome::Pending,
                ),
            };
            match outcome {
                ChunkOutcome::Skipped => skipped += 1,
                ChunkOutcome::Embedded => embedded_count += 1,
                ChunkOutcome::Pending => pending += 1,
                ChunkOutcome::Deleted => {}
            }
            records.push(record);
        }

        let file_record = FileRecord {
            path: path.clone(),
            language: source.language,
            content_hash: source.content_hash,
            fingerprint,
            chunk_ids,
            chunker: self.pipeline.chunker.signature(),
            size: source.size,
            modified_at: source.modified_at,
            indexed_at: now,
            metrics: file_metrics,
            parse_warning,
        };

        // Readers see either the old or the new file
        let delta = {
            let mut state = self.store.write().await;
            let root_state = state.root_mut(root);
            for record in &obsolete {
                root_state.records.remove(&record.chunk_id);
            }
            for record in records {
                root_state.records.insert(record.chunk_id.clone(), record);
            }
            root_state.files.insert(path.clone(), file_record);
            let delta = root_state.graph.upsert_symbols(&path, symbols, references);
            if pending == 0 {
                root_state.needs_rebuild.remove(&path);
            }
            delta
        };

        report.files_processed += 1;
        report.chunks_unchanged += skipped;
        report.chunks_embedded += embedded_count;
        report.chunks_pending += pending;
        report.chunks_deleted += obsolete.len();
        report.edges_added += delta.added;
        report.edges_removed += delta.removed;

        if pending > 0 {
            let error = format!(
                "{} chunks pending embedding: {}",
                pending,
                first_failure.unwrap_or_default()
            );
            tracing::warn!("{}: {}", path, error);
            report.files_failed.push(FileFailure { path, error });
        } else {
            tracing::debug!(
                "Committed {}: {} embedded, {} unchanged, {} deleted",
                path,
                embedded_count,
                skipped,
                obsolete.len()
            );
        }
    }

    /// Delete a vanished file's vectors, then its records and relationships in
    /// one critical section
    async fn commit_removal(
        &self,
        root: &str,
        path: &str,
        records: BTreeMap<ChunkId, IndexRecord>,
        report: &mut PassReport,
    ) {
        let ids: Vec<String> = records
            .values()
            .filter_map(|r| r.embedding_id.clone())
            .collect();
        if !ids.is_empty()
            && let Err(e) = self.vectors.delete(&ids).await
        {
            self.fail_file(root, path, e, report).await;
            return;
        }

        let removed = self.store.write().await.root_mut(root).remove_file(path);
        tracing::debug!(
            "Removed {}: {} chunks, {} edges",
            path,
            removed.records.len(),
            removed.edges.removed
        );
        report.files_removed += 1;
        report.chunks_deleted += removed.records.len();
        report.edges_added += removed.edges.added;
        report.edges_removed += removed.edges.removed;
    }

    async fn fail_file(&self, root: &str, path: &str, error: impl Display, report: &mut PassReport) {
        tracing::warn!("Failed to apply changes to {}: {}", path, error);
        report.files_failed.push(FileFailure {
            path: path.to_string(),
            error: error.to_string(),
        });
        self.store
            .write()
            .await
            .root_mut(root)
            .needs_rebuild
            .insert(path.to_string());
    }

    /// Retract edges whose endpoints are not live records and mark their files
    /// for rebuild
    async fn check_consistency(&self, root: &str, report: &mut PassReport) {
        let mut state = self.store.write().await;
        let root_state = state.root_mut(root);

        let records = &root_state.records;
        let mut errors = root_state.graph.dangling_edges(|chunk| records.contains_key(chunk));
        errors.extend(root_state.graph.orphan_symbols(|chunk| records.contains_key(chunk)));

        for error in errors {
            tracing::warn!("{}", error);
            let file = error.file().to_string();
            match &error {
                RelationshipConsistencyError::DanglingEdge { .. } => {
                    report.edges_removed += root_state.graph.retract_edges(&file);
                }
                RelationshipConsistencyError::OrphanSymbol { .. } => {
                    let delta = root_state.graph.remove_file(&file);
                    report.edges_added += delta.added;
                    report.edges_removed += delta.removed;
                }
            }
            root_state.needs_rebuild.insert(file);
            report.consistency_errors.push(error.to_string());
        }
    }

    /// Flush vectors, then clear the dirty flag and persist. `model_key` is
    /// recorded only by a complete pass.
    async fn finish(
        &self,
        root: &str,
        model_key: Option<String>,
        report: &mut PassReport,
    ) -> Result<(), IndexError> {
        let flushed = match self.vectors.flush().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to flush vector store: {}", e);
                report.files_failed.push(FileFailure {
                    path: root.to_string(),
                    error: e.to_string(),
                });
                false
            }
        };

        {
            let mut state = self.store.write().await;
            let root_state = state.root_mut(root);
            // Unflushed vectors leave the root dirty so the next pass rebuilds
            root_state.dirty = !flushed;
            if let Some(model_key) = model_key {
                root_state.embedding_model = Some(model_key);
                root_state.last_indexed_at = Some(chrono::Utc::now().timestamp());
            }
        }
        self.store.save().await?;
        Ok(())
    }
}

/// Raw bytes, chunker and every record unchanged since the last pass
fn can_reuse(
    file: &SourceFile,
    record: Option<&FileRecord>,
    previous: Option<&BTreeMap<ChunkId, IndexRecord>>,
    signature: &str,
) -> bool {
    let Some(record) = record else {
        return false;
    };
    let empty = BTreeMap::new();
    let previous = previous.unwrap_or(&empty);

    record.content_hash == file.content_hash
        && record.chunker == signature
        && record.chunk_ids.len() == previous.len()
        && record.chunk_ids.iter().all(|id| {
            previous
                .get(id)
                .is_some_and(|r| r.status == RecordStatus::Indexed && r.embedding_id.is_some())
        })
}

/// Keep the embedding and metrics of an unchanged chunk, take its new position
fn refresh_record(mut record: IndexRecord, chunk: &CodeChunk) -> IndexRecord {
    record.start_line = chunk.start_line;
    record.end_line = chunk.end_line;
    record.start_byte = chunk.start_byte;
    record.end_byte = chunk.end_byte;
    record.symbol = chunk.symbol.clone();
    record.owner_symbol = chunk.owner_symbol.clone();
    record.context = chunk.context.clone();
    record
}

fn payload(root: &str, chunk: &CodeChunk) -> PointPayload {
    PointPayload {
        root: root.to_string(),
        chunk_id: chunk.id.clone(),
        file_path: chunk.file_path.clone(),
        language: chunk.language.map(|l| l.name().to_string()),
        start_line: chunk.start_line,
        end_line: chunk.end_line,
        symbol: chunk.symbol.clone(),
        context: chunk.context.clone(),
        content: chunk.content.clone(),
    }
}

/// Root-relative path with `/` separators and no leading `./`
pub fn normalize_relative(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.trim_start_matches("./").trim_start_matches('/').to_string()
}
