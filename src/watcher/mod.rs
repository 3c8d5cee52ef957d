//! Watcher bridge: turns file-system notifications into index passes.
//!
//! ```text
//! notify ──ChangeEvent──▶ debounce task ──ChangeBatch──▶ coordinator ──▶ CodeIndex
//!                                                            │
//!                                             PassReport ◀───┘ (broadcast)
//! ```
//!
//! The coordinator is the only task that starts passes. A new batch cancels
//! the pass in flight, waits for it to wind down, then starts a pass covering
//! the new batch plus whatever the superseded pass did not finish.

mod debounce;

pub use debounce::{ChangeBatch, ChangeEvent, ChangeKind, DebounceState};

use crate::client::CodeIndex;
use crate::config::WatcherConfig;
use crate::paths::PlatformPaths;
use crate::types::{IndexRequest, PassReport};
use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const REPORT_CAPACITY: usize = 32;

pub struct WatcherBridge;

impl WatcherBridge {
    /// Watch the request's root recursively. An initial full pass runs first.
    pub fn spawn(index: CodeIndex, request: IndexRequest, config: &WatcherConfig) -> Result<WatcherHandle> {
        request.validate()?;
        let root = PlatformPaths::normalize_root(&request.path)
            .with_context(|| format!("Failed to canonicalize path: {}", request.path))?;
        let root_path = PathBuf::from(&root);

        // Our own state files must not trigger passes
        let mut ignored = vec![root_path.join(".git")];
        if let Some(state_dir) = index.config().storage.state_path.parent()
            && let Ok(state_dir) = std::fs::canonicalize(state_dir)
        {
            ignored.push(state_dir);
        }
        if let Some(vector_path) = &index.config().storage.vector_store_path
            && let Some(parent) = vector_path.parent()
            && let Ok(parent) = std::fs::canonicalize(parent)
        {
            ignored.push(parent);
        }

        let (event_tx, event_rx) = mpsc::channel(config.channel_capacity);
        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    for change in change_events(event) {
                        if ignored.iter().any(|dir| change.path.starts_with(dir)) {
                            continue;
                        }
                        // The receiver is gone only after shutdown
                        if event_tx.blocking_send(change).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => tracing::warn!("Watcher error: {}", e),
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;
        watcher
            .watch(&root_path, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root))?;
        tracing::info!("Watching {}", root);

        let mut handle = Self::start(index, request, root, config, event_rx, true);
        handle.watcher = Some(watcher);
        Ok(handle)
    }

    /// Drive the bridge from a plain event channel instead of the file system
    pub fn from_events(
        index: CodeIndex,
        request: IndexRequest,
        config: &WatcherConfig,
        events: mpsc::Receiver<ChangeEvent>,
    ) -> Result<WatcherHandle> {
        request.validate()?;
        let root = PlatformPaths::normalize_root(&request.path)
            .with_context(|| format!("Failed to canonicalize path: {}", request.path))?;
        Ok(Self::start(index, request, root, config, events, false))
    }

    fn start(
        index: CodeIndex,
        request: IndexRequest,
        root: String,
        config: &WatcherConfig,
        events: mpsc::Receiver<ChangeEvent>,
        initial_pass: bool,
    ) -> WatcherHandle {
        let shutdown = CancellationToken::new();
        let (batch_tx, batch_rx) = mpsc::channel(config.channel_capacity);
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);

        let debounce = DebounceState::new(
            Duration::from_millis(config.debounce_ms),
            Duration::from_millis(config.max_batch_wait_ms.max(config.debounce_ms)),
        );
        let debouncer = tokio::spawn(run_debounce(debounce, events, batch_tx, shutdown.clone()));

        let coordinator = Coordinator {
            index,
            request,
            root,
            reports: reports.clone(),
            shutdown: shutdown.clone(),
        };
        let coordinator = tokio::spawn(coordinator.run(batch_rx, initial_pass));

        WatcherHandle {
            reports,
            shutdown,
            tasks: vec![debouncer, coordinator],
            watcher: None,
        }
    }
}

/// Running bridge. Dropping it without [`WatcherHandle::shutdown`] leaves the
/// tasks running until the event source closes.
pub struct WatcherHandle {
    reports: broadcast::Sender<PassReport>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    watcher: Option<RecommendedWatcher>,
}

impl WatcherHandle {
    /// Reports of every pass the bridge runs, cancelled ones included
    pub fn subscribe(&self) -> broadcast::Receiver<PassReport> {
        self.reports.subscribe()
    }

    /// Stop watching, cancel the pass in flight and wait for all tasks
    pub async fn shutdown(mut self) {
        drop(self.watcher.take());
        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!("Watcher task failed: {}", e);
            }
        }
        tracing::info!("Watcher stopped");
    }
}

/// Map a notify event to per-path changes
fn change_events(event: Event) -> Vec<ChangeEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Remove(_) => ChangeKind::Deleted,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Deleted,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Created,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            let from = paths.next().map(|p| ChangeEvent::new(p, ChangeKind::Deleted));
            let to = paths.next().map(|p| ChangeEvent::new(p, ChangeKind::Created));
            return from.into_iter().chain(to).collect();
        }
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => ChangeKind::Modified,
        EventKind::Access(_) => return Vec::new(),
    };
    event
        .paths
        .into_iter()
        .map(|path| ChangeEvent::new(path, kind))
        .collect()
}

async fn run_debounce(
    mut state: DebounceState,
    mut events: mpsc::Receiver<ChangeEvent>,
    batches: mpsc::Sender<ChangeBatch>,
    shutdown: CancellationToken,
) {
    loop {
        let deadline = state.next_deadline();
        tokio::select! {
            _ = shutdown.cancelled() => return,
            event = events.recv() => match event {
                Some(event) => state.record(event, Instant::now()),
                None => break,
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some(batch) = state.take() {
                    tracing::debug!("Releasing batch of {} paths ({} events)", batch.len(), batch.events);
                    if batches.send(batch).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    // Event source closed: whatever is pending goes out now
    if let Some(batch) = state.take() {
        let _ = batches.send(batch).await;
    }
}

/// What a pass covers
#[derive(Debug, Clone, Default)]
struct Scope {
    full: bool,
    paths: BTreeSet<String>,
}

impl Scope {
    fn merge(&mut self, other: Scope) {
        self.full |= other.full;
        self.paths.extend(other.paths);
    }

    fn is_empty(&self) -> bool {
        !self.full && self.paths.is_empty()
    }
}

struct InFlight {
    token: CancellationToken,
    scope: Scope,
    task: JoinHandle<bool>,
}

impl InFlight {
    /// Scope left unfinished by the pass, if any
    async fn finish(self, cancel: bool) -> Option<Scope> {
        if cancel {
            self.token.cancel();
        }
        match self.task.await {
            Ok(true) => None,
            Ok(false) => Some(self.scope),
            Err(e) => {
                tracing::warn!("Pass task failed: {}", e);
                Some(self.scope)
            }
        }
    }
}

struct Coordinator {
    index: CodeIndex,
    request: IndexRequest,
    root: String,
    reports: broadcast::Sender<PassReport>,
    shutdown: CancellationToken,
}

impl Coordinator {
    async fn run(self, mut batches: mpsc::Receiver<ChangeBatch>, initial_pass: bool) {
        let mut in_flight = initial_pass.then(|| {
            self.start_pass(Scope {
                full: true,
                paths: BTreeSet::new(),
            })
        });

        loop {
            let batch = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    if let Some(pass) = in_flight.take() {
                        pass.finish(true).await;
                    }
                    return;
                }
                batch = batches.recv() => batch,
            };

            let Some(batch) = batch else {
                // No more changes: let the last pass complete
                if let Some(pass) = in_flight.take() {
                    pass.finish(false).await;
                }
                return;
            };

            let mut scope = self.scope_of(&batch);
            if let Some(pass) = in_flight.take() {
                tracing::debug!("Superseding pass in flight");
                if let Some(unfinished) = pass.finish(true).await {
                    scope.merge(unfinished);
                }
            }
            if !scope.is_empty() {
                in_flight = Some(self.start_pass(scope));
            }
        }
    }

    fn scope_of(&self, batch: &ChangeBatch) -> Scope {
        let mut scope = Scope::default();
        for path in batch.paths() {
            let absolute = if path.is_absolute() {
                path.clone()
            } else {
                Path::new(&self.root).join(path)
            };
            // A new or renamed directory carries files we have no events for
            if absolute.is_dir() {
                scope.full = true;
                continue;
            }
            if let Some(relative) = PlatformPaths::relative_to(&self.root, path) {
                scope.paths.insert(relative);
            }
        }
        scope
    }

    fn start_pass(&self, scope: Scope) -> InFlight {
        let token = self.shutdown.child_token();
        let index = self.index.clone();
        let request = self.request.clone();
        let reports = self.reports.clone();
        let pass_scope = scope.clone();
        let pass_token = token.clone();

        tracing::info!(
            "Starting {} pass over {}",
            if scope.full {
                "full".to_string()
            } else {
                format!("{}-file", scope.paths.len())
            },
            self.root
        );

        let task = tokio::spawn(async move {
            let result = if pass_scope.full {
                index.index(request, pass_token).await
            } else {
                let paths: Vec<String> = pass_scope.paths.into_iter().collect();
                index.index_files(&request, &paths, pass_token).await
            };
            match result {
                Ok(report) => {
                    let completed = !report.cancelled;
                    // No subscribers is fine
                    let _ = reports.send(report);
                    completed
                }
                Err(e) => {
                    tracing::warn!("Watcher pass failed: {:#}", e);
                    false
                }
            }
        });

        InFlight { token, scope, task }
    }
}
