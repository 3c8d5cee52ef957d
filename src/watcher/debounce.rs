//! Coalescing of change events into batches.
//!
//! A batch is released once no event arrived for the quiet period, or once
//! the oldest pending event has waited the hard cap, whichever comes first.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl ChangeKind {
    /// Net effect of `self` followed by `next` on one path
    fn then(self, next: ChangeKind) -> ChangeKind {
        match (self, next) {
            (Self::Created, Self::Modified) => Self::Created,
            (Self::Deleted, Self::Created) => Self::Modified,
            (_, next) => next,
        }
    }
}

/// One file-system change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Absolute, or relative to the watched root
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Net changes per path since the previous batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    pub changes: BTreeMap<PathBuf, ChangeKind>,
    /// Raw events folded into this batch
    pub events: usize,
}

impl ChangeBatch {
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.changes.keys()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[derive(Debug)]
pub struct DebounceState {
    debounce: Duration,
    max_batch_wait: Duration,
    batch: ChangeBatch,
    first_event: Option<Instant>,
    last_event: Option<Instant>,
}

impl DebounceState {
    pub fn new(debounce: Duration, max_batch_wait: Duration) -> Self {
        Self {
            debounce,
            max_batch_wait,
            batch: ChangeBatch::default(),
            first_event: None,
            last_event: None,
        }
    }

    pub fn record(&mut self, event: ChangeEvent, now: Instant) {
        let kind = match self.batch.changes.get(&event.path) {
            Some(previous) => previous.then(event.kind),
            None => event.kind,
        };
        self.batch.changes.insert(event.path, kind);
        self.batch.events += 1;
        self.first_event.get_or_insert(now);
        self.last_event = Some(now);
    }

    /// Distinct paths waiting
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    /// When the pending batch becomes due, if anything is pending
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.batch.is_empty() {
            return None;
        }
        let quiet = self.last_event.map(|last| last + self.debounce);
        let capped = self.first_event.map(|first| first + self.max_batch_wait);
        match (quiet, capped) {
            (Some(quiet), Some(capped)) => Some(quiet.min(capped)),
            (quiet, capped) => quiet.or(capped),
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.next_deadline().is_some_and(|deadline| deadline <= now)
    }

    /// Release the pending batch regardless of deadlines
    pub fn take(&mut self) -> Option<ChangeBatch> {
        if self.batch.is_empty() {
            return None;
        }
        self.first_event = None;
        self.last_event = None;
        Some(std::mem::take(&mut self.batch))
    }
}
