//! File walking functionality for directory traversal
//!
//! Honors nested `.gitignore`, `.ignore` and `.semindexignore` files through the
//! `ignore` crate, applies include/exclude globs, the size limit, the extension
//! allow-list and the dotfile policy. Problem files are skipped with a recorded
//! reason; only an unusable root or cancellation fails the walk.

use super::file_info::SourceFile;
use super::fingerprint::fingerprint;
use super::language::{detect_for_path, dotfile_language};
use super::priority;
use crate::config::IndexingConfig;
use crate::error::{ScanError, ValidationError};
use crate::glob_utils::PathFilter;
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-directory ignore file understood in addition to `.gitignore`
pub const CUSTOM_IGNORE_FILE: &str = ".semindexignore";

/// Only this many leading bytes are inspected for binary content
const BINARY_SNIFF_LEN: usize = 8192;

/// Why a candidate file was not indexed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    TooLarge { size: u64, max: u64 },
    Binary,
    Unreadable { error: String },
    PermissionDenied,
    SymlinkLoop,
    AlreadyVisited,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Result of one scan
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub files: Vec<SourceFile>,
    pub skipped: Vec<SkippedFile>,
}

pub struct FileWalker {
    pub(crate) root: PathBuf,
    pub(crate) max_file_size: usize,
    pub(crate) filter: PathFilter,
    pub(crate) allowed_extensions: Vec<String>,
    pub(crate) include_dotfiles: bool,
    pub(crate) follow_symlinks: bool,
    pub(crate) prioritize: bool,
    /// Optional cancellation flag - if set to true, walk() will exit early
    cancelled: Option<Arc<AtomicBool>>,
}

impl FileWalker {
    pub fn new(root: impl AsRef<Path>, max_file_size: usize) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            max_file_size,
            filter: PathFilter::allow_all(),
            allowed_extensions: vec![],
            include_dotfiles: false,
            follow_symlinks: false,
            prioritize: false,
            cancelled: None,
        }
    }

    /// Walker configured from the indexing section plus request patterns
    pub fn from_config(
        root: impl AsRef<Path>,
        config: &IndexingConfig,
        include_patterns: &[String],
        exclude_patterns: &[String],
    ) -> Result<Self, ValidationError> {
        let mut exclude = config.exclude_patterns.clone();
        exclude.extend(exclude_patterns.iter().cloned());
        let include = if include_patterns.is_empty() {
            config.include_patterns.clone()
        } else {
            include_patterns.to_vec()
        };

        Ok(Self::new(root, config.max_file_size)
            .with_filter(PathFilter::new(&include, &exclude)?)
            .with_allowed_extensions(config.allowed_extensions.clone())
            .with_dotfiles(config.include_dotfiles)
            .with_follow_symlinks(config.follow_symlinks)
            .with_prioritization(config.prioritize))
    }

    pub fn with_filter(mut self, filter: PathFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_allowed_extensions(mut self, extensions: Vec<String>) -> Self {
        self.allowed_extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn with_dotfiles(mut self, include: bool) -> Self {
        self.include_dotfiles = include;
        self
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    pub fn with_prioritization(mut self, prioritize: bool) -> Self {
        self.prioritize = prioritize;
        self
    }

    /// Set a cancellation flag that will be checked during the walk.
    /// If the flag is set to true, the walk will exit early.
    pub fn with_cancellation_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = Some(cancelled);
        self
    }

    /// Check if cancellation has been requested
    fn is_cancelled(&self) -> bool {
        self.cancelled
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Walk the directory and collect all eligible files
    pub fn walk(&self) -> Result<ScanOutcome, ScanError> {
        if !self.root.exists() {
            return Err(ScanError::RootNotFound(self.root.display().to_string()));
        }
        if !self.root.is_dir() {
            return Err(ScanError::NotADirectory(self.root.display().to_string()));
        }

        let mut outcome = ScanOutcome::default();
        let mut visited: HashSet<PathBuf> = HashSet::new();

        let root = self.root.clone();
        let filter = self.filter.clone();
        let include_dotfiles = self.include_dotfiles;

        let walker = WalkBuilder::new(&self.root)
            .standard_filters(true) // Respect .gitignore, .ignore, etc.
            .hidden(false) // Dotfile policy is applied below
            .git_ignore(true)
            .git_exclude(true)
            .git_global(true)
            .require_git(false) // Don't require a .git directory
            .follow_links(self.follow_symlinks)
            .add_custom_ignore_filename(CUSTOM_IGNORE_FILE)
            .filter_entry(move |entry| {
                if entry.depth() == 0 || !entry.file_type().is_some_and(|t| t.is_dir()) {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                if name == ".git" || (name.starts_with('.') && !include_dotfiles) {
                    return false;
                }
                !filter.excludes_dir(&relative_path(&root, entry.path()))
            })
            .build();

        for result in walker {
            // Check for cancellation at the start of each iteration
            if self.is_cancelled() {
                tracing::info!("File walk cancelled after {} files", outcome.files.len());
                return Err(ScanError::Cancelled);
            }

            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    let skipped = classify_walk_error(&self.root, &err);
                    tracing::warn!("Skipping {}: {:?}", skipped.path, skipped.reason);
                    outcome.skipped.push(skipped);
                    continue;
                }
            };

            let Some(file_type) = entry.file_type() else {
                continue; // stdin
            };
            if !file_type.is_file() {
                if file_type.is_symlink() {
                    tracing::debug!("Not following symlink: {:?}", entry.path());
                }
                continue;
            }

            let path = entry.path();
            let relative = relative_path(&self.root, path);

            if !self.filter.is_allowed(&relative) {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy();
            if file_name.starts_with('.')
                && !self.include_dotfiles
                && dotfile_language(&file_name).is_none()
            {
                continue;
            }

            let extension = path.extension().and_then(|e| e.to_str()).map(String::from);
            if !self.allowed_extensions.is_empty()
                && !extension
                    .as_ref()
                    .is_some_and(|e| self.allowed_extensions.contains(&e.to_lowercase()))
            {
                continue;
            }

            // A symlinked file reachable twice is only indexed once
            if (self.follow_symlinks || entry.path_is_symlink())
                && let Ok(canonical) = fs::canonicalize(path)
                && !visited.insert(canonical)
            {
                outcome.skipped.push(SkippedFile {
                    path: relative,
                    reason: SkipReason::AlreadyVisited,
                });
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    outcome.skipped.push(classify_walk_error(&self.root, &err));
                    continue;
                }
            };

            if metadata.len() > self.max_file_size as u64 {
                tracing::debug!("Skipping large file: {:?}", path);
                outcome.skipped.push(SkippedFile {
                    path: relative,
                    reason: SkipReason::TooLarge {
                        size: metadata.len(),
                        max: self.max_file_size as u64,
                    },
                });
                continue;
            }

            let bytes = match fs::read(path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    let reason = if err.kind() == std::io::ErrorKind::PermissionDenied {
                        SkipReason::PermissionDenied
                    } else {
                        SkipReason::Unreadable {
                            error: err.to_string(),
                        }
                    };
                    tracing::warn!("Skipping unreadable file {:?}: {}", path, err);
                    outcome.skipped.push(SkippedFile {
                        path: relative,
                        reason,
                    });
                    continue;
                }
            };

            if !is_probably_text(&bytes) {
                tracing::debug!("Skipping binary file: {:?}", path);
                outcome.skipped.push(SkippedFile {
                    path: relative,
                    reason: SkipReason::Binary,
                });
                continue;
            }

            let content_hash = fingerprint(&bytes);
            let (content, lossy) = match String::from_utf8(bytes) {
                Ok(content) => (content, false),
                Err(err) => (String::from_utf8_lossy(err.as_bytes()).into_owned(), true),
            };

            let language = detect_for_path(path, &content);
            if language.is_none() && self.allowed_extensions.is_empty() {
                tracing::debug!("Skipping file with unknown language: {:?}", path);
                continue;
            }

            let modified_at = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            outcome.files.push(SourceFile {
                path: path.to_path_buf(),
                relative_path: relative,
                extension,
                language,
                content,
                content_hash,
                size: metadata.len(),
                modified_at,
                lossy,
                priority: 0,
            });
        }

        outcome
            .files
            .sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        if self.prioritize {
            priority::prioritize(&self.root, &mut outcome.files);
        }

        tracing::info!(
            "Found {} files to index ({} skipped)",
            outcome.files.len(),
            outcome.skipped.len()
        );
        Ok(outcome)
    }
}

/// Root-relative path with `/` separators
pub(crate) fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Heuristic: more than 30% control bytes in the leading window means binary
pub(crate) fn is_probably_text(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
    if sample.is_empty() {
        return true;
    }
    let non_printable = sample
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t')
        .count();

    (non_printable as f64 / sample.len() as f64) < 0.3
}

fn classify_walk_error(root: &Path, err: &ignore::Error) -> SkippedFile {
    fn inner(err: &ignore::Error, path: Option<&Path>) -> (Option<PathBuf>, SkipReason) {
        match err {
            ignore::Error::WithPath { path, err } => inner(err, Some(path)),
            ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
                inner(err, path)
            }
            ignore::Error::Loop { child, .. } => (Some(child.clone()), SkipReason::SymlinkLoop),
            ignore::Error::Io(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
                (path.map(Path::to_path_buf), SkipReason::PermissionDenied)
            }
            other => (
                path.map(Path::to_path_buf),
                SkipReason::Unreadable {
                    error: other.to_string(),
                },
            ),
        }
    }

    let (path, reason) = inner(err, None);
    SkippedFile {
        path: path
            .map(|p| relative_path(root, &p))
            .unwrap_or_else(|| "<unknown>".to_string()),
        reason,
    }
}

#[cfg(test)]
mod tests;
