//! Source file produced by the scanner

use super::fingerprint::Fingerprint;
use super::language::Language;
use std::path::PathBuf;

/// A discovered file, read and decoded. Replaced wholesale on every scan.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Root-relative path with `/` separators; the key for all index state
    pub relative_path: String,
    pub extension: Option<String>,
    pub language: Option<Language>,
    pub content: String,
    /// Hash of the raw bytes, used to skip re-parsing unchanged files
    pub content_hash: Fingerprint,
    pub size: u64,
    /// Last modification time, unix seconds
    pub modified_at: i64,
    /// Bytes were not valid UTF-8 and were decoded lossily
    pub lossy: bool,
    /// Processing priority, higher first
    pub priority: i64,
}
