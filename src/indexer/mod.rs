//! File discovery, parsing, chunking and fingerprinting
//!
//! Provides functionality to walk a project root, detect languages, parse
//! symbols, and split files into fingerprinted chunks that cover each file
//! exactly.

pub mod ast_parser;
pub mod chunker;
mod file_info;
pub mod file_walker;
pub mod fingerprint;
pub mod language;
pub mod metrics;
pub mod priority;

pub use ast_parser::{ParseBackend, ParseResult, ParsedSymbol, ParserRegistry, TreeSitterBackend};
pub use chunker::{ChunkStrategy, CodeChunker};
pub use file_info::SourceFile;
pub use file_walker::{FileWalker, ScanOutcome, SkipReason, SkippedFile};
pub use fingerprint::{Fingerprint, file_fingerprint, fingerprint};
pub use language::Language;
pub use metrics::Metrics;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a chunk within a project root.
///
/// - `{path}#{qualified_name}` for a symbol-aligned chunk
/// - `{path}#{qualified_name}@{part}` for a window of an oversized symbol
/// - `{path}#L{ordinal}` for gap and window chunks
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    pub fn for_symbol(path: &str, unique_name: &str) -> Self {
        Self(format!("{}#{}", path, unique_name))
    }

    pub fn for_part(path: &str, unique_name: &str, part: usize) -> Self {
        Self(format!("{}#{}@{}", path, unique_name, part))
    }

    pub fn for_lines(path: &str, ordinal: usize) -> Self {
        Self(format!("{}#L{}", path, ordinal))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The root-relative file path the chunk belongs to
    pub fn file_path(&self) -> &str {
        self.0.rsplit_once('#').map_or(self.0.as_str(), |(path, _)| path)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChunkId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A contiguous region of one file, the unit of change detection and embedding
#[derive(Debug, Clone)]
pub struct CodeChunk {
    pub id: ChunkId,
    /// Root-relative path of the owning file
    pub file_path: String,
    pub language: Option<Language>,
    /// Exact source text; a file's chunk contents concatenate to the file
    pub content: String,
    pub fingerprint: Fingerprint,
    pub start_byte: usize,
    pub end_byte: usize,
    /// 1-based, inclusive
    pub start_line: usize,
    pub end_line: usize,
    /// Qualified name of the symbol this chunk is aligned to
    pub symbol: Option<String>,
    /// Symbol split across several window chunks
    pub owner_symbol: Option<String>,
    pub part: Option<usize>,
    /// Breadcrumb such as `src/app.py > Server.handle`
    pub context: String,
}
