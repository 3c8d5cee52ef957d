//! Type definitions for code relationships.
//!
//! - `SymbolId`: unique identifier of a symbol within a project root
//! - `Symbol`: a definition (function, class, method, ...) and the chunk defining it
//! - `RawReference`: a name used in a file, before resolution
//! - `Relationship`: a resolved (or external) edge derived from a raw reference

use crate::indexer::ChunkId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of symbol in the codebase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    /// A function (standalone)
    Function,
    /// A method (belongs to a class/struct/impl)
    Method,
    /// A class definition
    Class,
    /// A struct definition
    Struct,
    /// An interface definition
    Interface,
    /// A trait definition (Rust)
    Trait,
    /// An enum definition
    Enum,
    /// A module/namespace
    Module,
    /// A variable/binding
    Variable,
    /// A constant
    Constant,
    /// A type alias
    TypeAlias,
}

impl SymbolKind {
    /// Get a human-readable display name for this kind
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Struct => "struct",
            Self::Interface => "interface",
            Self::Trait => "trait",
            Self::Enum => "enum",
            Self::Module => "module",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::TypeAlias => "type alias",
        }
    }

    /// Can be the target of an inheritance clause
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            Self::Class | Self::Struct | Self::Interface | Self::Trait | Self::Enum | Self::TypeAlias
        )
    }

    /// Can be the target of a call (constructors included)
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Self::Function | Self::Method | Self::Class | Self::Struct | Self::Enum
        )
    }
}

/// Visibility/access modifier for a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Public - accessible from anywhere
    Public,
    /// Private - accessible only within the same scope
    #[default]
    Private,
    /// Protected - accessible within class hierarchy
    Protected,
    /// Internal/package-private
    Internal,
}

/// Unique identifier of a symbol: `{path}::{qualified_name}`, with the same
/// `~n` suffix as the chunk id for duplicate names in one file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(String);

impl SymbolId {
    pub fn new(file_path: &str, unique_name: &str) -> Self {
        Self(format!("{}::{}", file_path, unique_name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_path(&self) -> &str {
        self.0.split_once("::").map_or(self.0.as_str(), |(path, _)| path)
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SymbolId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A definition of a symbol in the codebase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    /// Scope-qualified name, e.g. `Server.handle`
    pub qualified_name: String,
    pub kind: SymbolKind,
    #[serde(default)]
    pub visibility: Visibility,
    /// Relative file path from the project root
    pub file_path: String,
    /// Chunk containing the start of the definition
    pub chunk_id: ChunkId,
    /// Line of the declaration itself (after doc comments and attributes)
    pub line: usize,
    pub start_line: usize,
    pub end_line: usize,
    /// Enclosing symbol (e.g. containing class for a method)
    pub parent: Option<SymbolId>,
    pub signature: String,
}

/// Kind of relationship between two code entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Function or method call
    Calls,
    /// Import statement
    Imports,
    /// Class inheritance (extends/implements/impl for)
    Inherits,
    /// Any other mention of a known symbol
    References,
}

impl RelationKind {
    /// Unresolved references of this kind are kept as edges to external names.
    /// Plain mentions are not; see [`RelationshipGraph::resolve_references`].
    ///
    /// [`RelationshipGraph::resolve_references`]: super::RelationshipGraph::resolve_references
    pub fn keeps_external(&self) -> bool {
        !matches!(self, Self::References)
    }

    /// Whether a symbol of the given kind can be the target
    pub fn accepts(&self, kind: SymbolKind) -> bool {
        match self {
            Self::Calls => kind.is_callable(),
            Self::Inherits => kind.is_type(),
            Self::Imports | Self::References => true,
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Calls => "calls",
            Self::Imports => "imports",
            Self::Inherits => "inherits",
            Self::References => "references",
        };
        f.write_str(name)
    }
}

/// Where an edge starts: a symbol, or file-level code outside any symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum EdgeSource {
    Symbol(SymbolId),
    File(String),
}

/// Where an edge points: a known symbol, or a name defined outside the project
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum EdgeTarget {
    Symbol(SymbolId),
    External(String),
}

impl EdgeTarget {
    pub fn symbol(&self) -> Option<&SymbolId> {
        match self {
            Self::Symbol(id) => Some(id),
            Self::External(_) => None,
        }
    }
}

/// A name used in a file, attributed to the enclosing symbol and chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReference {
    /// As written; dotted for qualified imports (`pkg.module.Name`)
    pub name: String,
    pub kind: RelationKind,
    pub source: EdgeSource,
    pub chunk: ChunkId,
    pub line: usize,
}

impl RawReference {
    /// Last segment of the name
    pub fn simple_name(&self) -> &str {
        simple_name(&self.name)
    }
}

pub(crate) fn simple_name(name: &str) -> &str {
    name.rsplit(['.', ':', '\\', '/'])
        .find(|s| !s.is_empty())
        .unwrap_or(name)
}

/// A directed edge derived from a raw reference. Retracted together with the
/// file and chunk that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: EdgeSource,
    pub target: EdgeTarget,
    pub kind: RelationKind,
    pub name: String,
    /// File that produced the edge
    pub file: String,
    /// Chunk that produced the edge
    pub chunk: ChunkId,
    pub line: usize,
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            EdgeSource::Symbol(id) => id.as_str(),
            EdgeSource::File(path) => path.as_str(),
        };
        let target = match &self.target {
            EdgeTarget::Symbol(id) => id.as_str().to_string(),
            EdgeTarget::External(name) => format!("external:{}", name),
        };
        write!(f, "{} -{}-> {}", source, self.kind, target)
    }
}

/// Ordered policy for choosing among several symbols matching one name.
///
/// This is a heuristic: it picks a plausible definition, not the one a
/// compiler would bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Prefer definitions in the referencing file, nearest line first
    SameFile,
    /// Prefer definitions in the referencing file's directory
    SameDirectory,
    /// Prefer the first definition in (path, line) order
    FirstSeen,
}

impl TieBreak {
    pub fn default_order() -> Vec<TieBreak> {
        vec![Self::SameFile, Self::SameDirectory, Self::FirstSeen]
    }
}

/// Edge counts changed by a graph update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDelta {
    pub added: usize,
    pub removed: usize,
}

impl EdgeDelta {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

impl std::ops::AddAssign for EdgeDelta {
    fn add_assign(&mut self, other: Self) {
        self.added += other.added;
        self.removed += other.removed;
    }
}

/// Graph size summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub files: usize,
    pub symbols: usize,
    pub edges: usize,
    pub external_edges: usize,
    pub unresolved_references: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_kind_display_name() {
        assert_eq!(SymbolKind::Function.display_name(), "function");
        assert_eq!(SymbolKind::TypeAlias.display_name(), "type alias");
        assert_eq!(SymbolKind::Module.display_name(), "module");
    }

    #[test]
    fn test_symbol_id_format() {
        let id = SymbolId::new("src/app.py", "Server.handle");
        assert_eq!(id.as_str(), "src/app.py::Server.handle");
        assert_eq!(id.file_path(), "src/app.py");
    }

    #[test]
    fn test_relation_kind_acceptance() {
        assert!(RelationKind::Calls.accepts(SymbolKind::Function));
        assert!(RelationKind::Calls.accepts(SymbolKind::Class));
        assert!(!RelationKind::Calls.accepts(SymbolKind::Module));
        assert!(RelationKind::Inherits.accepts(SymbolKind::Trait));
        assert!(!RelationKind::Inherits.accepts(SymbolKind::Function));
        assert!(!RelationKind::References.keeps_external());
    }

    #[test]
    fn test_simple_name() {
        assert_eq!(simple_name("os.path"), "path");
        assert_eq!(simple_name("crate::a::B"), "B");
        assert_eq!(simple_name("App\\Models\\User"), "User");
        assert_eq!(simple_name("plain"), "plain");
    }

    #[test]
    fn test_edge_serialization() {
        let target = EdgeTarget::External("requests".to_string());
        let json = serde_json::to_string(&target).unwrap();
        assert_eq!(json, r#"{"type":"external","id":"requests"}"#);

        let kind = RelationKind::Inherits;
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"inherits\"");
    }

    #[test]
    fn test_tie_break_serialization() {
        let order: Vec<TieBreak> = serde_json::from_str(r#"["same_directory","first_seen"]"#).unwrap();
        assert_eq!(order, vec![TieBreak::SameDirectory, TieBreak::FirstSeen]);
    }
}
