//! Code relationships: symbol definitions, references and the graph between them.
//!
//! ## Architecture
//!
//! - [`extract`] builds a file's symbols from its parse result and finds the
//!   names it uses (imports, inheritance clauses, calls, mentions) as raw references.
//! - [`RelationshipGraph`] stores symbols, raw references and derived edges per
//!   file. Raw references are bound to definitions by qualified name, then by
//!   simple name; ambiguity is settled by the configured [`TieBreak`] order.
//! - Unresolved calls, imports and inheritance clauses become edges to
//!   external names; unresolved plain mentions are dropped.
//!
//! Binding is heuristic: it picks a plausible definition, not the one a
//! compiler would.
//!
//! ## Usage
//!
//! ```ignore
//! use semindex::relations::{RelationshipGraph, ReferenceExtractor, extract::build_symbols};
//!
//! let symbols = build_symbols(&file.relative_path, &parsed, &chunks);
//! let references = extractor.extract(&file.relative_path, &file.content, file.language, &symbols, &chunks);
//! graph.upsert_symbols(&file.relative_path, symbols, references);
//! ```

pub mod extract;
mod graph;
pub mod resolver;
pub mod types;

pub use extract::ReferenceExtractor;
pub use graph::RelationshipGraph;
pub use types::{
    EdgeDelta, EdgeSource, EdgeTarget, GraphStats, RawReference, RelationKind, Relationship, Symbol,
    SymbolId, SymbolKind, TieBreak, Visibility,
};
