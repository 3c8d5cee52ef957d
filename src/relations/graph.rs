//! Relationship graph: symbols, raw references and derived edges, keyed by file.
//!
//! Everything is attributed to the file that produced it, so replacing or
//! removing a file is a single keyed operation. Raw references are kept so
//! that edges can be re-bound when the set of definitions changes.

use super::resolver;
use super::types::{
    EdgeDelta, EdgeSource, EdgeTarget, GraphStats, RawReference, RelationKind, Relationship, Symbol,
    SymbolId, TieBreak,
};
use crate::error::RelationshipConsistencyError;
use crate::indexer::ChunkId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipGraph {
    symbols: BTreeMap<SymbolId, Symbol>,
    file_symbols: BTreeMap<String, Vec<SymbolId>>,
    file_references: BTreeMap<String, Vec<RawReference>>,
    file_edges: BTreeMap<String, Vec<Relationship>>,

    #[serde(skip)]
    by_name: HashMap<String, Vec<SymbolId>>,
    #[serde(skip)]
    by_qualified_name: HashMap<String, Vec<SymbolId>>,
    /// Reference name (full and simple) to the files using it
    #[serde(skip)]
    referencing_files: HashMap<String, BTreeSet<String>>,
    #[serde(skip, default = "TieBreak::default_order")]
    tie_break: Vec<TieBreak>,
}

impl Default for RelationshipGraph {
    fn default() -> Self {
        Self::new(TieBreak::default_order())
    }
}

type EdgeKey = (EdgeSource, EdgeTarget, RelationKind);

fn edge_key(edge: &Relationship) -> EdgeKey {
    (edge.source.clone(), edge.target.clone(), edge.kind)
}

impl RelationshipGraph {
    pub fn new(tie_break: Vec<TieBreak>) -> Self {
        Self {
            symbols: BTreeMap::new(),
            file_symbols: BTreeMap::new(),
            file_references: BTreeMap::new(),
            file_edges: BTreeMap::new(),
            by_name: HashMap::new(),
            by_qualified_name: HashMap::new(),
            referencing_files: HashMap::new(),
            tie_break,
        }
    }

    /// Change the resolution policy. Takes effect on the next re-binding;
    /// call [`resolve_references`](Self::resolve_references) to apply it to all edges.
    pub fn set_tie_break(&mut self, tie_break: Vec<TieBreak>) {
        self.tie_break = tie_break;
    }

    pub fn tie_break(&self) -> &[TieBreak] {
        &self.tie_break
    }

    /// Rebuild lookup indexes after deserialization
    pub fn rebuild_indexes(&mut self) {
        self.by_name.clear();
        self.by_qualified_name.clear();
        self.referencing_files.clear();

        let symbols: Vec<(String, String, SymbolId)> = self
            .symbols
            .values()
            .map(|s| (s.name.clone(), s.qualified_name.clone(), s.id.clone()))
            .collect();
        for (name, qualified_name, id) in symbols {
            self.by_name.entry(name).or_default().push(id.clone());
            self.by_qualified_name.entry(qualified_name).or_default().push(id);
        }

        for (file, references) in &self.file_references {
            for reference in references {
                for key in [reference.name.as_str(), reference.simple_name()] {
                    self.referencing_files
                        .entry(key.to_string())
                        .or_default()
                        .insert(file.clone());
                }
            }
        }
    }

    /// Replace everything attributed to `file` and re-bind every reference whose
    /// name matches an added or removed definition. Unresolved mentions produce
    /// no edge, as in [`resolve_references`](Self::resolve_references).
    pub fn upsert_symbols(
        &mut self,
        file: &str,
        symbols: Vec<Symbol>,
        references: Vec<RawReference>,
    ) -> EdgeDelta {
        self.replace_file(file, Some((symbols, references)))
    }

    /// Delete all symbols, references and edges of `file`. Edges of other files
    /// that pointed at its symbols re-bind elsewhere or become external.
    pub fn remove_file(&mut self, file: &str) -> EdgeDelta {
        self.replace_file(file, None)
    }

    /// Drop the derived edges and raw references of `file`, keeping its symbols
    pub fn retract_edges(&mut self, file: &str) -> usize {
        if let Some(references) = self.file_references.remove(file) {
            self.unindex_references(file, &references);
        }
        self.file_edges.remove(file).map_or(0, |edges| edges.len())
    }

    /// Re-bind every raw reference of every file.
    ///
    /// An unresolved call, import or inheritance becomes an edge to an
    /// [`EdgeTarget::External`] name. An unresolved plain mention
    /// ([`RelationKind::References`]) yields no edge at all; its raw reference
    /// stays stored and binds once a matching definition appears.
    pub fn resolve_references(&mut self) -> EdgeDelta {
        let files: Vec<String> = self.file_references.keys().cloned().collect();
        let mut delta = EdgeDelta::default();
        for file in files {
            delta += self.rederive_file(&file);
        }
        delta
    }

    pub fn clear(&mut self) {
        *self = Self::new(std::mem::take(&mut self.tie_break));
    }

    fn replace_file(&mut self, file: &str, replacement: Option<(Vec<Symbol>, Vec<RawReference>)>) -> EdgeDelta {
        let mut affected: HashSet<String> = HashSet::new();

        if let Some(old_ids) = self.file_symbols.remove(file) {
            for id in old_ids {
                if let Some(symbol) = self.symbols.remove(&id) {
                    self.unindex_symbol(&symbol);
                    affected.insert(symbol.name);
                    affected.insert(symbol.qualified_name);
                }
            }
        }
        if let Some(old_references) = self.file_references.remove(file) {
            self.unindex_references(file, &old_references);
        }

        if let Some((symbols, references)) = replacement {
            let mut ids = Vec::with_capacity(symbols.len());
            for symbol in symbols {
                affected.insert(symbol.name.clone());
                affected.insert(symbol.qualified_name.clone());
                self.by_name
                    .entry(symbol.name.clone())
                    .or_default()
                    .push(symbol.id.clone());
                self.by_qualified_name
                    .entry(symbol.qualified_name.clone())
                    .or_default()
                    .push(symbol.id.clone());
                ids.push(symbol.id.clone());
                self.symbols.insert(symbol.id.clone(), symbol);
            }
            if !ids.is_empty() {
                self.file_symbols.insert(file.to_string(), ids);
            }

            for reference in &references {
                for key in [reference.name.as_str(), reference.simple_name()] {
                    self.referencing_files
                        .entry(key.to_string())
                        .or_default()
                        .insert(file.to_string());
                }
            }
            if !references.is_empty() {
                self.file_references.insert(file.to_string(), references);
            }
        }

        let mut files: BTreeSet<String> = affected
            .iter()
            .filter_map(|name| self.referencing_files.get(name))
            .flatten()
            .cloned()
            .collect();
        files.insert(file.to_string());

        let mut delta = EdgeDelta::default();
        for f in files {
            delta += self.rederive_file(&f);
        }
        delta
    }

    fn unindex_symbol(&mut self, symbol: &Symbol) {
        for (index, key) in [
            (&mut self.by_name, &symbol.name),
            (&mut self.by_qualified_name, &symbol.qualified_name),
        ] {
            if let Some(ids) = index.get_mut(key) {
                ids.retain(|id| id != &symbol.id);
                if ids.is_empty() {
                    index.remove(key);
                }
            }
        }
    }

    fn unindex_references(&mut self, file: &str, references: &[RawReference]) {
        for reference in references {
            for key in [reference.name.as_str(), reference.simple_name()] {
                if let Some(files) = self.referencing_files.get_mut(key) {
                    files.remove(file);
                    if files.is_empty() {
                        self.referencing_files.remove(key);
                    }
                }
            }
        }
    }

    fn rederive_file(&mut self, file: &str) -> EdgeDelta {
        let new_edges = self.derive_edges(file);
        let old_edges = if new_edges.is_empty() {
            self.file_edges.remove(file)
        } else {
            self.file_edges.insert(file.to_string(), new_edges.clone())
        }
        .unwrap_or_default();

        let old_keys: HashSet<EdgeKey> = old_edges.iter().map(edge_key).collect();
        let new_keys: HashSet<EdgeKey> = new_edges.iter().map(edge_key).collect();
        EdgeDelta {
            added: new_keys.difference(&old_keys).count(),
            removed: old_keys.difference(&new_keys).count(),
        }
    }

    fn derive_edges(&self, file: &str) -> Vec<Relationship> {
        let Some(references) = self.file_references.get(file) else {
            return Vec::new();
        };

        let mut seen: HashSet<EdgeKey> = HashSet::new();
        let mut edges = Vec::new();

        for reference in references {
            let target = match self.resolve(file, reference) {
                Some(symbol) => {
                    if reference.kind == RelationKind::References
                        && reference.source == EdgeSource::Symbol(symbol.id.clone())
                    {
                        continue;
                    }
                    EdgeTarget::Symbol(symbol.id.clone())
                }
                None if reference.kind.keeps_external() => EdgeTarget::External(reference.name.clone()),
                None => continue,
            };

            let edge = Relationship {
                source: reference.source.clone(),
                target,
                kind: reference.kind,
                name: reference.name.clone(),
                file: file.to_string(),
                chunk: reference.chunk.clone(),
                line: reference.line,
            };
            if seen.insert(edge_key(&edge)) {
                edges.push(edge);
            }
        }

        edges
    }

    fn resolve(&self, file: &str, reference: &RawReference) -> Option<&Symbol> {
        let lookup = |index: &HashMap<String, Vec<SymbolId>>, key: &str| -> Vec<&Symbol> {
            index
                .get(key)
                .into_iter()
                .flatten()
                .filter_map(|id| self.symbols.get(id))
                .filter(|s| reference.kind.accepts(s.kind))
                .collect()
        };

        let mut candidates = lookup(&self.by_qualified_name, &reference.name);
        if candidates.is_empty() {
            candidates = lookup(&self.by_name, reference.simple_name());
        }
        resolver::pick(&self.tie_break, file, reference.line, candidates)
    }

    // Queries

    pub fn symbol(&self, id: &SymbolId) -> Option<&Symbol> {
        self.symbols.get(id)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub fn symbols_in_file(&self, file: &str) -> Vec<&Symbol> {
        self.file_symbols
            .get(file)
            .into_iter()
            .flatten()
            .filter_map(|id| self.symbols.get(id))
            .collect()
    }

    /// Symbols whose qualified name, or else simple name, equals `name`
    pub fn definitions(&self, name: &str) -> Vec<&Symbol> {
        let index = if self.by_qualified_name.contains_key(name) {
            &self.by_qualified_name
        } else {
            &self.by_name
        };
        let mut found: Vec<&Symbol> = index
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|id| self.symbols.get(id))
            .collect();
        found.sort_by(|a, b| (a.file_path.as_str(), a.line).cmp(&(b.file_path.as_str(), b.line)));
        found
    }

    pub fn edges(&self) -> impl Iterator<Item = &Relationship> {
        self.file_edges.values().flatten()
    }

    pub fn edges_from_file(&self, file: &str) -> &[Relationship] {
        self.file_edges.get(file).map_or(&[], |edges| edges.as_slice())
    }

    pub fn references_to(&self, id: &SymbolId) -> Vec<&Relationship> {
        self.edges()
            .filter(|edge| edge.target.symbol() == Some(id))
            .collect()
    }

    pub fn callers(&self, id: &SymbolId) -> Vec<&Relationship> {
        self.edges()
            .filter(|edge| edge.kind == RelationKind::Calls && edge.target.symbol() == Some(id))
            .collect()
    }

    pub fn callees(&self, id: &SymbolId) -> Vec<&Relationship> {
        let source = EdgeSource::Symbol(id.clone());
        self.edges()
            .filter(|edge| edge.kind == RelationKind::Calls && edge.source == source)
            .collect()
    }

    /// Files with an edge into a symbol of `file` (impact analysis)
    pub fn dependents_of_file(&self, file: &str) -> BTreeSet<String> {
        self.edges()
            .filter(|edge| edge.file != file)
            .filter(|edge| {
                edge.target
                    .symbol()
                    .and_then(|id| self.symbols.get(id))
                    .is_some_and(|s| s.file_path == file)
            })
            .map(|edge| edge.file.clone())
            .collect()
    }

    /// Files with any symbols, references or edges
    pub fn files(&self) -> BTreeSet<&str> {
        self.file_symbols
            .keys()
            .chain(self.file_references.keys())
            .chain(self.file_edges.keys())
            .map(String::as_str)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.file_references.is_empty() && self.file_edges.is_empty()
    }

    pub fn stats(&self) -> GraphStats {
        let edges = self.edges().count();
        let external_edges = self
            .edges()
            .filter(|edge| matches!(edge.target, EdgeTarget::External(_)))
            .count();
        let references: usize = self.file_references.values().map(Vec::len).sum();

        GraphStats {
            files: self.files().len(),
            symbols: self.symbols.len(),
            edges,
            external_edges,
            unresolved_references: references.saturating_sub(edges),
        }
    }

    /// Edges with an endpoint in a chunk that `is_live` rejects, or pointing at
    /// a symbol that no longer exists
    pub fn dangling_edges<F>(&self, is_live: F) -> Vec<RelationshipConsistencyError>
    where
        F: Fn(&ChunkId) -> bool,
    {
        let mut errors = Vec::new();

        for edge in self.edges() {
            let mut endpoints: Vec<Result<&ChunkId, String>> = vec![Ok(&edge.chunk)];
            if let EdgeSource::Symbol(id) = &edge.source {
                endpoints.push(self.symbols.get(id).map(|s| &s.chunk_id).ok_or_else(|| id.to_string()));
            }
            if let EdgeTarget::Symbol(id) = &edge.target {
                endpoints.push(self.symbols.get(id).map(|s| &s.chunk_id).ok_or_else(|| id.to_string()));
            }

            let dangling = endpoints.into_iter().find_map(|endpoint| match endpoint {
                Ok(chunk) if is_live(chunk) => None,
                Ok(chunk) => Some(chunk.to_string()),
                Err(missing_symbol) => Some(format!("<missing symbol {}>", missing_symbol)),
            });

            if let Some(chunk) = dangling {
                errors.push(RelationshipConsistencyError::DanglingEdge {
                    file: edge.file.clone(),
                    edge: edge.to_string(),
                    chunk,
                });
            }
        }

        errors
    }

    /// Symbols attributed to a chunk that `is_live` rejects
    pub fn orphan_symbols<F>(&self, is_live: F) -> Vec<RelationshipConsistencyError>
    where
        F: Fn(&ChunkId) -> bool,
    {
        self.symbols
            .values()
            .filter(|symbol| !is_live(&symbol.chunk_id))
            .map(|symbol| RelationshipConsistencyError::OrphanSymbol {
                file: symbol.file_path.clone(),
                symbol: symbol.id.to_string(),
                chunk: symbol.chunk_id.to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::types::{SymbolKind, Visibility, simple_name};

    fn symbol(path: &str, name: &str, line: usize) -> Symbol {
        Symbol {
            id: SymbolId::new(path, name),
            name: simple_name(name).to_string(),
            qualified_name: name.to_string(),
            kind: SymbolKind::Function,
            visibility: Visibility::Public,
            file_path: path.to_string(),
            chunk_id: ChunkId::for_symbol(path, name),
            line,
            start_line: line,
            end_line: line + 3,
            parent: None,
            signature: String::new(),
        }
    }

    fn call(path: &str, from: &str, name: &str, line: usize) -> RawReference {
        RawReference {
            name: name.to_string(),
            kind: RelationKind::Calls,
            source: EdgeSource::Symbol(SymbolId::new(path, from)),
            chunk: ChunkId::for_symbol(path, from),
            line,
        }
    }

    fn mention(path: &str, from: &str, name: &str, line: usize) -> RawReference {
        RawReference {
            kind: RelationKind::References,
            ..call(path, from, name, line)
        }
    }

    #[test]
    fn test_upsert_binds_calls_across_files() {
        let mut graph = RelationshipGraph::default();
        graph.upsert_symbols("lib.py", vec![symbol("lib.py", "helper", 1)], vec![]);
        let delta = graph.upsert_symbols(
            "main.py",
            vec![symbol("main.py", "main", 1)],
            vec![call("main.py", "main", "helper", 2)],
        );
        assert_eq!(delta, EdgeDelta { added: 1, removed: 0 });

        let helper = SymbolId::new("lib.py", "helper");
        let callers = graph.callers(&helper);
        assert_eq!(callers.len(), 1);
        assert_eq!(callers[0].file, "main.py");
        assert_eq!(graph.callees(&SymbolId::new("main.py", "main")).len(), 1);
        assert_eq!(graph.dependents_of_file("lib.py").into_iter().collect::<Vec<_>>(), vec!["main.py"]);
    }

    #[test]
    fn test_unresolved_calls_are_external_and_mentions_dropped() {
        let mut graph = RelationshipGraph::default();
        graph.upsert_symbols(
            "main.py",
            vec![symbol("main.py", "main", 1)],
            vec![
                call("main.py", "main", "requests.get", 2),
                mention("main.py", "main", "unknown_thing", 3),
            ],
        );
        let edges: Vec<_> = graph.edges().collect();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target, EdgeTarget::External("requests.get".to_string()));
        assert_eq!(graph.stats().external_edges, 1);
    }

    #[test]
    fn test_definition_added_later_rebinds_external_edge() {
        let mut graph = RelationshipGraph::default();
        graph.upsert_symbols(
            "main.py",
            vec![symbol("main.py", "main", 1)],
            vec![call("main.py", "main", "helper", 2)],
        );
        assert!(matches!(graph.edges().next().unwrap().target, EdgeTarget::External(_)));

        let delta = graph.upsert_symbols("lib.py", vec![symbol("lib.py", "helper", 1)], vec![]);
        assert_eq!(delta, EdgeDelta { added: 1, removed: 1 });
        assert_eq!(
            graph.edges().next().unwrap().target,
            EdgeTarget::Symbol(SymbolId::new("lib.py", "helper"))
        );
    }

    #[test]
    fn test_unresolved_mention_binds_once_defined() {
        let mut graph = RelationshipGraph::default();
        graph.upsert_symbols(
            "main.py",
            vec![symbol("main.py", "main", 1)],
            vec![mention("main.py", "main", "Config", 2)],
        );
        assert_eq!(graph.edges().count(), 0);
        assert_eq!(graph.stats().external_edges, 0);
        assert_eq!(graph.stats().unresolved_references, 1);
        assert_eq!(graph.resolve_references(), EdgeDelta::default());

        let delta = graph.upsert_symbols("config.py", vec![symbol("config.py", "Config", 1)], vec![]);
        assert_eq!(delta, EdgeDelta { added: 1, removed: 0 });
        let config = SymbolId::new("config.py", "Config");
        assert_eq!(graph.references_to(&config).len(), 1);
        assert_eq!(graph.stats().unresolved_references, 0);

        graph.remove_file("config.py");
        assert_eq!(graph.edges().count(), 0);
        assert_eq!(graph.stats().unresolved_references, 1);
    }

    #[test]
    fn test_remove_file_rebinds_incoming_edges() {
        let mut graph = RelationshipGraph::default();
        graph.upsert_symbols("lib.py", vec![symbol("lib.py", "helper", 1)], vec![]);
        graph.upsert_symbols(
            "main.py",
            vec![symbol("main.py", "main", 1)],
            vec![
                call("main.py", "main", "helper", 2),
                mention("main.py", "main", "helper", 5),
            ],
        );
        assert_eq!(graph.references_to(&SymbolId::new("lib.py", "helper")).len(), 2);

        graph.remove_file("lib.py");
        assert!(graph.symbols_in_file("lib.py").is_empty());
        assert!(!graph.files().contains("lib.py"));
        let edges: Vec<_> = graph.edges().collect();
        // The call survives as external, the mention is dropped
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target, EdgeTarget::External("helper".to_string()));
        assert!(graph.dangling_edges(|_| true).is_empty());
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut graph = RelationshipGraph::default();
        let symbols = vec![symbol("a.py", "f", 1), symbol("a.py", "g", 6)];
        let references = vec![call("a.py", "g", "f", 7)];
        graph.upsert_symbols("a.py", symbols.clone(), references.clone());
        let delta = graph.upsert_symbols("a.py", symbols, references);
        assert!(delta.is_empty());
        assert_eq!(graph.stats().edges, 1);
    }

    #[test]
    fn test_self_mentions_are_not_edges() {
        let mut graph = RelationshipGraph::default();
        graph.upsert_symbols("a.py", vec![symbol("a.py", "f", 1)], vec![mention("a.py", "f", "f", 2)]);
        assert_eq!(graph.stats().edges, 0);
    }

    #[test]
    fn test_dangling_edges_and_orphans() {
        let mut graph = RelationshipGraph::default();
        graph.upsert_symbols("lib.py", vec![symbol("lib.py", "helper", 1)], vec![]);
        graph.upsert_symbols(
            "main.py",
            vec![symbol("main.py", "main", 1)],
            vec![call("main.py", "main", "helper", 2)],
        );

        let dead = ChunkId::for_symbol("lib.py", "helper");
        let errors = graph.dangling_edges(|chunk| chunk != &dead);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].file(), "main.py");

        let orphans = graph.orphan_symbols(|chunk| chunk != &dead);
        assert_eq!(orphans.len(), 1);

        assert_eq!(graph.retract_edges("main.py"), 1);
        assert!(graph.dangling_edges(|chunk| chunk != &dead).is_empty());
    }

    #[test]
    fn test_serde_roundtrip_rebuilds_indexes() {
        let mut graph = RelationshipGraph::default();
        graph.upsert_symbols("lib.py", vec![symbol("lib.py", "helper", 1)], vec![]);
        graph.upsert_symbols(
            "main.py",
            vec![symbol("main.py", "main", 1)],
            vec![call("main.py", "main", "helper", 2)],
        );

        let json = serde_json::to_string(&graph).unwrap();
        let mut restored: RelationshipGraph = serde_json::from_str(&json).unwrap();
        restored.rebuild_indexes();

        assert_eq!(restored.definitions("helper").len(), 1);
        assert!(restored.resolve_references().is_empty());
        // Removing the definition after reload still re-binds the caller
        let delta = restored.remove_file("lib.py");
        assert_eq!(delta, EdgeDelta { added: 1, removed: 1 });
    }

    #[test]
    fn test_definitions_by_qualified_or_simple_name() {
        let mut graph = RelationshipGraph::default();
        graph.upsert_symbols(
            "a.py",
            vec![symbol("a.py", "Server", 1), symbol("a.py", "Server.handle", 2)],
            vec![],
        );
        assert_eq!(graph.definitions("Server.handle").len(), 1);
        assert_eq!(graph.definitions("handle").len(), 1);
        assert!(graph.definitions("missing").is_empty());
    }
}
