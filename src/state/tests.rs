use super::*;
use crate::indexer::fingerprint;
use crate::relations::{EdgeSource, RawReference, RelationKind, Symbol, SymbolId, SymbolKind, Visibility};
use tempfile::TempDir;

fn record(path: &str, name: &str, text: &str, embedded: bool) -> IndexRecord {
    IndexRecord {
        chunk_id: ChunkId::for_symbol(path, name),
        file: path.to_string(),
        fingerprint: fingerprint(text.as_bytes()),
        embedding_id: embedded.then(|| format!("root:{}#{}", path, name)),
        indexed_at: 1_700_000_000,
        start_line: 1,
        end_line: 3,
        start_byte: 0,
        end_byte: text.len(),
        symbol: Some(name.to_string()),
        owner_symbol: None,
        context: format!("{} > {}", path, name),
        metrics: Metrics::default(),
        status: if embedded {
            RecordStatus::Indexed
        } else {
            RecordStatus::Pending
        },
    }
}

fn file_record(path: &str, chunk_ids: Vec<ChunkId>) -> FileRecord {
    FileRecord {
        path: path.to_string(),
        language: Some(Language::Python),
        content_hash: fingerprint(path.as_bytes()),
        fingerprint: fingerprint(b"chunks"),
        chunk_ids,
        chunker: "symbol:120:50".to_string(),
        size: 42,
        modified_at: 1_700_000_000,
        indexed_at: 1_700_000_000,
        metrics: Metrics::default(),
        parse_warning: None,
    }
}

fn symbol(path: &str, name: &str) -> Symbol {
    Symbol {
        id: SymbolId::new(path, name),
        name: name.to_string(),
        qualified_name: name.to_string(),
        kind: SymbolKind::Function,
        visibility: Visibility::Private,
        file_path: path.to_string(),
        chunk_id: ChunkId::for_symbol(path, name),
        line: 1,
        start_line: 1,
        end_line: 3,
        parent: None,
        signature: format!("def {}():", name),
    }
}

/// Root with `lib.py::helper` called from `main.py::main`
fn sample_root() -> RootState {
    let mut root = RootState::default();
    for (path, name) in [("lib.py", "helper"), ("main.py", "main")] {
        let rec = record(path, name, &format!("def {}(): pass", name), true);
        root.files
            .insert(path.to_string(), file_record(path, vec![rec.chunk_id.clone()]));
        root.records.insert(rec.chunk_id.clone(), rec);
    }
    root.graph
        .upsert_symbols("lib.py", vec![symbol("lib.py", "helper")], vec![]);
    root.graph.upsert_symbols(
        "main.py",
        vec![symbol("main.py", "main")],
        vec![RawReference {
            name: "helper".to_string(),
            kind: RelationKind::Calls,
            source: EdgeSource::Symbol(SymbolId::new("main.py", "main")),
            chunk: ChunkId::for_symbol("main.py", "main"),
            line: 2,
        }],
    );
    root
}

#[test]
fn test_record_is_current() {
    let rec = record("a.py", "f", "def f(): pass", true);
    assert!(rec.is_current(&fingerprint(b"def f(): pass")));
    assert!(!rec.is_current(&fingerprint(b"def f(): return 1")));

    let pending = record("a.py", "f", "def f(): pass", false);
    assert!(!pending.is_current(&fingerprint(b"def f(): pass")));
}

#[test]
fn test_remove_file_drops_records_and_edges() {
    let mut root = sample_root();
    // A stray record of lib.py not listed in its file record
    let stray = record("lib.py", "old", "def old(): pass", true);
    root.records.insert(stray.chunk_id.clone(), stray);
    root.needs_rebuild.insert("lib.py".to_string());

    let removed = root.remove_file("lib.py");
    assert_eq!(removed.records.len(), 2);
    assert!(root.records_for_file("lib.py").is_empty());
    assert!(root.records.keys().all(|id| id.file_path() != "lib.py"));
    assert!(root.needs_rebuild.is_empty());
    assert!(root.graph.symbols_in_file("lib.py").is_empty());
    // main.py's call became external, so every edge endpoint is live
    assert!(root.graph.dangling_edges(|c| root.is_live(c)).is_empty());
}

#[test]
fn test_stats() {
    let mut root = sample_root();
    let pending = record("main.py", "later", "def later(): pass", false);
    root.records.insert(pending.chunk_id.clone(), pending);

    let stats = root.stats();
    assert_eq!(stats.files, 2);
    assert_eq!(stats.chunks, 3);
    assert_eq!(stats.pending_chunks, 1);
    assert_eq!(stats.languages.get(Language::Python.name()), Some(&2));
    assert_eq!(stats.relations.symbols, 2);
    assert_eq!(stats.relations.edges, 1);
}

#[test]
fn test_save_and_load_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("state.json");

    let mut state = StateFile::default();
    state.roots.insert("/project".to_string(), sample_root());
    state.root_mut("/project").dirty = true;
    state.save(&path).unwrap();

    // No temporary file is left behind
    let entries: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
    assert_eq!(entries.len(), 1);

    let loaded = StateFile::load(&path, &TieBreak::default_order()).unwrap();
    let root = loaded.root("/project").unwrap();
    assert!(root.dirty);
    assert_eq!(root.records.len(), 2);
    assert_eq!(root.files, state.roots["/project"].files);
    assert_eq!(
        root.graph.callers(&SymbolId::new("lib.py", "helper")).len(),
        1
    );
    // Indexes were rebuilt: name lookups work after load
    assert_eq!(root.graph.definitions("helper").len(), 1);
}

#[test]
fn test_load_missing_file_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    let state = StateFile::load(&temp_dir.path().join("missing.json"), &[]).unwrap();
    assert!(state.roots.is_empty());
    assert_eq!(state.version, STATE_VERSION);
}

#[test]
fn test_load_rejects_other_versions() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.json");
    fs::write(&path, r#"{"version": 99, "roots": {}}"#).unwrap();

    let result = StateFile::load(&path, &[]);
    assert!(matches!(
        result,
        Err(StateError::VersionMismatch { found: 99, expected: STATE_VERSION })
    ));
}

#[test]
fn test_load_rejects_corrupt_fingerprint() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.json");

    let mut state = StateFile::default();
    state.roots.insert("/project".to_string(), sample_root());
    state.save(&path).unwrap();

    let valid = fingerprint(b"def helper(): pass").to_string();
    let corrupted = fs::read_to_string(&path).unwrap().replace(&valid, "not-hex");
    fs::write(&path, corrupted).unwrap();

    assert!(matches!(
        StateFile::load(&path, &[]),
        Err(StateError::LoadFailed { .. })
    ));
}

#[tokio::test]
async fn test_store_save_and_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.json");

    let store = IndexStore::open(&path, &TieBreak::default_order()).unwrap();
    {
        let mut state = store.write().await;
        *state.root_mut("/project") = sample_root();
    }
    store.save().await.unwrap();

    let reopened = IndexStore::open(&path, &TieBreak::default_order()).unwrap();
    let state = reopened.read().await;
    assert_eq!(state.root("/project").unwrap().records.len(), 2);
}

#[tokio::test]
async fn test_in_memory_store_does_not_persist() {
    let store = IndexStore::in_memory();
    store.write().await.root_mut("/project");
    store.save().await.unwrap();
    assert!(store.path().is_none());
    assert!(store.read().await.root("/project").is_some());
}
