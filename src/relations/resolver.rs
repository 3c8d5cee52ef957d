//! Choosing one definition when a name matches several symbols.

use super::types::{Symbol, TieBreak};
use std::path::Path;

/// Pick the definition a reference in `from_file` at `line` binds to.
///
/// Candidates are considered in (path, line) order so the choice is stable
/// across passes. Each policy step narrows the candidates; `SameFile` decides
/// immediately by nearest line when it applies.
pub fn pick<'a>(
    policy: &[TieBreak],
    from_file: &str,
    line: usize,
    mut candidates: Vec<&'a Symbol>,
) -> Option<&'a Symbol> {
    candidates.sort_by(|a, b| {
        (a.file_path.as_str(), a.line, a.id.as_str()).cmp(&(b.file_path.as_str(), b.line, b.id.as_str()))
    });

    for step in policy {
        if candidates.len() <= 1 {
            break;
        }
        match step {
            TieBreak::SameFile => {
                let nearest = candidates
                    .iter()
                    .filter(|s| s.file_path == from_file)
                    .min_by_key(|s| (s.line.abs_diff(line), s.line))
                    .copied();
                if nearest.is_some() {
                    return nearest;
                }
            }
            TieBreak::SameDirectory => {
                let directory = parent_dir(from_file);
                let same: Vec<&Symbol> = candidates
                    .iter()
                    .filter(|s| parent_dir(&s.file_path) == directory)
                    .copied()
                    .collect();
                if !same.is_empty() {
                    candidates = same;
                }
            }
            TieBreak::FirstSeen => return candidates.first().copied(),
        }
    }

    candidates.first().copied()
}

fn parent_dir(path: &str) -> &Path {
    Path::new(path).parent().unwrap_or_else(|| Path::new(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::ChunkId;
    use crate::relations::types::{SymbolId, SymbolKind, Visibility};

    fn symbol(path: &str, name: &str, line: usize) -> Symbol {
        Symbol {
            id: SymbolId::new(path, name),
            name: name.to_string(),
            qualified_name: name.to_string(),
            kind: SymbolKind::Function,
            visibility: Visibility::Public,
            file_path: path.to_string(),
            chunk_id: ChunkId::for_symbol(path, name),
            line,
            start_line: line,
            end_line: line + 2,
            parent: None,
            signature: format!("def {}():", name),
        }
    }

    #[test]
    fn test_same_file_prefers_nearest_line() {
        let far = symbol("a.py", "f", 1);
        let near = symbol("a.py", "f~2", 40);
        let other = symbol("b.py", "f", 1);
        let picked = pick(&TieBreak::default_order(), "a.py", 35, vec![&other, &far, &near]);
        assert_eq!(picked.unwrap().id, near.id);
    }

    #[test]
    fn test_same_directory_before_first_seen() {
        let root = symbol("util.py", "f", 1);
        let sibling = symbol("pkg/util.py", "f", 10);
        let picked = pick(&TieBreak::default_order(), "pkg/main.py", 3, vec![&root, &sibling]);
        assert_eq!(picked.unwrap().id, sibling.id);
    }

    #[test]
    fn test_first_seen_is_path_then_line_order() {
        let b = symbol("b/x.py", "f", 1);
        let a = symbol("a/x.py", "f", 5);
        let picked = pick(&[TieBreak::FirstSeen], "c/main.py", 1, vec![&b, &a]);
        assert_eq!(picked.unwrap().id, a.id);
    }

    #[test]
    fn test_policy_order_is_respected() {
        let same_file = symbol("pkg/main.py", "f", 50);
        let same_dir = symbol("pkg/util.py", "f", 1);
        let picked = pick(&[TieBreak::SameDirectory, TieBreak::FirstSeen], "pkg/main.py", 1, vec![&same_file, &same_dir]);
        // Both are in pkg/; first seen by path wins
        assert_eq!(picked.unwrap().id, same_file.id);
    }

    #[test]
    fn test_empty_and_single() {
        assert!(pick(&TieBreak::default_order(), "a.py", 1, vec![]).is_none());
        let only = symbol("z.py", "f", 1);
        assert_eq!(pick(&[], "a.py", 1, vec![&only]).unwrap().id, only.id);
    }
}
