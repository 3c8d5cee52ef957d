//! Processing order for scanned files.
//!
//! Files the developer is touching right now (git-modified), entry points and
//! shallow files are processed first, so a superseded pass has already committed
//! the files most likely to be queried.

use super::file_info::SourceFile;
use git2::{Repository, Status, StatusOptions};
use std::collections::HashSet;
use std::path::Path;

const GIT_MODIFIED_BONUS: i64 = 1000;
const ENTRY_POINT_BONUS: i64 = 500;
const DOCS_BONUS: i64 = 300;
const DEPTH_ONE_BONUS: i64 = 200;
const DEPTH_TWO_BONUS: i64 = 100;

const ENTRY_POINT_STEMS: &[&str] = &["main", "app", "index", "init", "__init__", "run", "server"];
const DOC_EXTENSIONS: &[&str] = &["md", "rst", "txt"];

/// Score a root-relative path
pub fn priority_score(relative_path: &str, git_modified: bool) -> i64 {
    let mut score = 0;
    if git_modified {
        score += GIT_MODIFIED_BONUS;
    }

    let path = Path::new(relative_path);
    if path
        .file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|stem| ENTRY_POINT_STEMS.contains(&stem.to_lowercase().as_str()))
    {
        score += ENTRY_POINT_BONUS;
    }

    if path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| DOC_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    {
        score += DOCS_BONUS;
    }

    match relative_path.matches('/').count() {
        0 => score += DEPTH_ONE_BONUS,
        1 => score += DEPTH_TWO_BONUS,
        _ => {}
    }

    score
}

/// Root-relative paths with uncommitted changes; empty outside a git repository
pub fn git_modified_paths(root: &Path) -> HashSet<String> {
    let mut modified = HashSet::new();

    let repo = match Repository::discover(root) {
        Ok(repo) => repo,
        Err(e) => {
            tracing::debug!("No git repository for {:?}: {}", root, e);
            return modified;
        }
    };
    let Some(workdir) = repo.workdir().and_then(|w| w.canonicalize().ok()) else {
        return modified;
    };
    let Ok(root) = root.canonicalize() else {
        return modified;
    };

    let mut options = StatusOptions::new();
    options.include_untracked(true).recurse_untracked_dirs(true);
    let statuses = match repo.statuses(Some(&mut options)) {
        Ok(statuses) => statuses,
        Err(e) => {
            tracing::debug!("Failed to read git status for {:?}: {}", root, e);
            return modified;
        }
    };

    let interesting = Status::WT_MODIFIED
        | Status::WT_NEW
        | Status::WT_RENAMED
        | Status::INDEX_MODIFIED
        | Status::INDEX_NEW
        | Status::INDEX_RENAMED;

    for entry in statuses.iter() {
        if !entry.status().intersects(interesting) {
            continue;
        }
        let Some(path) = entry.path() else { continue };
        if let Ok(relative) = workdir.join(path).strip_prefix(&root) {
            modified.insert(relative.to_string_lossy().replace('\\', "/"));
        }
    }

    modified
}

/// Assign priorities and stably reorder, highest first
pub fn prioritize(root: &Path, files: &mut [SourceFile]) {
    let modified = git_modified_paths(root);
    for file in files.iter_mut() {
        file.priority = priority_score(&file.relative_path, modified.contains(&file.relative_path));
    }
    files.sort_by(|a, b| b.priority.cmp(&a.priority));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_points_rank_above_nested_files() {
        let main = priority_score("main.py", false);
        let nested = priority_score("pkg/sub/helpers.py", false);
        assert_eq!(main, ENTRY_POINT_BONUS + DEPTH_ONE_BONUS);
        assert_eq!(nested, 0);
        assert!(main > nested);
    }

    #[test]
    fn test_git_modified_dominates() {
        let modified = priority_score("pkg/sub/helpers.py", true);
        let main = priority_score("main.py", false);
        assert!(modified > main);
    }

    #[test]
    fn test_docs_and_depth() {
        assert_eq!(priority_score("docs/guide.md", false), DOCS_BONUS + DEPTH_TWO_BONUS);
        assert_eq!(priority_score("src/__init__.py", false), ENTRY_POINT_BONUS + DEPTH_TWO_BONUS);
    }

    #[test]
    fn test_outside_git_repository_is_empty() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        // TempDir may live under a repository on some hosts; only assert no panic there
        let modified = git_modified_paths(temp_dir.path());
        assert!(modified.iter().all(|p| !p.starts_with('/')));
    }
}
