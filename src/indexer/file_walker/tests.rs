//! Tests for FileWalker

use super::*;
use crate::indexer::language::Language;
use std::fs;
use tempfile::TempDir;

fn paths(outcome: &ScanOutcome) -> Vec<&str> {
    outcome
        .files
        .iter()
        .map(|f| f.relative_path.as_str())
        .collect()
}

#[test]
fn test_new() {
    let walker = FileWalker::new("/tmp", 1024);
    assert_eq!(walker.root, PathBuf::from("/tmp"));
    assert_eq!(walker.max_file_size, 1024);
    assert!(walker.allowed_extensions.is_empty());
    assert!(!walker.include_dotfiles);
    assert!(!walker.follow_symlinks);
}

#[test]
fn test_with_allowed_extensions_normalizes() {
    let walker =
        FileWalker::new("/tmp", 1024).with_allowed_extensions(vec![".RS".into(), "py".into()]);
    assert_eq!(walker.allowed_extensions, vec!["rs", "py"]);
}

#[test]
fn test_walk_nonexistent_directory() {
    let walker = FileWalker::new("/nonexistent/path/12345", 1024);
    let result = walker.walk();
    assert!(matches!(result, Err(ScanError::RootNotFound(_))));
}

#[test]
fn test_walk_not_a_directory() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("notadir.txt");
    fs::write(&file_path, "test").unwrap();

    let walker = FileWalker::new(&file_path, 1024);
    let result = walker.walk();
    assert!(matches!(result, Err(ScanError::NotADirectory(_))));
}

#[test]
fn test_walk_empty_directory() {
    let temp_dir = TempDir::new().unwrap();
    let walker = FileWalker::new(temp_dir.path(), 1024);
    let outcome = walker.walk().unwrap();
    assert!(outcome.files.is_empty());
    assert!(outcome.skipped.is_empty());
}

#[test]
fn test_walk_nested_directories_sorted() {
    let temp_dir = TempDir::new().unwrap();
    let subdir = temp_dir.path().join("subdir");
    fs::create_dir(&subdir).unwrap();
    fs::write(temp_dir.path().join("root.py"), "x = 1\n").unwrap();
    fs::write(subdir.join("nested.rs"), "fn a() {}\n").unwrap();
    fs::write(temp_dir.path().join("a.txt"), "notes\n").unwrap();

    let walker = FileWalker::new(temp_dir.path(), 1024);
    let outcome = walker.walk().unwrap();
    assert_eq!(paths(&outcome), vec!["a.txt", "root.py", "subdir/nested.rs"]);
}

#[test]
fn test_walk_records_too_large() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("small.txt"), "small").unwrap();
    fs::write(temp_dir.path().join("large.txt"), "a".repeat(2000)).unwrap();

    let walker = FileWalker::new(temp_dir.path(), 100);
    let outcome = walker.walk().unwrap();
    assert_eq!(paths(&outcome), vec!["small.txt"]);
    assert_eq!(
        outcome.skipped,
        vec![SkippedFile {
            path: "large.txt".to_string(),
            reason: SkipReason::TooLarge {
                size: 2000,
                max: 100
            },
        }]
    );
}

#[test]
fn test_walk_with_include_and_exclude_globs() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join("src/generated")).unwrap();
    fs::write(temp_dir.path().join("src/lib.rs"), "fn a() {}").unwrap();
    fs::write(temp_dir.path().join("src/generated/api.rs"), "fn b() {}").unwrap();
    fs::write(temp_dir.path().join("notes.txt"), "text").unwrap();

    let filter = PathFilter::new(&["**/*.rs".to_string()], &["generated".to_string()]).unwrap();
    let walker = FileWalker::new(temp_dir.path(), 1024).with_filter(filter);
    let outcome = walker.walk().unwrap();
    assert_eq!(paths(&outcome), vec!["src/lib.rs"]);
}

#[test]
fn test_walk_allowed_extensions() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("a.py"), "x = 1").unwrap();
    fs::write(temp_dir.path().join("b.rs"), "fn b() {}").unwrap();
    fs::write(temp_dir.path().join("c.custom"), "anything").unwrap();

    let walker = FileWalker::new(temp_dir.path(), 1024)
        .with_allowed_extensions(vec!["py".into(), "custom".into()]);
    let outcome = walker.walk().unwrap();
    assert_eq!(paths(&outcome), vec!["a.py", "c.custom"]);
    assert_eq!(outcome.files[1].language, None);
}

#[test]
fn test_walk_source_file_fields() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("test.rs");
    fs::write(&file_path, "fn main() {}").unwrap();

    let walker = FileWalker::new(temp_dir.path(), 1024);
    let outcome = walker.walk().unwrap();
    assert_eq!(outcome.files.len(), 1);

    let file = &outcome.files[0];
    assert_eq!(file.path, file_path);
    assert_eq!(file.relative_path, "test.rs");
    assert_eq!(file.extension, Some("rs".to_string()));
    assert_eq!(file.language, Some(Language::Rust));
    assert_eq!(file.content, "fn main() {}");
    assert_eq!(file.content_hash, fingerprint(b"fn main() {}"));
    assert_eq!(file.size, 12);
    assert!(file.modified_at > 0);
    assert!(!file.lossy);
}

#[test]
fn test_is_probably_text() {
    assert!(is_probably_text(b"Hello world\nThis is text"));
    assert!(is_probably_text(b"Line 1\nLine 2\r\nTabbed\ttext"));
    assert!(is_probably_text(b""));

    let binary: Vec<u8> = (0..100).map(|i| if i % 2 == 0 { 0x00 } else { b'A' }).collect();
    assert!(!is_probably_text(&binary));

    // Exactly 30% control bytes counts as binary
    let mut threshold = vec![b'A'; 70];
    threshold.extend(vec![0x00; 30]);
    assert!(!is_probably_text(&threshold));
}

#[test]
fn test_walk_records_binary_files() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("text.txt"), "text content").unwrap();
    fs::write(temp_dir.path().join("binary.txt"), vec![0x00; 100]).unwrap();

    let walker = FileWalker::new(temp_dir.path(), 1024);
    let outcome = walker.walk().unwrap();
    assert_eq!(paths(&outcome), vec!["text.txt"]);
    assert_eq!(outcome.skipped[0].reason, SkipReason::Binary);
}

#[test]
fn test_walk_decodes_invalid_utf8_lossily() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("valid.txt"), "valid UTF-8").unwrap();
    fs::write(temp_dir.path().join("invalid.txt"), [b'a', 0xFF, 0xFE, b'b']).unwrap();

    let walker = FileWalker::new(temp_dir.path(), 1024);
    let outcome = walker.walk().unwrap();
    assert_eq!(outcome.files.len(), 2);

    let invalid = outcome
        .files
        .iter()
        .find(|f| f.relative_path == "invalid.txt")
        .unwrap();
    assert!(invalid.lossy);
    assert!(invalid.content.starts_with('a'));
    assert!(invalid.content.ends_with('b'));
}

#[test]
fn test_walk_respects_gitignore() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join(".gitignore"), "ignored.txt\n").unwrap();
    fs::write(temp_dir.path().join("included.txt"), "include").unwrap();
    fs::write(temp_dir.path().join("ignored.txt"), "ignore").unwrap();

    let walker = FileWalker::new(temp_dir.path(), 1024);
    let outcome = walker.walk().unwrap();
    let found = paths(&outcome);
    assert!(found.contains(&"included.txt"));
    assert!(!found.contains(&"ignored.txt"));
    // Allow-listed dotfile
    assert!(found.contains(&".gitignore"));
}

#[test]
fn test_walk_nested_ignore_files_are_directory_scoped() {
    let temp_dir = TempDir::new().unwrap();
    let pkg = temp_dir.path().join("pkg");
    fs::create_dir(&pkg).unwrap();
    fs::write(pkg.join(CUSTOM_IGNORE_FILE), "*.log.txt\n").unwrap();
    fs::write(pkg.join("debug.log.txt"), "noise").unwrap();
    fs::write(pkg.join("keep.txt"), "keep").unwrap();
    fs::write(temp_dir.path().join("top.log.txt"), "kept, outside pkg").unwrap();

    let walker = FileWalker::new(temp_dir.path(), 1024);
    let outcome = walker.walk().unwrap();
    assert_eq!(paths(&outcome), vec!["pkg/keep.txt", "top.log.txt"]);
}

#[test]
fn test_walk_dotfile_policy() {
    let temp_dir = TempDir::new().unwrap();
    let hidden_dir = temp_dir.path().join(".hidden");
    fs::create_dir(&hidden_dir).unwrap();
    fs::write(hidden_dir.join("secret.py"), "x = 1").unwrap();
    fs::write(temp_dir.path().join(".env"), "KEY=1").unwrap();
    fs::write(temp_dir.path().join(".bashrc"), "alias x=y").unwrap();
    fs::write(temp_dir.path().join("main.py"), "x = 1").unwrap();

    let outcome = FileWalker::new(temp_dir.path(), 1024).walk().unwrap();
    assert_eq!(paths(&outcome), vec![".env", "main.py"]);

    let outcome = FileWalker::new(temp_dir.path(), 1024)
        .with_dotfiles(true)
        .with_allowed_extensions(vec![])
        .walk()
        .unwrap();
    assert!(paths(&outcome).contains(&".hidden/secret.py"));
}

#[cfg(unix)]
#[test]
fn test_walk_survives_symlink_cycle() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("dir");
    fs::create_dir(&dir).unwrap();
    fs::write(dir.join("a.py"), "x = 1").unwrap();
    std::os::unix::fs::symlink(temp_dir.path(), dir.join("loop")).unwrap();
    std::os::unix::fs::symlink(dir.join("a.py"), temp_dir.path().join("alias.py")).unwrap();

    let outcome = FileWalker::new(temp_dir.path(), 1024)
        .with_follow_symlinks(true)
        .walk()
        .unwrap();

    // The real file and its alias resolve to one canonical file
    let indexed: Vec<_> = paths(&outcome);
    assert_eq!(indexed.len(), 1, "indexed: {:?}", indexed);
    assert!(
        outcome
            .skipped
            .iter()
            .any(|s| s.reason == SkipReason::SymlinkLoop)
    );
}

#[cfg(unix)]
#[test]
fn test_walk_ignores_symlinks_by_default() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("a.py"), "x = 1").unwrap();
    std::os::unix::fs::symlink(temp_dir.path().join("a.py"), temp_dir.path().join("b.py"))
        .unwrap();

    let outcome = FileWalker::new(temp_dir.path(), 1024).walk().unwrap();
    assert_eq!(paths(&outcome), vec!["a.py"]);
}

#[test]
fn test_walk_cancelled() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("a.py"), "x = 1").unwrap();

    let flag = Arc::new(AtomicBool::new(true));
    let walker = FileWalker::new(temp_dir.path(), 1024).with_cancellation_flag(flag);
    assert!(matches!(walker.walk(), Err(ScanError::Cancelled)));
}

#[test]
fn test_from_config_merges_request_patterns() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir(temp_dir.path().join("target")).unwrap();
    fs::write(temp_dir.path().join("target/out.rs"), "fn a() {}").unwrap();
    fs::write(temp_dir.path().join("lib.rs"), "fn b() {}").unwrap();
    fs::write(temp_dir.path().join("skip.rs"), "fn c() {}").unwrap();

    let config = IndexingConfig::default();
    let walker =
        FileWalker::from_config(temp_dir.path(), &config, &[], &["skip.rs".to_string()]).unwrap();
    let outcome = walker.walk().unwrap();
    assert_eq!(paths(&outcome), vec!["lib.rs"]);
}

#[test]
fn test_relative_path_uses_forward_slashes() {
    let root = Path::new("/project");
    assert_eq!(
        relative_path(root, Path::new("/project/src/a/b.rs")),
        "src/a/b.rs"
    );
}
