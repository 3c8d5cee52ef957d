//! Filesystem-based locking for cross-process coordination
//!
//! Two processes sharing one state file must not run passes over the same
//! root at once. The synchronizer's in-process mutex covers tasks within one
//! process; this flock() covers the rest. The OS releases the lock if the
//! holder crashes.

use anyhow::{Context, Result};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Lock file for a canonical root inside `lock_dir`
fn lock_file_path(lock_dir: &Path, root: &str) -> PathBuf {
    let hash = format!("{:x}", Sha256::digest(root.as_bytes()));
    lock_dir.join(format!("{}.lock", &hash[..16]))
}

/// Holds an exclusive lock on one root until dropped
#[derive(Debug)]
pub struct FsLockGuard {
    _file: File,
    path: PathBuf,
}

impl FsLockGuard {
    /// Try to take the lock without blocking.
    ///
    /// `Ok(None)` means another holder has it.
    pub fn try_acquire(lock_dir: &Path, root: &str) -> Result<Option<Self>> {
        let lock_path = lock_file_path(lock_dir, root);
        fs::create_dir_all(lock_dir).context("Failed to create lock directory")?;
        let file = File::create(&lock_path).context("Failed to create lock file")?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!("Acquired filesystem lock for {} ({:?})", root, lock_path);
                Ok(Some(Self {
                    _file: file,
                    path: lock_path,
                }))
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                tracing::debug!("Filesystem lock for {} is held elsewhere", root);
                Ok(None)
            }
            Err(e) => Err(e).context("Failed to acquire filesystem lock"),
        }
    }

    /// Poll until the lock is free or `timeout` expires (`Ok(None)`)
    pub fn acquire_blocking(lock_dir: &Path, root: &str, timeout: Duration) -> Result<Option<Self>> {
        let start = Instant::now();
        let poll = Duration::from_millis(200);

        loop {
            if let Some(guard) = Self::try_acquire(lock_dir, root)? {
                if start.elapsed() > poll {
                    tracing::info!("Acquired filesystem lock after {:?}", start.elapsed());
                }
                return Ok(Some(guard));
            }
            if start.elapsed() >= timeout {
                tracing::warn!(
                    "Timed out after {:?} waiting for filesystem lock on {}",
                    timeout,
                    root
                );
                return Ok(None);
            }
            std::thread::sleep(poll);
        }
    }
}

impl Drop for FsLockGuard {
    fn drop(&mut self) {
        // Closing the file releases the lock; the file itself is reused
        tracing::debug!("Releasing filesystem lock {:?}", self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let guard = FsLockGuard::try_acquire(dir.path(), "/project").unwrap();
        assert!(guard.is_some());
        drop(guard);

        let again = FsLockGuard::try_acquire(dir.path(), "/project").unwrap();
        assert!(again.is_some());
    }

    #[test]
    fn test_held_lock_blocks_other_holder() {
        let dir = TempDir::new().unwrap();
        let _held = FsLockGuard::try_acquire(dir.path(), "/project").unwrap().unwrap();

        let lock_dir = dir.path().to_path_buf();
        let other = thread::spawn(move || FsLockGuard::try_acquire(&lock_dir, "/project").unwrap())
            .join()
            .unwrap();
        assert!(other.is_none());
    }

    #[test]
    fn test_blocking_acquire_times_out() {
        let dir = TempDir::new().unwrap();
        let _held = FsLockGuard::try_acquire(dir.path(), "/project").unwrap().unwrap();

        let lock_dir = dir.path().to_path_buf();
        let result = thread::spawn(move || {
            FsLockGuard::acquire_blocking(&lock_dir, "/project", Duration::from_millis(50)).unwrap()
        })
        .join()
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_roots_get_distinct_lock_files() {
        let dir = Path::new("/locks");
        assert_ne!(lock_file_path(dir, "/a"), lock_file_path(dir, "/b"));
        assert_eq!(lock_file_path(dir, "/a"), lock_file_path(dir, "/a"));
    }
}
