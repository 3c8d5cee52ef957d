/// Centralized platform-specific path computation
///
/// Resolves the platform data, cache and config directories through `dirs`,
/// falling back to the working directory when a platform directory is unknown.
use std::path::{Path, PathBuf};

const APP_DIR: &str = "semindex";

/// Platform-agnostic path utilities
pub struct PlatformPaths;

impl PlatformPaths {
    /// Local (non-roaming) data directory
    ///
    /// - Windows: %LOCALAPPDATA%
    /// - macOS: ~/Library/Application Support
    /// - Linux/Unix: $XDG_DATA_HOME or ~/.local/share
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Config directory
    ///
    /// - Windows: %APPDATA%
    /// - macOS: ~/Library/Application Support
    /// - Linux/Unix: $XDG_CONFIG_HOME or ~/.config
    pub fn config_dir() -> PathBuf {
        dirs::config_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Returns: {data_dir}/semindex
    pub fn project_data_dir() -> PathBuf {
        Self::data_dir().join(APP_DIR)
    }

    /// Returns: {config_dir}/semindex
    pub fn project_config_dir() -> PathBuf {
        Self::config_dir().join(APP_DIR)
    }

    /// Returns: {data_dir}/semindex/state.json
    pub fn default_state_path() -> PathBuf {
        Self::project_data_dir().join("state.json")
    }

    /// Returns: {data_dir}/semindex/vectors.json
    pub fn default_vector_store_path() -> PathBuf {
        Self::project_data_dir().join("vectors.json")
    }

    /// Returns: {data_dir}/semindex/locks
    pub fn lock_dir() -> PathBuf {
        Self::project_data_dir().join("locks")
    }

    /// Returns: {config_dir}/semindex/config.toml
    pub fn default_config_path() -> PathBuf {
        Self::project_config_dir().join("config.toml")
    }

    /// Canonical form of a project root, the key of its persisted state
    pub fn normalize_root(path: impl AsRef<Path>) -> std::io::Result<String> {
        let canonical = std::fs::canonicalize(path.as_ref())?;
        Ok(canonical.to_string_lossy().to_string())
    }

    /// Root-relative form of `path`, with `/` separators.
    ///
    /// Relative paths are taken as already relative to the root. Absolute
    /// paths outside the root give `None`. A path that no longer exists is
    /// resolved through its parent directory.
    pub fn relative_to(root: &str, path: impl AsRef<Path>) -> Option<String> {
        let path = path.as_ref();
        if path.is_relative() {
            return Some(crate::sync::normalize_relative(&path.to_string_lossy()));
        }

        let resolved = std::fs::canonicalize(path).ok().or_else(|| {
            let parent = std::fs::canonicalize(path.parent()?).ok()?;
            Some(parent.join(path.file_name()?))
        });
        let relative = resolved
            .as_deref()
            .and_then(|p| p.strip_prefix(root).ok())
            .or_else(|| path.strip_prefix(root).ok())?;
        let relative = relative.to_string_lossy().replace('\\', "/");
        (!relative.is_empty()).then_some(relative)
    }
}
