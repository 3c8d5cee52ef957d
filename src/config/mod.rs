/// Configuration system for semindex
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{ConfigError, IndexError};
use crate::relations::TieBreak;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Scanning, chunking and parallelism
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Relationship graph policy
    #[serde(default)]
    pub relations: RelationsConfig,

    /// File watcher debouncing
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Persisted state locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Search configuration
    #[serde(default)]
    pub search: SearchConfig,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider: "hashing" (deterministic, offline) or "fastembed"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name for the fastembed provider (e.g. "all-MiniLM-L6-v2")
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Vector dimension for the hashing provider
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Batch size for embedding generation
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Timeout in seconds for one embedding batch
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Attempts after the first failure before chunks are marked pending
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff between attempts, doubled on every retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Embedding batches in flight at once
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Maximum file size to index (in bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// Default include patterns
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Default exclude patterns
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Extensions to index; empty means every file with a detected language
    #[serde(default)]
    pub allowed_extensions: Vec<String>,

    /// Index hidden files and directories
    #[serde(default)]
    pub include_dotfiles: bool,

    /// Follow symbolic links while walking
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Order files by git status, entry points and depth before processing
    #[serde(default = "default_true")]
    pub prioritize: bool,

    /// Upper bound on lines per chunk
    #[serde(default = "default_max_chunk_lines")]
    pub max_chunk_lines: usize,

    /// Window size used for fallback chunking and oversized symbols
    #[serde(default = "default_window_lines")]
    pub window_lines: usize,

    /// Worker threads for parsing and chunking (0 = number of CPUs)
    #[serde(default)]
    pub worker_threads: usize,
}

/// Relationship graph configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationsConfig {
    /// Derive symbols and edges during indexing
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Order in which ambiguous references are resolved
    #[serde(default = "default_tie_break")]
    pub tie_break: Vec<TieBreak>,
}

/// Watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Quiet period before a batch of changes triggers a pass
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Upper bound on how long a continuously changing tree delays a pass
    #[serde(default = "default_max_batch_wait_ms")]
    pub max_batch_wait_ms: u64,

    /// Capacity of the change-batch channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Index state file (records, relationships, flags)
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Persisted vectors of the in-memory store; unset keeps vectors in memory only
    #[serde(default = "default_vector_store_path")]
    pub vector_store_path: Option<PathBuf>,
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default minimum similarity score (0.0 to 1.0)
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// Default result limit
    #[serde(default = "default_result_limit")]
    pub limit: usize,
}

// Default value functions
fn default_provider() -> String {
    "hashing".to_string()
}

fn default_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_dimension() -> usize {
    384
}

fn default_batch_size() -> usize {
    32
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_max_concurrent_requests() -> usize {
    4
}

fn default_max_file_size() -> usize {
    1_048_576 // 1 MB
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "target".to_string(),
        "node_modules".to_string(),
        ".git".to_string(),
        "dist".to_string(),
        "build".to_string(),
        "__pycache__".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

fn default_max_chunk_lines() -> usize {
    120
}

fn default_window_lines() -> usize {
    50
}

fn default_tie_break() -> Vec<TieBreak> {
    vec![TieBreak::SameFile, TieBreak::SameDirectory, TieBreak::FirstSeen]
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_max_batch_wait_ms() -> u64 {
    5_000
}

fn default_channel_capacity() -> usize {
    16
}

fn default_state_path() -> PathBuf {
    crate::paths::PlatformPaths::default_state_path()
}

fn default_vector_store_path() -> Option<PathBuf> {
    Some(crate::paths::PlatformPaths::default_vector_store_path())
}

fn default_min_score() -> f32 {
    0.3
}

fn default_result_limit() -> usize {
    10
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_name: default_model_name(),
            dimension: default_dimension(),
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            include_patterns: Vec::new(),
            exclude_patterns: default_exclude_patterns(),
            allowed_extensions: Vec::new(),
            include_dotfiles: false,
            follow_symlinks: false,
            prioritize: true,
            max_chunk_lines: default_max_chunk_lines(),
            window_lines: default_window_lines(),
            worker_threads: 0,
        }
    }
}

impl Default for RelationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tie_break: default_tie_break(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_batch_wait_ms: default_max_batch_wait_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            vector_store_path: default_vector_store_path(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            limit: default_result_limit(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, IndexError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or create default
    pub fn load_or_default() -> Result<Self, IndexError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), IndexError> {
        let invalid = |key: &str, reason: String| -> Result<(), IndexError> {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason,
            }
            .into())
        };

        if self.embedding.provider != "hashing" && self.embedding.provider != "fastembed" {
            return invalid(
                "embedding.provider",
                format!(
                    "must be 'hashing' or 'fastembed', got '{}'",
                    self.embedding.provider
                ),
            );
        }

        if self.embedding.batch_size == 0 {
            return invalid("embedding.batch_size", "must be greater than 0".to_string());
        }

        if self.embedding.dimension == 0 {
            return invalid("embedding.dimension", "must be greater than 0".to_string());
        }

        if self.embedding.max_concurrent_requests == 0 {
            return invalid(
                "embedding.max_concurrent_requests",
                "must be greater than 0".to_string(),
            );
        }

        if self.indexing.max_file_size == 0 {
            return invalid("indexing.max_file_size", "must be greater than 0".to_string());
        }

        if self.indexing.window_lines == 0 {
            return invalid("indexing.window_lines", "must be greater than 0".to_string());
        }

        if self.indexing.max_chunk_lines < self.indexing.window_lines {
            return invalid(
                "indexing.max_chunk_lines",
                format!(
                    "must be at least window_lines ({}), got {}",
                    self.indexing.window_lines, self.indexing.max_chunk_lines
                ),
            );
        }

        if self.relations.tie_break.is_empty() {
            return invalid(
                "relations.tie_break",
                "must name at least one rule".to_string(),
            );
        }

        if self.watcher.channel_capacity == 0 {
            return invalid(
                "watcher.channel_capacity",
                "must be greater than 0".to_string(),
            );
        }

        if !(0.0..=1.0).contains(&self.search.min_score) {
            return invalid(
                "search.min_score",
                format!("must be between 0.0 and 1.0, got {}", self.search.min_score),
            );
        }

        if self.search.limit == 0 {
            return invalid("search.limit", "must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(provider) = std::env::var("SEMINDEX_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }

        if let Ok(model) = std::env::var("SEMINDEX_MODEL") {
            self.embedding.model_name = model;
        }

        if let Ok(batch_size) = std::env::var("SEMINDEX_BATCH_SIZE")
            && let Ok(size) = batch_size.parse()
        {
            self.embedding.batch_size = size;
        }

        if let Ok(concurrency) = std::env::var("SEMINDEX_MAX_CONCURRENT_REQUESTS")
            && let Ok(n) = concurrency.parse()
        {
            self.embedding.max_concurrent_requests = n;
        }

        if let Ok(threads) = std::env::var("SEMINDEX_WORKER_THREADS")
            && let Ok(n) = threads.parse()
        {
            self.indexing.worker_threads = n;
        }

        if let Ok(debounce) = std::env::var("SEMINDEX_DEBOUNCE_MS")
            && let Ok(ms) = debounce.parse()
        {
            self.watcher.debounce_ms = ms;
        }

        if let Ok(path) = std::env::var("SEMINDEX_STATE_PATH") {
            self.storage.state_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("SEMINDEX_VECTOR_STORE_PATH") {
            self.storage.vector_store_path = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }

        if let Ok(min_score) = std::env::var("SEMINDEX_MIN_SCORE")
            && let Ok(score) = min_score.parse()
        {
            self.search.min_score = score;
        }
    }

    /// Load from an explicit file, or the default location, then apply overrides
    pub fn load(path: Option<&Path>) -> Result<Self, IndexError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::load_or_default()?,
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Create a new Config with defaults and environment overrides
    pub fn new() -> Result<Self, IndexError> {
        Self::load(None)
    }

    /// Configuration rooted in a single directory, used by tests and benches
    pub fn in_directory(dir: &Path) -> Self {
        let mut config = Self::default();
        config.storage.state_path = dir.join("state.json");
        config.storage.vector_store_path = Some(dir.join("vectors.json"));
        config
    }
}
