/// Centralized error types for semindex using thiserror
///
/// Per-file errors (scan, parse, embedding, vector store, relationship consistency)
/// are isolated by the synchronizer and aggregated into the pass report; only
/// configuration, state and validation errors abort a whole operation.
use thiserror::Error;

/// Main error type for the indexing engine
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("Relationship consistency error: {0}")]
    Relationship(#[from] RelationshipConsistencyError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors raised while discovering files. Never fatal for a pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("Directory not found: {0}")]
    RootNotFound(String),

    #[error("Path is not a directory: {0}")]
    NotADirectory(String),

    #[error("Failed to read file '{path}': {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Symlink loop detected at '{0}'")]
    SymlinkLoop(String),

    #[error("Failed to walk directory: {0}")]
    WalkFailed(String),

    #[error("Scan was cancelled")]
    Cancelled,
}

/// Typed parse failures. The file is still chunked by line windows.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Syntax error at line {line}, column {column}")]
    Syntax { line: usize, column: usize },

    #[error("Unsupported language construct or grammar: {language}")]
    Unsupported { language: String },

    #[error("File is not valid UTF-8, decoded lossily")]
    Encoding,

    #[error("Parser produced no tree")]
    Aborted,
}

/// Malformed fingerprints. Only reachable through corrupt persisted state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("Invalid hex digit in fingerprint '{0}'")]
    InvalidHex(String),

    #[error("Invalid fingerprint length: expected {expected} hex chars, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Errors related to embedding generation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("Failed to initialize embedding model: {0}")]
    InitializationFailed(String),

    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),

    #[error("Embedding batch is empty")]
    EmptyBatch,

    #[error("Embedding generation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding count mismatch: sent {sent} texts, received {received} vectors")]
    CountMismatch { sent: usize, received: usize },

    #[error("Model lock was poisoned: {0}")]
    LockPoisoned(String),
}

impl EmbeddingError {
    /// Transient failures are retried with backoff before chunks are marked pending
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GenerationFailed(_) | Self::Timeout(_))
    }
}

/// Errors related to vector store operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VectorStoreError {
    #[error("Vector store is not initialized")]
    NotInitialized,

    #[error("Vector dimension mismatch: store holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Failed to upsert vectors: {0}")]
    UpsertFailed(String),

    #[error("Failed to delete vectors: {0}")]
    DeleteFailed(String),

    #[error("Failed to query vectors: {0}")]
    QueryFailed(String),

    #[error("Failed to persist vector store to '{path}': {reason}")]
    PersistFailed { path: String, reason: String },
}

/// Invariant violations detected in the relationship graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelationshipConsistencyError {
    #[error("Edge '{edge}' in '{file}' references chunk '{chunk}' which has no index record")]
    DanglingEdge {
        file: String,
        edge: String,
        chunk: String,
    },

    #[error("Symbol '{symbol}' in '{file}' is attributed to missing chunk '{chunk}'")]
    OrphanSymbol {
        file: String,
        symbol: String,
        chunk: String,
    },
}

impl RelationshipConsistencyError {
    /// File whose sub-pass must be rebuilt
    pub fn file(&self) -> &str {
        match self {
            Self::DanglingEdge { file, .. } | Self::OrphanSymbol { file, .. } => file,
        }
    }
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Errors related to input validation
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Path does not exist: {0}")]
    PathNotFound(String),

    #[error("Path is not a directory: {0}")]
    NotADirectory(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("{field} must be {constraint}, got {actual}")]
    ConstraintViolation {
        field: String,
        constraint: String,
        actual: String,
    },

    #[error("Empty {0}")]
    Empty(String),
}

/// Errors related to the persisted index state
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to load index state from '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Failed to save index state to '{path}': {reason}")]
    SaveFailed { path: String, reason: String },

    #[error("Index state format version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("Failed to acquire index lock: {0}")]
    LockFailed(String),
}

// Conversion from anyhow::Error to IndexError
impl From<anyhow::Error> for IndexError {
    fn from(err: anyhow::Error) -> Self {
        IndexError::Other(format!("{:#}", err))
    }
}

impl IndexError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        IndexError::Other(msg.into())
    }

    /// Convert to a user-facing error string suitable for CLI output
    pub fn to_user_string(&self) -> String {
        format!("{}", self)
    }

    /// Check if this is a user error (validation, bad config) vs system error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            IndexError::Validation(_) | IndexError::Config(ConfigError::InvalidValue { .. })
        )
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            IndexError::Embedding(e) => e.is_retryable(),
            IndexError::Io(_) => true,
            _ => false,
        }
    }
}
