//! # semindex - Incremental Code Indexing
//!
//! Keeps a searchable index of a codebase in step with the files on disk:
//! chunk embeddings in a vector store, per-chunk records, and a graph of
//! symbol definitions and the references between them.
//!
//! ## Overview
//!
//! Every chunk carries a content fingerprint. A pass re-parses only files whose
//! bytes changed, re-embeds only chunks whose fingerprint changed, and rewrites
//! a file's records and relationships in one step, so queries never observe a
//! half-applied file. Removing a file removes its chunks, vectors, symbols and
//! edges in the same pass.
//!
//! ## Architecture
//!
//! ```text
//!  files ─▶ FileWalker ─▶ ParserRegistry ─▶ CodeChunker ─▶ Fingerprint/Metrics
//!                                                                 │
//!              ┌──────────────── IndexSynchronizer ◀──────────────┘
//!              │        │                  │
//!              ▼        ▼                  ▼
//!    EmbeddingProvider  VectorStore   IndexStore (records + RelationshipGraph)
//!
//!  WatcherBridge ─ChangeBatch─▶ CodeIndex ─▶ IndexSynchronizer
//! ```
//!
//! ## Modules
//!
//! - [`client`]: [`CodeIndex`], the entry point wiring everything together
//! - [`sync`]: the synchronization pass
//! - [`indexer`]: scanning, parsing, chunking, fingerprints and metrics
//! - [`relations`]: symbols, references and the relationship graph
//! - [`state`]: persisted per-root index state
//! - [`embedding`]: embedding providers
//! - [`vector_db`]: vector store abstraction and the bundled store
//! - [`watcher`]: file-system notifications to debounced passes
//! - [`config`], [`error`], [`paths`], [`types`]
//!
//! ## Usage Example
//!
//! ```no_run
//! use semindex::{CodeIndex, Config, IndexRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let index = CodeIndex::with_config(Config::new()?).await?;
//!     let report = index
//!         .index(IndexRequest::new("."), CancellationToken::new())
//!         .await?;
//!     println!("{} files processed", report.files_processed);
//!     Ok(())
//! }
//! ```

/// The `CodeIndex` entry point and cross-process locking
pub mod client;

/// Configuration management with environment variable overrides
pub mod config;

/// Embedding providers
pub mod embedding;

/// Error types and utilities
pub mod error;

/// Include/exclude glob matching
pub mod glob_utils;

/// File scanning, parsing, chunking, fingerprints and metrics
pub mod indexer;

/// Platform directories and path normalization
pub mod paths;

/// Symbol extraction and the relationship graph
pub mod relations;

/// Persisted index state
pub mod state;

/// Index synchronization passes
pub mod sync;

/// Request, report and response types
pub mod types;

/// Vector store abstraction
pub mod vector_db;

/// File-system watcher bridge
pub mod watcher;

pub use client::CodeIndex;
pub use config::Config;
pub use error::IndexError;
pub use sync::IndexSynchronizer;
pub use types::*;
pub use watcher::{WatcherBridge, WatcherHandle};
