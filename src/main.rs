use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use semindex::{CodeIndex, Config, IndexRequest, SearchRequest, WatcherBridge};
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser)]
#[command(name = "semindex")]
#[command(version = VERSION)]
#[command(about = "Incremental semantic code index", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config location)
    #[arg(long, global = true, env = "SEMINDEX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize the index of a directory with its files
    Index {
        path: String,
        /// Re-derive and re-embed every file
        #[arg(long)]
        force: bool,
        /// Glob patterns to include
        #[arg(long)]
        include: Vec<String>,
        /// Glob patterns to exclude
        #[arg(long)]
        exclude: Vec<String>,
    },
    /// Keep the index of a directory current until interrupted
    Watch { path: String },
    /// Semantic search over indexed chunks
    Search {
        query: String,
        /// Restrict to one indexed root
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        min_score: Option<f32>,
        /// Language names to keep (e.g. Rust, Python)
        #[arg(long)]
        language: Vec<String>,
    },
    /// Find symbol definitions by name
    Symbols {
        name: String,
        #[arg(long)]
        path: Option<String>,
    },
    /// Edges pointing at a symbol id such as `src/app.py::handle`
    Callers {
        symbol: String,
        #[arg(long)]
        path: Option<String>,
    },
    /// Show index statistics
    Status { path: Option<String> },
    /// Remove every chunk, vector and relationship of a root
    Clear { path: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let search_defaults = config.search.clone();
    let watcher_config = config.watcher.clone();
    let index = CodeIndex::with_config(config).await?;

    match cli.command {
        Commands::Index {
            path,
            force,
            include,
            exclude,
        } => {
            let mut request = IndexRequest::new(path);
            request.force = force;
            request.include_patterns = include;
            request.exclude_patterns = exclude;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupted, finishing files in progress");
                    on_interrupt.cancel();
                }
            });

            let report = index.index(request, cancel).await?;
            print_json(&report)?;
        }
        Commands::Watch { path } => {
            let handle = WatcherBridge::spawn(index, IndexRequest::new(path), &watcher_config)?;
            let mut reports = handle.subscribe();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    report = reports.recv() => match report {
                        Ok(report) => print_json(&report)?,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!("Skipped {} pass reports", n);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            handle.shutdown().await;
        }
        Commands::Search {
            query,
            path,
            limit,
            min_score,
            language,
        } => {
            let mut request = SearchRequest::new(query);
            request.path = path;
            request.limit = limit.unwrap_or(search_defaults.limit);
            request.min_score = min_score.unwrap_or(search_defaults.min_score);
            request.languages = language;
            print_json(&index.search(request).await?)?;
        }
        Commands::Symbols { name, path } => {
            print_json(&index.symbols(&name, path.as_deref()).await)?;
        }
        Commands::Callers { symbol, path } => {
            print_json(&index.callers(&symbol, path.as_deref()).await)?;
        }
        Commands::Status { path } => {
            print_json(&index.status(path.as_deref()).await?)?;
        }
        Commands::Clear { path } => {
            print_json(&index.clear(&path).await?)?;
        }
    }

    Ok(())
}
