//! CPU-bound derivation of a file's desired state: parse, chunk, fingerprint,
//! metrics, symbols and raw references. Runs on a dedicated rayon pool.

use crate::indexer::{
    CodeChunk, CodeChunker, Fingerprint, Metrics, ParseResult, ParserRegistry, SourceFile,
    file_fingerprint, metrics,
};
use crate::relations::extract::build_symbols;
use crate::relations::{RawReference, ReferenceExtractor, Symbol};
use crate::error::ParseError;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything the pipeline needs, shared by all workers
#[derive(Clone)]
pub struct Pipeline {
    pub parsers: ParserRegistry,
    pub chunker: CodeChunker,
    pub extractor: Arc<ReferenceExtractor>,
    /// Derive symbols and references
    pub relations: bool,
}

/// A file's desired state
#[derive(Debug)]
pub struct DerivedFile {
    pub source: SourceFile,
    pub chunks: Vec<CodeChunk>,
    /// One entry per chunk
    pub metrics: Vec<Metrics>,
    pub fingerprint: Fingerprint,
    pub symbols: Vec<Symbol>,
    pub references: Vec<RawReference>,
    pub parse_warning: Option<String>,
}

/// Work item: a file plus the metrics already known for its chunk contents
pub struct DeriveJob {
    pub source: SourceFile,
    pub known_metrics: HashMap<Fingerprint, Metrics>,
}

impl Pipeline {
    pub fn derive(&self, job: DeriveJob) -> DerivedFile {
        let DeriveJob {
            source,
            known_metrics,
        } = job;

        let (parsed, parse_warning) = self.parse(&source);
        let chunks = self.chunker.chunk_file(&source, parsed.as_ref());

        let metrics: Vec<Metrics> = chunks
            .iter()
            .map(|chunk| {
                known_metrics
                    .get(&chunk.fingerprint)
                    .copied()
                    .unwrap_or_else(|| metrics::calculate(&chunk.content, chunk.language))
            })
            .collect();
        let fingerprint = file_fingerprint(chunks.iter().map(|c| &c.fingerprint));

        let path = source.relative_path.as_str();
        let symbols = match (&parsed, self.relations) {
            (Some(parsed), true) => build_symbols(path, parsed, &chunks),
            _ => Vec::new(),
        };
        let references = if self.relations && source.language.is_some_and(|l| l.is_code()) {
            self.extractor
                .extract(path, &source.content, source.language, &symbols, &chunks)
        } else {
            Vec::new()
        };

        DerivedFile {
            source,
            chunks,
            metrics,
            fingerprint,
            symbols,
            references,
            parse_warning,
        }
    }

    /// Parse failures degrade to window chunking with a warning
    fn parse(&self, source: &SourceFile) -> (Option<ParseResult>, Option<String>) {
        let encoding_warning = source.lossy.then(|| ParseError::Encoding.to_string());
        let Some(language) = source.language else {
            return (None, encoding_warning);
        };

        match self.parsers.parse(language, &source.content) {
            None => (None, encoding_warning),
            Some(Ok(parsed)) => (Some(parsed), encoding_warning),
            Some(Err(err)) => {
                tracing::warn!(
                    "Parse failed for {}, using line windows: {}",
                    source.relative_path,
                    err
                );
                (None, Some(err.to_string()))
            }
        }
    }

    /// Derive all jobs on `pool`, preserving input order
    pub fn derive_all(&self, pool: &rayon::ThreadPool, jobs: Vec<DeriveJob>) -> Vec<DerivedFile> {
        pool.install(|| jobs.into_par_iter().map(|job| self.derive(job)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::{Language, fingerprint};
    use std::path::PathBuf;

    fn pipeline() -> Pipeline {
        Pipeline {
            parsers: ParserRegistry::with_default_backends(),
            chunker: CodeChunker::default_strategy(),
            extractor: Arc::new(ReferenceExtractor::new().unwrap()),
            relations: true,
        }
    }

    fn source(path: &str, language: Option<Language>, content: &str) -> SourceFile {
        SourceFile {
            path: PathBuf::from(path),
            relative_path: path.to_string(),
            extension: path.rsplit_once('.').map(|(_, e)| e.to_string()),
            language,
            content: content.to_string(),
            content_hash: fingerprint(content.as_bytes()),
            size: content.len() as u64,
            modified_at: 0,
            lossy: false,
            priority: 0,
        }
    }

    fn job(source: SourceFile) -> DeriveJob {
        DeriveJob {
            source,
            known_metrics: HashMap::new(),
        }
    }

    #[test]
    fn test_derive_python_file() {
        let content = "def helper():\n    return 1\n\n\ndef main():\n    return helper()\n";
        let derived = pipeline().derive(job(source("app.py", Some(Language::Python), content)));

        assert_eq!(derived.chunks.len(), 2);
        assert_eq!(derived.metrics.len(), 2);
        assert!(derived.parse_warning.is_none());
        let names: Vec<&str> = derived.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["helper", "main"]);
        assert!(derived.references.iter().any(|r| r.name == "helper"));
        assert_eq!(
            derived.fingerprint,
            file_fingerprint(derived.chunks.iter().map(|c| &c.fingerprint))
        );
    }

    #[test]
    fn test_syntax_error_falls_back_to_windows() {
        let content = "def broken(:\n    pass\n";
        let derived = pipeline().derive(job(source("bad.py", Some(Language::Python), content)));

        assert!(derived.parse_warning.as_deref().is_some_and(|w| w.contains("Syntax error")));
        assert!(derived.symbols.is_empty());
        let joined: String = derived.chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(joined, content);
    }

    #[test]
    fn test_known_metrics_are_reused() {
        let content = "x = 1\n";
        let file = source("x.py", Some(Language::Python), content);
        let mut known = Metrics::default();
        known.complexity = 99;
        let derived = pipeline().derive(DeriveJob {
            known_metrics: HashMap::from([(fingerprint(content.as_bytes()), known)]),
            source: file,
        });
        assert_eq!(derived.metrics[0].complexity, 99);
    }

    #[test]
    fn test_prose_has_no_references() {
        let content = "# Notes\n\nCall helper() before main.\n";
        let derived = pipeline().derive(job(source("README.md", Some(Language::Markdown), content)));
        assert!(derived.symbols.is_empty());
        assert!(derived.references.is_empty());
        assert_eq!(derived.chunks.len(), 1);
    }

    #[test]
    fn test_derive_all_preserves_order() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let jobs = (0..8)
            .map(|i| job(source(&format!("f{}.py", i), Some(Language::Python), "pass\n")))
            .collect();
        let derived = pipeline().derive_all(&pool, jobs);
        let paths: Vec<String> = derived.iter().map(|d| d.source.relative_path.clone()).collect();
        let expected: Vec<String> = (0..8).map(|i| format!("f{}.py", i)).collect();
        assert_eq!(paths, expected);
    }
}
