//! Embedding of new and changed chunk texts: deduplicated by fingerprint,
//! batched, bounded in concurrency, each call under a timeout and retried
//! with exponential backoff.

use crate::config::EmbeddingConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::EmbeddingError;
use crate::indexer::Fingerprint;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct EmbedSettings {
    pub batch_size: usize,
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
    pub concurrency: usize,
}

impl EmbedSettings {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
            concurrency: config.max_concurrent_requests.max(1),
        }
    }
}

/// Vectors by chunk fingerprint
#[derive(Debug, Default)]
pub struct Embedded {
    pub vectors: HashMap<Fingerprint, Vec<f32>>,
    pub failures: HashMap<Fingerprint, EmbeddingError>,
    /// Provider invocations, retries included
    pub calls: usize,
    /// Some batches were not attempted because the pass was cancelled
    pub cancelled: bool,
}

impl Embedded {
    pub fn vector(&self, fingerprint: &Fingerprint) -> Option<&Vec<f32>> {
        self.vectors.get(fingerprint)
    }
}

struct BatchOutcome {
    fingerprints: Vec<Fingerprint>,
    result: Option<Result<Vec<Vec<f32>>, EmbeddingError>>,
    calls: usize,
}

/// Embed `texts`, one call per unique fingerprint
pub async fn embed_texts(
    provider: Arc<dyn EmbeddingProvider>,
    texts: Vec<(Fingerprint, String)>,
    settings: &EmbedSettings,
    cancel: &CancellationToken,
) -> Embedded {
    let mut seen = HashSet::new();
    let unique: Vec<(Fingerprint, String)> = texts
        .into_iter()
        .filter(|(fingerprint, _)| seen.insert(*fingerprint))
        .collect();

    let mut embedded = Embedded::default();
    if unique.is_empty() {
        return embedded;
    }

    let batches: Vec<Vec<(Fingerprint, String)>> = unique
        .chunks(settings.batch_size)
        .map(<[_]>::to_vec)
        .collect();
    tracing::debug!(
        "Embedding {} unique chunks in {} batches",
        unique.len(),
        batches.len()
    );

    let mut outcomes = stream::iter(batches)
        .map(|batch| {
            let provider = provider.clone();
            async move {
                let (fingerprints, texts): (Vec<_>, Vec<_>) = batch.into_iter().unzip();
                if cancel.is_cancelled() {
                    return BatchOutcome {
                        fingerprints,
                        result: None,
                        calls: 0,
                    };
                }
                let (result, calls) = embed_with_retry(provider, texts, settings, cancel).await;
                BatchOutcome {
                    fingerprints,
                    result: Some(result),
                    calls,
                }
            }
        })
        .buffer_unordered(settings.concurrency);

    while let Some(outcome) = outcomes.next().await {
        embedded.calls += outcome.calls;
        match outcome.result {
            None => embedded.cancelled = true,
            Some(Ok(vectors)) => {
                embedded
                    .vectors
                    .extend(outcome.fingerprints.into_iter().zip(vectors));
            }
            Some(Err(err)) => {
                tracing::warn!(
                    "Embedding failed for {} chunks, marking them pending: {}",
                    outcome.fingerprints.len(),
                    err
                );
                for fingerprint in outcome.fingerprints {
                    embedded.failures.insert(fingerprint, err.clone());
                }
            }
        }
    }

    embedded
}

/// One batch through the provider, retrying transient failures
async fn embed_with_retry(
    provider: Arc<dyn EmbeddingProvider>,
    texts: Vec<String>,
    settings: &EmbedSettings,
    cancel: &CancellationToken,
) -> (Result<Vec<Vec<f32>>, EmbeddingError>, usize) {
    let dimension = provider.dimension();
    let mut attempt: u32 = 0;
    let mut calls = 0;

    loop {
        calls += 1;
        let call_provider = provider.clone();
        let batch = texts.clone();
        let call = tokio::task::spawn_blocking(move || call_provider.embed_batch(batch));

        let result = match tokio::time::timeout(settings.timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(EmbeddingError::GenerationFailed(format!(
                "embedding task panicked: {}",
                e
            ))),
            Err(_) => Err(EmbeddingError::Timeout(settings.timeout.as_secs())),
        }
        .and_then(|vectors| check_vectors(vectors, texts.len(), dimension));

        match result {
            Ok(vectors) => return (Ok(vectors), calls),
            Err(err) if err.is_retryable() && attempt < settings.max_retries => {
                let delay = settings
                    .backoff
                    .saturating_mul(2u32.saturating_pow(attempt));
                tracing::warn!(
                    "Embedding attempt {} failed: {}, retrying in {:?}",
                    attempt + 1,
                    err,
                    delay
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return (Err(err), calls),
                }
                attempt += 1;
            }
            Err(err) => return (Err(err), calls),
        }
    }
}

fn check_vectors(
    vectors: Vec<Vec<f32>>,
    sent: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if vectors.len() != sent {
        return Err(EmbeddingError::CountMismatch {
            sent,
            received: vectors.len(),
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::indexer::fingerprint;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls, then delegates
    struct FlakyEmbedder {
        inner: HashingEmbedder,
        failures: usize,
        calls: AtomicUsize,
        batch_sizes: Mutex<Vec<usize>>,
    }

    impl FlakyEmbedder {
        fn new(failures: usize) -> Self {
            Self {
                inner: HashingEmbedder::new(16),
                failures,
                calls: AtomicUsize::new(0),
                batch_sizes: Mutex::new(Vec::new()),
            }
        }
    }

    impl EmbeddingProvider for FlakyEmbedder {
        fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.batch_sizes.lock().unwrap().push(texts.len());
            if call < self.failures {
                return Err(EmbeddingError::GenerationFailed("backend unavailable".to_string()));
            }
            self.inner.embed_batch(texts)
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    /// Returns vectors of the wrong size
    struct WrongDimension;

    impl EmbeddingProvider for WrongDimension {
        fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![0.0; 3]).collect())
        }

        fn dimension(&self) -> usize {
            8
        }

        fn model_name(&self) -> &str {
            "wrong"
        }
    }

    fn settings(batch_size: usize, max_retries: u32) -> EmbedSettings {
        EmbedSettings {
            batch_size,
            timeout: Duration::from_secs(5),
            max_retries,
            backoff: Duration::from_millis(1),
            concurrency: 2,
        }
    }

    fn texts(items: &[&str]) -> Vec<(Fingerprint, String)> {
        items
            .iter()
            .map(|t| (fingerprint(t.as_bytes()), t.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_identical_texts_embedded_once() {
        let provider = Arc::new(FlakyEmbedder::new(0));
        let embedded = embed_texts(
            provider.clone(),
            texts(&["a b", "c d", "a b"]),
            &settings(10, 0),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(embedded.vectors.len(), 2);
        assert_eq!(embedded.calls, 1);
        assert_eq!(*provider.batch_sizes.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_batches_respect_batch_size() {
        let provider = Arc::new(FlakyEmbedder::new(0));
        let embedded = embed_texts(
            provider.clone(),
            texts(&["one", "two", "three", "four", "five"]),
            &settings(2, 0),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(embedded.vectors.len(), 5);
        assert_eq!(embedded.calls, 3);
        let mut sizes = provider.batch_sizes.lock().unwrap().clone();
        sizes.sort();
        assert_eq!(sizes, vec![1, 2, 2]);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let provider = Arc::new(FlakyEmbedder::new(2));
        let embedded = embed_texts(
            provider,
            texts(&["retry me"]),
            &settings(10, 3),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(embedded.vectors.len(), 1);
        assert!(embedded.failures.is_empty());
        assert_eq!(embedded.calls, 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_failures() {
        let provider = Arc::new(FlakyEmbedder::new(usize::MAX));
        let embedded = embed_texts(
            provider,
            texts(&["never works"]),
            &settings(10, 2),
            &CancellationToken::new(),
        )
        .await;

        assert!(embedded.vectors.is_empty());
        assert_eq!(embedded.failures.len(), 1);
        assert_eq!(embedded.calls, 3);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_not_retried() {
        let embedded = embed_texts(
            Arc::new(WrongDimension),
            texts(&["x"]),
            &settings(10, 3),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(embedded.calls, 1);
        assert!(matches!(
            embedded.failures.values().next(),
            Some(EmbeddingError::DimensionMismatch { expected: 8, actual: 3 })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let provider = Arc::new(FlakyEmbedder::new(0));
        let embedded = embed_texts(provider.clone(), texts(&["a", "b"]), &settings(1, 0), &cancel).await;

        assert!(embedded.cancelled);
        assert!(embedded.vectors.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
