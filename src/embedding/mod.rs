//! Embedding providers.
//!
//! Providers are deterministic: identical text always yields an identical
//! vector, which is what lets the synchronizer skip chunks whose fingerprint
//! is unchanged and deduplicate identical chunk texts within a pass.

#[cfg(feature = "fastembed-backend")]
mod fastembed_manager;
mod hashing;

#[cfg(feature = "fastembed-backend")]
pub use fastembed_manager::FastEmbedManager;
pub use hashing::HashingEmbedder;

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use std::sync::Arc;

/// Trait for embedding generation
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of text, one vector per input in order
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the dimension of the embeddings
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Identifies the vector space; stored vectors from another key are stale
    fn model_key(&self) -> String {
        format!("{}:{}", self.model_name(), self.dimension())
    }
}

/// Build the provider named by `config.provider`
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dimension))),
        #[cfg(feature = "fastembed-backend")]
        "fastembed" => Ok(Arc::new(FastEmbedManager::from_model_name(&config.model_name)?)),
        #[cfg(not(feature = "fastembed-backend"))]
        "fastembed" => Err(EmbeddingError::InitializationFailed(
            "semindex was built without the 'fastembed-backend' feature".to_string(),
        )),
        other => Err(EmbeddingError::InitializationFailed(format!(
            "unknown embedding provider '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_hashing() {
        let config = EmbeddingConfig {
            dimension: 128,
            ..Default::default()
        };
        let provider = from_config(&config).unwrap();
        assert_eq!(provider.dimension(), 128);
        assert_eq!(provider.model_key(), "hashing-v1:128");
    }

    #[test]
    fn test_from_config_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "remote".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            from_config(&config),
            Err(EmbeddingError::InitializationFailed(_))
        ));
    }
}
