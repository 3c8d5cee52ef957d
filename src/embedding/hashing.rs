use super::EmbeddingProvider;
use crate::error::EmbeddingError;
use sha2::{Digest, Sha256};

const MIN_DIMENSION: usize = 16;

/// Offline embedding by signed feature hashing.
///
/// Each text contributes word, word-bigram and character-trigram features;
/// every feature is hashed to one coordinate with a sign bit and the vector is
/// L2-normalized. Texts sharing identifiers and phrasing land close together,
/// which is enough for ranking code chunks without a model download.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(MIN_DIMENSION),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let normalized = text.to_lowercase();
        let tokens = word_tokens(&normalized);

        for token in &tokens {
            self.add_feature(&mut vector, &format!("t:{}", token), 1.0);
            // snake_case parts also match on their own
            for part in token.split('_').filter(|p| p.len() >= 2 && p.len() < token.len()) {
                self.add_feature(&mut vector, &format!("t:{}", part), 0.5);
            }
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("b:{}_{}", pair[0], pair[1]), 0.8);
        }

        let compact: Vec<char> = normalized.chars().filter(|c| !c.is_whitespace()).collect();
        for trigram in compact.windows(3) {
            let trigram: String = trigram.iter().collect();
            self.add_feature(&mut vector, &format!("c:{}", trigram), 0.15);
        }

        let norm = vector.iter().map(|v| (*v as f64) * (*v as f64)).sum::<f64>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v = (*v as f64 / norm) as f32;
            }
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut first = [0u8; 8];
        first.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(first) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign * weight;
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "hashing-v1"
    }
}

/// Words of at least two characters
fn word_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            current.push(ch);
        } else {
            if current.len() >= 2 {
                tokens.push(std::mem::take(&mut current));
            }
            current.clear();
        }
    }
    if current.len() >= 2 {
        tokens.push(current);
    }
    tokens
}
