use sha2::{Digest, Sha256};

use crate::embeddings::Embedder;
use crate::retrieval::tokenize;

/// Bigrams count for half of a unigram.
const BIGRAM_WEIGHT: f32 = 0.5;

/// Deterministic signed feature-hashing embedder.
///
/// Each unigram and adjacent bigram is hashed with SHA-256 into one of
/// `dimensions` buckets with a ±1 sign; the vector is then L2-normalized.
/// Vectors are stable across processes and platforms, so replayed ticks see
/// identical similarity scores.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut index_bytes = [0u8; 8];
        index_bytes.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(index_bytes) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let tokens = tokenize(text);

        for token in &tokens {
            let (index, sign) = self.bucket(token);
            vector[index] += sign;
        }
        for pair in tokens.windows(2) {
            let (index, sign) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            vector[index] += sign * BIGRAM_WEIGHT;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in vector.iter_mut() {
                *x /= norm;
            }
        }
        vector
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_embedding_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(128);
        let a = embedder.embed("Heavy congestion on Main Street after rain");
        let b = embedder.embed("Heavy congestion on Main Street after rain");
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
        assert!((dot(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(32);
        assert!(embedder.embed("").iter().all(|x| *x == 0.0));
        assert!(embedder.embed("the of and").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_related_texts_score_higher() {
        let embedder = HashingEmbedder::new(256);
        let query = embedder.embed("ambulance blocked by collision at intersection");
        let related = embedder.embed("collision at intersection blocked ambulance access");
        let unrelated = embedder.embed("festival parade schedule for downtown weekend");
        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[test]
    fn test_zero_dimensions_clamped() {
        let embedder = HashingEmbedder::new(0);
        assert_eq!(embedder.dimensions(), 1);
        assert_eq!(embedder.embed("fog").len(), 1);
    }
}
