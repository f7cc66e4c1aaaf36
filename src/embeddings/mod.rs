//! Local text embeddings for dense retrieval.

pub mod hashing;

pub use hashing::HashingEmbedder;

use std::sync::Arc;

use crate::cache::EmbeddingCache;

/// Maps text to a fixed-length vector. Implementations are local and pure.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;

    fn dimensions(&self) -> usize;
}

/// Embedder decorator that memoizes query embeddings in an LRU cache.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, cache: Arc<EmbeddingCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}

impl Embedder for CachedEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        self.cache.get_or_insert_with(text, || self.inner.embed(text))
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_embedder_matches_inner() {
        let inner: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(64));
        let cached = CachedEmbedder::new(Arc::clone(&inner), Arc::new(EmbeddingCache::new(8)));
        let text = "collision near central hospital";
        assert_eq!(cached.embed(text), inner.embed(text));
        assert_eq!(cached.cache().len(), 1);
        assert_eq!(cached.embed(text), inner.embed(text));
        assert_eq!(cached.cache().len(), 1);
        assert_eq!(cached.dimensions(), 64);
    }
}
