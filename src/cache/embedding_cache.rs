use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Thread-safe LRU cache for query embeddings
///
/// Caches embeddings for frequently-used queries so repeated ticks do not
/// re-embed the same text. Uses LRU eviction to keep memory bounded.
pub struct EmbeddingCache {
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingCache {
    /// Create a new embedding cache with the specified capacity
    ///
    /// A capacity of 0 is raised to 1 (the LRU requires a non-zero capacity).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);

        Self {
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Vec<f32>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a cached embedding for a query
    pub fn get(&self, query: &str) -> Option<Vec<f32>> {
        self.lock().get(query).cloned()
    }

    /// Store an embedding in the cache
    pub fn put(&self, query: String, embedding: Vec<f32>) {
        self.lock().put(query, embedding);
    }

    /// Return the cached embedding for `query`, computing it with `compute`
    /// on a miss.
    ///
    /// The lock is not held while `compute` runs. After computing, the cache is
    /// checked again: if another caller populated the entry in the meantime, its
    /// value wins so every caller observes the same vector.
    pub fn get_or_insert_with<F>(&self, query: &str, compute: F) -> Vec<f32>
    where
        F: FnOnce() -> Vec<f32>,
    {
        if let Some(hit) = self.get(query) {
            log::debug!("Embedding cache hit for query: {}", query);
            return hit;
        }

        let computed = compute();

        let mut guard = self.lock();
        if let Some(existing) = guard.get(query) {
            return existing.clone();
        }
        guard.put(query.to_string(), computed.clone());
        computed
    }

    /// Get the current number of cached entries
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Clear all entries from the cache
    pub fn clear(&self) {
        self.lock().clear();
    }
}
