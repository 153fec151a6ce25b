//! LRU cache for embedding results.
//!
//! Entity names recur across spans and chapters; the cache keeps each one
//! from being re-embedded. Shared by all workers of a run.

use std::collections::HashMap;

use ndarray::Array1;
use parking_lot::Mutex;

use crate::embedder::{EmbedderBackend, EmbeddingResult};

/// Thread-safe, capacity-bounded LRU cache keyed by input text.
pub struct EmbeddingCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    entries: HashMap<String, Array1<f32>>,
    /// Keys from least to most recently used.
    order: Vec<String>,
    max_size: usize,
}

impl EmbeddingCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::with_capacity(max_size),
                order: Vec::with_capacity(max_size),
                max_size: max_size.max(1),
            }),
        }
    }

    /// Cached embedding for `text`, marking it most recently used.
    pub fn get(&self, text: &str) -> Option<Array1<f32>> {
        let mut inner = self.inner.lock();
        let embedding = inner.entries.get(text)?.clone();
        if let Some(pos) = inner.order.iter().position(|k| k == text) {
            let key = inner.order.remove(pos);
            inner.order.push(key);
        }
        Some(embedding)
    }

    /// Insert or refresh an entry, evicting the least recently used at capacity.
    pub fn put(&self, text: String, embedding: Array1<f32>) {
        let mut inner = self.inner.lock();

        if inner.entries.insert(text.clone(), embedding).is_some() {
            inner.order.retain(|k| k != &text);
            inner.order.push(text);
            return;
        }

        inner.order.push(text);
        while inner.entries.len() > inner.max_size && !inner.order.is_empty() {
            let oldest = inner.order.remove(0);
            inner.entries.remove(&oldest);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Wraps any backend with an [`EmbeddingCache`].
pub struct CachedEmbedder<E> {
    backend: E,
    cache: EmbeddingCache,
}

impl<E: EmbedderBackend> CachedEmbedder<E> {
    pub fn new(backend: E, capacity: usize) -> Self {
        Self {
            backend,
            cache: EmbeddingCache::new(capacity),
        }
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}

impl<E: EmbedderBackend> EmbedderBackend for CachedEmbedder<E> {
    fn embed(&self, text: &str) -> Option<EmbeddingResult> {
        if let Some(cached) = self.cache.get(text) {
            return Some(EmbeddingResult {
                embedding: cached,
                cached: true,
            });
        }

        let result = self.backend.embed(text)?;
        self.cache.put(text.to_string(), result.embedding.clone());
        Some(result)
    }

    fn dimension(&self) -> usize {
        self.backend.dimension()
    }

    fn is_available(&self) -> bool {
        self.backend.is_available()
    }
}
