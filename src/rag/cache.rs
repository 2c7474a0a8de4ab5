//! Embedding Cache for the RAG Pipeline
//!
//! Questions repeat, and re-ingesting a file re-embeds the same sentences.
//! [`CachedEmbedder`] wraps any [`Embedder`] with an in-memory LRU so those
//! vectors are computed once.
//!
//! # Cache Key Strategy
//!
//! Keys are SHA-256 hashes of `text|model`, so a vector computed by one model
//! is never returned for another.
//!
//! # Example
//!
//! ```ignore
//! use foodatlas::rag::cache::CachedEmbedder;
//!
//! let embedder = CachedEmbedder::new(openai_embedder, 10_000);
//! let v1 = embedder.embed("qual o ticket médio?").await?; // API call
//! let v2 = embedder.embed("qual o ticket médio?").await?; // cache hit
//! ```

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::llm::Embedder;
use crate::types::Result;

/// Statistics for cache performance monitoring
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of entries in cache
    pub entry_count: usize,
    /// Number of evictions due to capacity
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Compute the cache key for the given text and model
pub fn compute_key(text: &str, model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(b"|");
    hasher.update(model.as_bytes());
    hex::encode(hasher.finalize())
}

/// LRU-cached embedder
pub struct CachedEmbedder<E> {
    inner: E,
    cache: Mutex<LruCache<String, Vec<f32>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<E: Embedder> CachedEmbedder<E> {
    /// Wrap `inner` with a cache holding up to `capacity` vectors (minimum 1).
    pub fn new(inner: E, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.cache.lock().len(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Clear all entries from the cache
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    fn store(&self, key: String, embedding: Vec<f32>) {
        let mut cache = self.cache.lock();
        let at_capacity = cache.len() == cache.cap().get() && !cache.contains(&key);
        cache.put(key, embedding);
        if at_capacity {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl<E: Embedder> Embedder for CachedEmbedder<E> {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.inner.model_name().to_string();
        let keys: Vec<String> = texts.iter().map(|t| compute_key(t, &model)).collect();

        let mut results: Vec<Option<Vec<f32>>> = {
            let mut cache = self.cache.lock();
            keys.iter().map(|k| cache.get(k).cloned()).collect()
        };

        // Deduplicate misses so a repeated sentence is embedded once
        let mut miss_texts: Vec<String> = Vec::new();
        let mut miss_keys: Vec<String> = Vec::new();
        for (i, slot) in results.iter().enumerate() {
            if slot.is_none() && !miss_keys.contains(&keys[i]) {
                miss_keys.push(keys[i].clone());
                miss_texts.push(texts[i].clone());
            }
        }

        let hit_count = results.iter().filter(|r| r.is_some()).count() as u64;
        self.hits.fetch_add(hit_count, Ordering::Relaxed);
        self.misses
            .fetch_add((texts.len() as u64) - hit_count, Ordering::Relaxed);

        if !miss_texts.is_empty() {
            let computed = self.inner.embed_batch(&miss_texts).await?;
            for (key, embedding) in miss_keys.iter().zip(computed) {
                for (i, k) in keys.iter().enumerate() {
                    if k == key && results[i].is_none() {
                        results[i] = Some(embedding.clone());
                    }
                }
                self.store(key.clone(), embedding);
            }
        }

        results
            .into_iter()
            .map(|r| {
                r.ok_or_else(|| {
                    crate::types::AppError::LLM("Embedder returned too few vectors".to_string())
                })
            })
            .collect()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    /// Embeds text as `[len, calls]` and records the inputs it saw.
    struct CountingEmbedder {
        model: String,
        calls: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl CountingEmbedder {
        fn new(model: &str) -> Self {
            Self {
                model: model.to_string(),
                calls: Arc::new(AtomicUsize::new(0)),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().extend(texts.iter().cloned());
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn model_name(&self) -> &str {
            &self.model
        }
    }

    #[test]
    fn test_key_depends_on_model() {
        let a = compute_key("hello", "model-a");
        let b = compute_key("hello", "model-b");
        assert_ne!(a, b);
        assert_eq!(a, compute_key("hello", "model-a"));
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_second_embed_is_a_hit() {
        let embedder = CachedEmbedder::new(CountingEmbedder::new("m"), 10);

        let first = embedder.embed("abc").await.expect("embed");
        let second = embedder.embed("abc").await.expect("embed");

        assert_eq!(first, second);
        assert_eq!(embedder.inner().calls.load(Ordering::SeqCst), 1);
        let stats = embedder.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 50.0);
    }

    #[tokio::test]
    async fn test_batch_embeds_only_misses_in_order() {
        let embedder = CachedEmbedder::new(CountingEmbedder::new("m"), 10);
        embedder.embed("bb").await.expect("warm");

        let texts = vec!["a".to_string(), "bb".to_string(), "ccc".to_string(), "a".to_string()];
        let vectors = embedder.embed_batch(&texts).await.expect("batch");

        assert_eq!(
            vectors,
            vec![vec![1.0, 1.0], vec![2.0, 1.0], vec![3.0, 1.0], vec![1.0, 1.0]]
        );
        let seen = embedder.inner().seen.lock().clone();
        assert_eq!(seen, vec!["bb", "a", "ccc"]);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recent() {
        let embedder = CachedEmbedder::new(CountingEmbedder::new("m"), 2);
        embedder.embed("a").await.expect("embed");
        embedder.embed("b").await.expect("embed");
        embedder.embed("c").await.expect("embed");

        let stats = embedder.stats();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.evictions, 1);

        // "a" was evicted and must be recomputed
        embedder.embed("a").await.expect("embed");
        assert_eq!(embedder.inner().calls.load(Ordering::SeqCst), 4);
    }
}
