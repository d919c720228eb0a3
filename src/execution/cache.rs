//! Result caching for asynchronous computes.
//!
//! Background computes are pure, so their outputs can be memoized by
//! variant, parameters and input values. A hit skips the worker pool.

use crate::core::types::{Parameters, Value};
use indexmap::IndexMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cache key combining the variant with a fingerprint of its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Variant identifier.
    pub variant: String,
    /// Hash of parameters and inputs.
    pub fingerprint: u64,
}

impl CacheKey {
    /// Create a new cache key.
    pub fn new(variant: &str, parameters: &Parameters, inputs: &IndexMap<String, Value>) -> Self {
        let mut hasher = DefaultHasher::new();
        parameters.fingerprint(&mut hasher);

        // Sort keys for deterministic hashing
        let mut sorted: Vec<_> = inputs.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        sorted.len().hash(&mut hasher);
        for (name, value) in sorted {
            name.hash(&mut hasher);
            value.fingerprint(&mut hasher);
        }

        Self {
            variant: variant.to_string(),
            fingerprint: hasher.finish(),
        }
    }
}

/// Cached entry with metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached outputs by source port name.
    pub outputs: IndexMap<String, Value>,
    /// When the entry was created.
    pub created_at: Instant,
    /// How long the original computation took.
    pub computation_time: Duration,
    /// Approximate memory size in bytes.
    pub memory_size: usize,
}

impl CacheEntry {
    /// Create a new cache entry.
    pub fn new(outputs: IndexMap<String, Value>, computation_time: Duration) -> Self {
        let memory_size = outputs.iter().map(|(k, v)| k.len() + estimate_value_size(v)).sum();
        Self {
            outputs,
            created_at: Instant::now(),
            computation_time,
            memory_size,
        }
    }

    /// Check if the entry has expired.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Estimate memory size of a single value.
fn estimate_value_size(value: &Value) -> usize {
    match value {
        Value::Image(img) => {
            std::mem::size_of_val(img) + img.width() as usize * img.height() as usize * 4
        }
        Value::Number(_) | Value::Color(_) => std::mem::size_of::<Value>(),
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries evicted.
    pub evictions: u64,
    /// Total compute time saved by cache hits.
    pub time_saved: Duration,
}

impl CacheStats {
    /// Calculate hit ratio.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// Thread-safe LRU result cache.
pub struct ResultCache {
    cache: Mutex<LruCache<CacheKey, CacheEntry>>,
    /// Maximum memory usage in bytes.
    max_memory: usize,
    current_memory: Mutex<usize>,
    /// Time-to-live for entries.
    ttl: Duration,
    stats: Mutex<CacheStats>,
}

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

impl ResultCache {
    /// Create a new cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(DEFAULT_CAPACITY),
            )),
            max_memory: 512 * 1024 * 1024, // 512 MB default
            current_memory: Mutex::new(0),
            ttl: Duration::from_secs(3600),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Set the memory limit in megabytes.
    pub fn with_memory_limit(mut self, max_memory_mb: usize) -> Self {
        self.max_memory = max_memory_mb.saturating_mul(1024 * 1024);
        self
    }

    /// Set the TTL for cache entries.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Get a cached result.
    pub fn get(&self, key: &CacheKey) -> Option<IndexMap<String, Value>> {
        let mut cache = self.cache.lock();
        let mut stats = self.stats.lock();

        let expired = cache.peek(key).map(|entry| entry.is_expired(self.ttl));
        if expired == Some(true) {
            if let Some(entry) = cache.pop(key) {
                let mut current = self.current_memory.lock();
                *current = current.saturating_sub(entry.memory_size);
            }
        }

        match cache.get(key) {
            Some(entry) => {
                stats.hits += 1;
                stats.time_saved += entry.computation_time;
                Some(entry.outputs.clone())
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    /// Store a result in the cache.
    pub fn put(&self, key: CacheKey, outputs: IndexMap<String, Value>, computation_time: Duration) {
        let entry = CacheEntry::new(outputs, computation_time);
        let entry_size = entry.memory_size;

        let mut cache = self.cache.lock();
        let mut current = self.current_memory.lock();

        if let Some(replaced) = cache.pop(&key) {
            *current = current.saturating_sub(replaced.memory_size);
        }

        // Evict entries if needed to stay under memory limit
        while *current + entry_size > self.max_memory {
            match cache.pop_lru() {
                Some((_, evicted)) => {
                    *current = current.saturating_sub(evicted.memory_size);
                    self.stats.lock().evictions += 1;
                }
                None => break,
            }
        }

        if let Some((_, evicted)) = cache.push(key, entry) {
            *current = current.saturating_sub(evicted.memory_size);
            self.stats.lock().evictions += 1;
        }
        *current += entry_size;
    }

    /// Clear the entire cache.
    pub fn clear(&self) {
        self.cache.lock().clear();
        *self.current_memory.lock() = 0;
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    /// Get current memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        *self.current_memory.lock()
    }

    /// Get number of cached entries.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY.get())
    }
}

/// A shared cache wrapped in Arc.
pub type SharedCache = Arc<ResultCache>;
