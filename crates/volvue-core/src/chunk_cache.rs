//! Bounded LRU cache of decoded chunks
//!
//! Keyed by `(array identity, chunk coordinate, time index)`. Payloads are
//! refcounted `Bytes`, so a cache hit is a pointer clone. The cache is
//! shared between the loaders and the display-statistics path so a chunk
//! decoded for either is reused by the other. Eviction happens on insert
//! when over capacity; there is no TTL.

use crate::ElementType;
use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of one decoded chunk
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    /// Array identity (the level's dataset path)
    pub array: Arc<str>,
    /// Chunk coordinate `[z, y, x]`, counted in chunks
    pub coord: [u64; 3],
    /// Time index
    pub time: u64,
}

/// Decoded chunk elements plus their spatial shape and element type
///
/// `data` holds `shape[0] * shape[1] * shape[2] * components` elements,
/// component-interleaved in z,y,x order. Edge chunks carry their clamped
/// shape, not the nominal chunk shape.
#[derive(Debug, Clone)]
pub struct CachedChunk {
    pub data: Bytes,
    pub shape: [u64; 3],
    pub dtype: ElementType,
}

/// Default capacity in chunks
pub const DEFAULT_CACHE_ENTRIES: usize = 200;

pub struct ChunkCache {
    inner: Mutex<LruCache<ChunkKey, CachedChunk>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ChunkCache {
    pub fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries.max(1)).unwrap();
        Self {
            inner: Mutex::new(LruCache::new(cap)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a chunk, refreshing its recency
    pub fn get(&self, key: &ChunkKey) -> Option<CachedChunk> {
        // LruCache::get needs &mut self to update recency ordering
        let mut cache = self.inner.lock();
        match cache.get(key) {
            Some(chunk) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(chunk.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a chunk, evicting the least recently used when full
    pub fn put(&self, key: ChunkKey, chunk: CachedChunk) {
        let mut cache = self.inner.lock();
        cache.put(key, chunk);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().cap().get()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let cache = self.inner.lock();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            entries: cache.len(),
            capacity: cache.cap().get(),
            hits,
            misses,
        }
    }
}

impl std::fmt::Debug for ChunkCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("ChunkCache")
            .field("entries", &stats.entries)
            .field("capacity", &stats.capacity)
            .finish()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}
