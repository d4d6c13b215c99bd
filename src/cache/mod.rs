//! Kernel row cache
//!
//! The solver needs whole kernel rows K(i, ·) for the two variables it updates
//! on every iteration. Rows are cached under an LRU policy keyed by sample
//! index, so frequently selected samples are computed once.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Shared, immutable kernel row
pub type KernelRow = Arc<Vec<f64>>;

/// LRU cache for kernel matrix rows
pub struct KernelCache {
    cache: LruCache<usize, KernelRow>,
    hits: u64,
    misses: u64,
}

impl KernelCache {
    /// Create a new kernel cache holding at most `capacity` rows
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(2)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Create a kernel cache sized from a memory budget in bytes
    ///
    /// Each row holds `row_len` f64 values. At least two rows are always kept,
    /// since the solver works on pairs.
    pub fn with_memory_limit(memory_bytes: usize, row_len: usize) -> Self {
        let row_bytes = (row_len.max(1)) * std::mem::size_of::<f64>();
        Self::new(memory_bytes / row_bytes)
    }

    /// Get a cached row
    pub fn get(&mut self, i: usize) -> Option<KernelRow> {
        if let Some(row) = self.cache.get(&i) {
            self.hits += 1;
            Some(Arc::clone(row))
        } else {
            self.misses += 1;
            None
        }
    }

    /// Store a row
    pub fn put(&mut self, i: usize, row: Vec<f64>) -> KernelRow {
        let row = Arc::new(row);
        self.cache.put(i, Arc::clone(&row));
        row
    }

    /// Return the cached row for `i`, computing it with `compute` on a miss
    pub fn get_or_compute<F>(&mut self, i: usize, compute: F) -> KernelRow
    where
        F: FnOnce() -> Vec<f64>,
    {
        match self.get(i) {
            Some(row) => row,
            None => self.put(i, compute()),
        }
    }

    /// Get cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            capacity: self.cache.cap().get(),
            size: self.cache.len(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub capacity: usize,
    pub size: usize,
}
