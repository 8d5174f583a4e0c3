use std::num::NonZeroUsize;

use lru::LruCache;

use crate::search::results::SearchResult;

/// Bounded LRU cache of full ranked result sets, keyed by query signature.
///
/// A hit costs zero file I/O and zero scoring. The cache is cleared
/// wholesale on any mutation so a stale ranking is never served.
pub struct ReadCache {
    cache: LruCache<String, Vec<SearchResult>>,
    hits: u64,
    misses: u64,
}

impl ReadCache {
    pub fn new(max_entries: usize) -> Self {
        ReadCache {
            cache: LruCache::new(NonZeroUsize::new(max_entries.max(1)).unwrap()),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<Vec<SearchResult>> {
        match self.cache.get(key) {
            Some(results) => {
                self.hits += 1;
                Some(results.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, key: String, results: Vec<SearchResult>) {
        self.cache.put(key, results);
    }

    /// Called by every mutating operation before it returns.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}
