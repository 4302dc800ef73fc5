//! Insertion-only cache of decoded chunks for one (level, variable).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use metrics::counter;

use crate::types::{CacheStats, Chunk};

/// Map from chunk key to decoded chunk.
///
/// Entries are never evicted. The whole cache is dropped when the dataset
/// or the selected variable changes.
#[derive(Debug, Default)]
pub struct ChunkCache {
    entries: HashMap<String, Arc<Chunk>>,
    memory_bytes: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ChunkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a chunk, recording a hit or a miss.
    pub fn get(&self, key: &str) -> Option<Arc<Chunk>> {
        match self.entries.get(key) {
            Some(chunk) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                counter!("chunk_cache_hits_total").increment(1);
                Some(Arc::clone(chunk))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                counter!("chunk_cache_misses_total").increment(1);
                None
            }
        }
    }

    /// Check if a key is resident without touching the statistics.
    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Look up a chunk without touching the statistics.
    pub fn peek(&self, key: &str) -> Option<Arc<Chunk>> {
        self.entries.get(key).cloned()
    }

    /// Insert a decoded chunk. A second insert for the same key replaces
    /// the first; decoding is deterministic per key so both are equal.
    pub fn put(&mut self, key: impl Into<String>, chunk: Arc<Chunk>) {
        let size = chunk.size_bytes() as u64;
        if let Some(previous) = self.entries.insert(key.into(), chunk) {
            self.memory_bytes = self.memory_bytes.saturating_sub(previous.size_bytes() as u64);
        }
        self.memory_bytes += size;
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
            memory_bytes: self.memory_bytes,
        }
    }

    /// Resident keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
