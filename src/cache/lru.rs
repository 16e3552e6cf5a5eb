//! LRU Eviction Module
//!
//! Picks batches of least recently accessed entries for removal once a store
//! reaches capacity.

use std::collections::HashMap;

use crate::cache::CacheEntry;
use crate::config::DEFAULT_EVICTION_FRACTION;

// == LRU Eviction ==
/// Batch LRU policy ordered by `(last_accessed_at, access_seq)`.
///
/// Each eviction removes `ceil(max_size * fraction)` entries, at least one,
/// so a full cache does not evict on every insertion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LruEviction {
    fraction: f64,
}

impl Default for LruEviction {
    fn default() -> Self {
        Self::new(DEFAULT_EVICTION_FRACTION)
    }
}

impl LruEviction {
    pub fn new(fraction: f64) -> Self {
        Self { fraction }
    }

    // == Batch Size ==
    /// Number of entries to remove when a store of `max_size` is full.
    pub fn batch_size(&self, max_size: usize) -> usize {
        // Epsilon keeps float noise such as 0.3 * 10 from rounding up a whole entry
        let batch = (max_size as f64 * self.fraction - 1e-9).ceil() as usize;
        batch.max(1)
    }

    // == Select Victims ==
    /// Returns up to `count` keys, least recently accessed first.
    pub fn select_victims<V>(
        &self,
        entries: &HashMap<String, CacheEntry<V>>,
        count: usize,
    ) -> Vec<String> {
        if count == 0 || entries.is_empty() {
            return Vec::new();
        }

        let mut candidates: Vec<&CacheEntry<V>> = entries.values().collect();
        candidates.sort_unstable_by_key(|entry| (entry.last_accessed_at, entry.access_seq));

        candidates
            .into_iter()
            .take(count)
            .map(|entry| entry.key.clone())
            .collect()
    }
}
