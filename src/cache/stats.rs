//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, evictions and
//! aggregate entry size.

use serde::Serialize;

// == Cache Stats ==
/// Snapshot of an instance's counters.
///
/// `hits`, `misses`, `evictions` and `expirations` are cumulative and
/// survive `clear`. `total_items` and `total_size` describe the store as it
/// is now.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// hits / (hits + misses), 0 when nothing was read yet
    pub hit_rate: f64,
    /// Current number of entries, including not-yet-swept expired ones
    pub total_items: usize,
    /// Sum of estimated entry sizes in bytes
    pub total_size: usize,
    /// Number of entries evicted due to LRU policy
    pub evictions: u64,
    /// Entries removed because their TTL elapsed
    pub expirations: u64,
    /// Snapshot loads or writes that failed
    pub persistence_failures: u64,
    /// Pending snapshots discarded because the backlog was full
    pub dropped_writes: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Hit ==
    pub fn record_hit(&mut self) {
        self.hits += 1;
        self.update_hit_rate();
    }

    // == Record Miss ==
    pub fn record_miss(&mut self) {
        self.misses += 1;
        self.update_hit_rate();
    }

    // == Record Eviction ==
    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    // == Record Expiration ==
    pub fn record_expirations(&mut self, count: usize) {
        self.expirations += count as u64;
    }

    // == Update Totals ==
    /// Updates the item count and aggregate size.
    pub fn set_totals(&mut self, items: usize, size: usize) {
        self.total_items = items;
        self.total_size = size;
    }

    fn update_hit_rate(&mut self) {
        let total = self.hits + self.misses;
        self.hit_rate = if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        };
    }
}
