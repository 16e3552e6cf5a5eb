//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with batch LRU eviction and
//! TTL expiration. Not synchronized; `Cache` wraps it in a lock.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{CacheEntry, CacheStats, EntryInfo, KeyPattern, LruEviction, MAX_KEY_LENGTH};
use crate::error::{CacheError, Result};

// == Cache Store ==
/// Main cache storage with LRU eviction and TTL support.
#[derive(Debug)]
pub struct CacheStore<V> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V>>,
    /// Eviction batch policy
    lru: LruEviction,
    /// Performance statistics
    stats: CacheStats,
    /// Entry count at which a new key triggers eviction
    max_size: usize,
    /// TTL for entries without explicit TTL
    default_ttl: Duration,
    /// Next access sequence number
    next_seq: u64,
    /// Sum of estimated entry sizes
    total_size: usize,
}

impl<V: Clone + Serialize> CacheStore<V> {
    // == Constructor ==
    /// Creates a new CacheStore with specified capacity and default TTL.
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self::with_eviction(max_size, default_ttl, LruEviction::default())
    }

    pub fn with_eviction(max_size: usize, default_ttl: Duration, lru: LruEviction) -> Self {
        Self {
            entries: HashMap::new(),
            lru,
            stats: CacheStats::new(),
            max_size,
            default_ttl,
            next_seq: 0,
            total_size: 0,
        }
    }

    // == Set ==
    /// Stores a value with optional TTL, replacing any existing entry and
    /// its metadata.
    ///
    /// Inserting a new key into a full store first drops expired entries,
    /// then evicts a batch of the least recently accessed ones.
    pub fn set(&mut self, key: String, value: V, ttl: Option<Duration>) -> Result<()> {
        validate_key(&key)?;
        let ttl_ms = ttl_millis(ttl.unwrap_or(self.default_ttl))?;

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            self.make_room();
        }

        let now = current_timestamp_ms();
        let seq = self.bump_seq();
        let estimated_size = estimate_size(&value);
        let entry = CacheEntry::new(key.clone(), value, now, ttl_ms, seq, estimated_size);

        if let Some(old) = self.entries.insert(key, entry) {
            self.total_size -= old.estimated_size;
        }
        self.total_size += estimated_size;
        self.sync_totals();

        Ok(())
    }

    // == Get ==
    /// Returns a copy of the value if present and fresh.
    ///
    /// Expired entries are removed and counted as misses.
    pub fn get(&mut self, key: &str) -> Option<V> {
        if self.remove_if_expired(key) {
            self.stats.record_miss();
            return None;
        }

        let seq = self.next_seq;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.record_access(current_timestamp_ms(), seq);
                let value = entry.value.clone();
                self.next_seq += 1;
                self.stats.record_hit();
                Some(value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Has ==
    /// Freshness check that leaves access metadata and hit/miss counters
    /// alone.
    pub fn has(&mut self, key: &str) -> bool {
        if self.remove_if_expired(key) {
            return false;
        }
        self.entries.contains_key(key)
    }

    // == Delete ==
    /// Removes an entry by key. Returns whether anything was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        let removed = self.remove_entry(key).is_some();
        if removed {
            self.sync_totals();
        }
        removed
    }

    // == Refresh ==
    /// Restarts the TTL of a fresh entry without touching its value.
    ///
    /// Returns `Ok(false)` for absent or already expired keys.
    pub fn refresh(&mut self, key: &str, ttl: Option<Duration>) -> Result<bool> {
        validate_key(key)?;
        let ttl_ms = ttl_millis(ttl.unwrap_or(self.default_ttl))?;

        if self.remove_if_expired(key) {
            return Ok(false);
        }

        let seq = self.next_seq;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.refresh(current_timestamp_ms(), ttl_ms, seq);
                self.next_seq += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // == Entry Info ==
    /// Metadata for a fresh entry, without recording an access.
    pub fn entry_info(&self, key: &str) -> Option<EntryInfo> {
        let now = current_timestamp_ms();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(EntryInfo::from)
    }

    // == Keys ==
    /// Keys of all fresh entries, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        let now = current_timestamp_ms();
        self.entries
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.key.clone())
            .collect()
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = current_timestamp_ms();
        let count = self.remove_where(|entry| entry.is_expired_at(now));
        self.stats.record_expirations(count);
        count
    }

    // == Invalidate ==
    /// Removes every entry whose key matches `pattern`.
    pub fn invalidate_pattern(&mut self, pattern: &KeyPattern) -> usize {
        self.invalidate_where(|key| pattern.matches(key))
    }

    /// Removes every entry whose key satisfies `predicate`.
    pub fn invalidate_where<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        self.remove_where(|entry| predicate(&entry.key))
    }

    // == Clear ==
    /// Removes every entry. Hit, miss and eviction counters are kept.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.total_size = 0;
        self.sync_totals();
        count
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }

    // == Length ==
    /// Returns the current number of entries, expired ones included until
    /// they are swept or read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Snapshot ==
    /// Copies every entry for persistence.
    pub fn snapshot_entries(&self) -> Vec<CacheEntry<V>> {
        self.entries.values().cloned().collect()
    }

    // == Restore ==
    /// Loads entries from a snapshot, dropping expired or invalid ones and
    /// keeping the most recently accessed when over capacity.
    ///
    /// Returns the number of entries restored.
    pub fn restore(&mut self, mut entries: Vec<CacheEntry<V>>) -> usize {
        let now = current_timestamp_ms();
        entries.retain(|entry| !entry.is_expired_at(now) && validate_key(&entry.key).is_ok());
        entries.sort_unstable_by_key(|entry| {
            std::cmp::Reverse((entry.last_accessed_at, entry.access_seq))
        });
        entries.truncate(self.max_size.max(1));

        let mut restored = 0;
        for entry in entries {
            self.next_seq = self.next_seq.max(entry.access_seq.saturating_add(1));
            if !self.entries.contains_key(&entry.key) {
                self.total_size += entry.estimated_size;
                self.entries.insert(entry.key.clone(), entry);
                restored += 1;
            }
        }
        self.sync_totals();
        restored
    }

    // == Internal Helpers ==
    fn make_room(&mut self) {
        let expired = self.cleanup_expired();
        if expired > 0 {
            debug!(count = expired, "Dropped expired entries before eviction");
        }
        if self.entries.len() < self.max_size {
            return;
        }

        let batch = self.lru.batch_size(self.max_size);
        let victims = self.lru.select_victims(&self.entries, batch);
        for key in &victims {
            if self.remove_entry(key).is_some() {
                self.stats.record_eviction();
            }
        }
        self.sync_totals();
        debug!(count = victims.len(), "Evicted least recently used entries");
    }

    fn remove_if_expired(&mut self, key: &str) -> bool {
        let expired = self
            .entries
            .get(key)
            .map(|entry| entry.is_expired())
            .unwrap_or(false);
        if expired {
            self.remove_entry(key);
            self.stats.record_expirations(1);
            self.sync_totals();
        }
        expired
    }

    fn remove_where<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&CacheEntry<V>) -> bool,
    {
        let before = self.entries.len();
        let mut freed = 0;
        self.entries.retain(|_, entry| {
            let remove = predicate(entry);
            if remove {
                freed += entry.estimated_size;
            }
            !remove
        });
        self.total_size -= freed;
        self.sync_totals();
        before - self.entries.len()
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.total_size -= entry.estimated_size;
        Some(entry)
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn sync_totals(&mut self) {
        self.stats.set_totals(self.entries.len(), self.total_size);
    }
}

// == Validation ==
/// Rejects empty keys and keys longer than `MAX_KEY_LENGTH` bytes.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key must not be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

/// Converts a TTL to whole milliseconds, rounding any sub-millisecond
/// remainder up. Deadlines are checked against the wall clock at millisecond
/// resolution, so an entry can still read as absent less than 1 ms early.
fn ttl_millis(ttl: Duration) -> Result<u64> {
    let millis = ttl.as_millis() + u128::from(ttl.subsec_nanos() % 1_000_000 != 0);
    u64::try_from(millis)
        .map_err(|_| CacheError::InvalidTtl(format!("{:?} does not fit in milliseconds", ttl)))
}

fn estimate_size<V: Serialize>(value: &V) -> usize {
    serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
}
