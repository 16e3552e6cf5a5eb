//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and access
//! metadata.

use serde::{Deserialize, Serialize};

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
///
/// Timestamps are Unix milliseconds so entries survive a snapshot round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// Key the entry is stored under
    pub key: String,
    /// The stored value
    pub value: V,
    /// Creation timestamp
    pub created_at: u64,
    /// Expiration timestamp
    pub expires_at: u64,
    /// Number of successful reads
    pub access_count: u64,
    /// Timestamp of the most recent read, or of creation/refresh
    pub last_accessed_at: u64,
    /// Store-wide access sequence, breaks ties between equal timestamps
    pub access_seq: u64,
    /// Length of the value's JSON encoding
    pub estimated_size: usize,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry expiring `ttl_ms` after `now`.
    pub fn new(
        key: String,
        value: V,
        now: u64,
        ttl_ms: u64,
        access_seq: u64,
        estimated_size: usize,
    ) -> Self {
        Self {
            key,
            value,
            created_at: now,
            expires_at: now.saturating_add(ttl_ms),
            access_count: 0,
            last_accessed_at: now,
            access_seq,
            estimated_size,
        }
    }

    // == Is Expired ==
    /// An entry is expired once `now` reaches `expires_at`, so a zero TTL
    /// is stale from the next read onward.
    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    // == Record Access ==
    /// Marks a successful read.
    pub fn record_access(&mut self, now: u64, access_seq: u64) {
        self.access_count += 1;
        self.last_accessed_at = now;
        self.access_seq = access_seq;
    }

    // == Refresh ==
    /// Pushes expiration out to `now + ttl_ms` and marks the entry recently
    /// used. Value and access count are untouched.
    pub fn refresh(&mut self, now: u64, ttl_ms: u64, access_seq: u64) {
        self.expires_at = now.saturating_add(ttl_ms);
        self.last_accessed_at = now;
        self.access_seq = access_seq;
    }

    /// Returns remaining TTL in milliseconds, 0 once expired.
    pub fn ttl_remaining_ms(&self) -> u64 {
        self.expires_at.saturating_sub(current_timestamp_ms())
    }
}

// == Entry Info ==
/// Read-only view of an entry's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    pub key: String,
    pub created_at: u64,
    pub expires_at: u64,
    pub access_count: u64,
    pub last_accessed_at: u64,
    pub estimated_size: usize,
    /// Milliseconds left until expiry when the view was taken
    pub ttl_remaining_ms: u64,
}

impl<V> From<&CacheEntry<V>> for EntryInfo {
    fn from(entry: &CacheEntry<V>) -> Self {
        Self {
            key: entry.key.clone(),
            created_at: entry.created_at,
            expires_at: entry.expires_at,
            access_count: entry.access_count,
            last_accessed_at: entry.last_accessed_at,
            estimated_size: entry.estimated_size,
            ttl_remaining_ms: entry.ttl_remaining_ms(),
        }
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
