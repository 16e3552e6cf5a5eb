//! Cache Module
//!
//! Provides in-memory caching with TTL expiration, batch LRU eviction and
//! optional snapshot persistence.

mod entry;
mod instance;
mod lru;
mod pattern;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry, EntryInfo};
pub use instance::{Cache, CacheValue};
pub use lru::LruEviction;
pub use pattern::KeyPattern;
pub use stats::CacheStats;
pub use store::{validate_key, CacheStore};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
