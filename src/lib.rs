//! Family Cache - in-process cache layer for a family-social backend
//!
//! Named cache instances with per-entry TTL expiration, batch LRU eviction,
//! usage statistics, pattern invalidation and optional snapshot persistence.

pub mod cache;
pub mod config;
pub mod error;
pub mod persistence;
pub mod registry;
pub mod tasks;

pub use cache::{Cache, CacheStats, CacheValue, KeyPattern};
pub use config::{CacheConfig, RegistryConfig};
pub use error::{CacheError, Result};
pub use persistence::{FileSnapshotBackend, MemorySnapshotBackend, PersistenceOptions, SnapshotBackend};
pub use registry::{global, init_global, CacheRegistry};
