//! Configuration Module
//!
//! Per-instance cache configuration and process-wide registry settings
//! loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CacheError, Result};

// == Defaults ==
/// Default interval between background expiration sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default share of `max_size` removed in one eviction batch
pub const DEFAULT_EVICTION_FRACTION: f64 = 0.10;

/// Default timeout for a single snapshot write
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default cap on snapshots waiting to be written
pub const DEFAULT_MAX_PENDING_WRITES: usize = 4;

// == Cache Config ==
/// Configuration of one cache instance. Immutable once the instance is open.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Persistence key and invalidation namespace
    pub namespace: String,
    /// TTL applied to entries set without one
    pub default_ttl: Duration,
    /// Entry count at which inserting a new key triggers eviction
    pub max_size: usize,
    /// Load from and write back to the durable medium
    pub persistent: bool,
    /// Interval between background expiration sweeps
    pub sweep_interval: Duration,
    /// Share of `max_size` evicted per batch
    pub eviction_fraction: f64,
}

impl CacheConfig {
    /// Creates a config with a five minute TTL, room for 100 entries and
    /// persistence disabled.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            default_ttl: Duration::from_secs(300),
            max_size: 100,
            persistent: false,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            eviction_fraction: DEFAULT_EVICTION_FRACTION,
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_eviction_fraction(mut self, fraction: f64) -> Self {
        self.eviction_fraction = fraction;
        self
    }

    // == Validate ==
    /// Rejects configurations the cache cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(CacheError::InvalidConfig(
                "namespace must not be empty".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(CacheError::InvalidConfig(format!(
                "sweep interval must be positive for namespace '{}'",
                self.namespace
            )));
        }
        if !(self.eviction_fraction > 0.0 && self.eviction_fraction <= 1.0) {
            return Err(CacheError::InvalidConfig(format!(
                "eviction fraction {} is outside (0, 1]",
                self.eviction_fraction
            )));
        }
        Ok(())
    }

    // == Standard Presets ==
    /// Long-lived, general purpose instance. Persistent.
    pub fn general() -> Self {
        Self::new("general")
            .with_default_ttl(Duration::from_secs(60 * 60))
            .with_max_size(500)
            .with_persistent(true)
    }

    /// Per-user data such as profiles and family membership.
    pub fn user() -> Self {
        Self::new("user")
            .with_default_ttl(Duration::from_secs(15 * 60))
            .with_max_size(200)
    }

    /// Results of calls to the remote data backend.
    pub fn api() -> Self {
        Self::new("api")
            .with_default_ttl(Duration::from_secs(5 * 60))
            .with_max_size(100)
    }
}

// == Registry Config ==
/// Process-wide settings shared by every instance of a registry.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Directory holding one snapshot file per namespace; None disables
    /// the durable medium
    pub persist_dir: Option<PathBuf>,
    /// Sweep interval applied to the standard instances
    pub sweep_interval: Duration,
    /// Timeout for a single snapshot write
    pub write_timeout: Duration,
    /// Cap on snapshots waiting to be written per instance
    pub max_pending_writes: usize,
}

impl RegistryConfig {
    /// Creates a new RegistryConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_PERSIST_DIR` - Snapshot directory (default: unset, no persistence)
    /// - `CACHE_SWEEP_INTERVAL` - Sweep interval in seconds (default: 60)
    /// - `CACHE_WRITE_TIMEOUT_MS` - Snapshot write timeout in ms (default: 2000)
    /// - `CACHE_MAX_PENDING_WRITES` - Snapshot backlog cap (default: 4)
    pub fn from_env() -> Self {
        Self {
            persist_dir: env::var("CACHE_PERSIST_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            sweep_interval: env::var("CACHE_SWEEP_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SWEEP_INTERVAL),
            write_timeout: env::var("CACHE_WRITE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_WRITE_TIMEOUT),
            max_pending_writes: env::var("CACHE_MAX_PENDING_WRITES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(DEFAULT_MAX_PENDING_WRITES),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            persist_dir: None,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_pending_writes: DEFAULT_MAX_PENDING_WRITES,
        }
    }
}
