//! Cache Instance Module
//!
//! Public cache handle: one store behind a lock, its sweep task and its
//! optional snapshot writer, under a single configuration.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStats, CacheStore, EntryInfo, KeyPattern, LruEviction};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::persistence::{load_snapshot, PersistenceOptions, SnapshotWriter};
use crate::tasks::spawn_sweep_task;

/// Values a cache can hold. Values are handed out as clones and must
/// serialize for size estimation and snapshots.
pub trait CacheValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

// == Cache ==
/// Handle to one named cache instance. Clones share the same instance.
///
/// Every operation that touches entries takes the store's write lock,
/// `get` included, since reads update access metadata. Snapshots for
/// persistence are captured and numbered under the lock, then encoded and
/// queued after it is released.
#[derive(Debug)]
pub struct Cache<V> {
    inner: Arc<CacheInner<V>>,
}

#[derive(Debug)]
struct CacheInner<V> {
    config: CacheConfig,
    store: Arc<RwLock<CacheStore<V>>>,
    writer: Option<Arc<SnapshotWriter>>,
    sweep: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Drop for CacheInner<V> {
    fn drop(&mut self) {
        if let Some(sweep) = self.sweep.get_mut().take() {
            sweep.abort();
        }
        if let Some(writer) = &self.writer {
            writer.shutdown();
        }
    }
}

impl<V: CacheValue> Cache<V> {
    // == Open ==
    /// Opens an instance and starts its sweep task. Must run inside a tokio
    /// runtime.
    ///
    /// With `config.persistent` set and a durable medium given, the stored
    /// snapshot is restored first. A missing, unreadable or corrupt snapshot
    /// leaves the cache empty; only an invalid configuration is an error.
    pub async fn open(config: CacheConfig, persistence: Option<PersistenceOptions>) -> Result<Self> {
        config.validate()?;

        let mut store = CacheStore::with_eviction(
            config.max_size,
            config.default_ttl,
            LruEviction::new(config.eviction_fraction),
        );

        let writer = match (config.persistent, persistence) {
            (true, Some(options)) => {
                let writer = SnapshotWriter::spawn(&config.namespace, &options);
                match load_snapshot::<V>(&config.namespace, &options).await {
                    Ok(Some(entries)) => {
                        let restored = store.restore(entries);
                        info!(namespace = %config.namespace, count = restored, "Restored cache snapshot");
                    }
                    Ok(None) => {
                        debug!(namespace = %config.namespace, "No cache snapshot stored");
                    }
                    Err(e) => {
                        writer.record_failure();
                        warn!(
                            namespace = %config.namespace,
                            error = %e,
                            "Could not restore cache snapshot, starting empty"
                        );
                    }
                }
                Some(Arc::new(writer))
            }
            (true, None) => {
                warn!(
                    namespace = %config.namespace,
                    "Persistence requested but no durable medium configured"
                );
                None
            }
            (false, _) => None,
        };

        let store = Arc::new(RwLock::new(store));
        let sweep = spawn_sweep_task(
            config.namespace.clone(),
            &store,
            writer.clone(),
            config.sweep_interval,
        );

        info!(
            namespace = %config.namespace,
            max_size = config.max_size,
            default_ttl_ms = config.default_ttl.as_millis() as u64,
            persistent = writer.is_some(),
            "Cache instance opened"
        );

        Ok(Self {
            inner: Arc::new(CacheInner {
                config,
                store,
                writer,
                sweep: Mutex::new(Some(sweep)),
                destroyed: AtomicBool::new(false),
            }),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.inner.config.namespace
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn is_persistent(&self) -> bool {
        self.inner.writer.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    // == Set ==
    /// Inserts or replaces `key`. `ttl` of None uses the instance default.
    ///
    /// # Errors
    /// `InvalidKey` for empty or overlong keys, `InvalidTtl` for TTLs that
    /// overflow milliseconds.
    pub async fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) -> Result<()> {
        let snapshot = {
            let mut store = self.inner.store.write().await;
            store.set(key.into(), value, ttl)?;
            self.capture(&store)
        };
        self.persist(snapshot);
        Ok(())
    }

    // == Get ==
    /// Returns a copy of the fresh value for `key`, recording a hit or a miss.
    pub async fn get(&self, key: &str) -> Option<V> {
        self.inner.store.write().await.get(key)
    }

    // == Has ==
    /// Freshness check. Does not count as a read.
    pub async fn has(&self, key: &str) -> bool {
        self.inner.store.write().await.has(key)
    }

    // == Delete ==
    /// Removes `key`, returning whether it was present.
    pub async fn delete(&self, key: &str) -> bool {
        let (removed, snapshot) = {
            let mut store = self.inner.store.write().await;
            let removed = store.delete(key);
            let snapshot = if removed { self.capture(&store) } else { None };
            (removed, snapshot)
        };
        self.persist(snapshot);
        removed
    }

    // == Refresh ==
    /// Restarts the TTL of `key` without changing its value. Returns false
    /// when the key is absent or already expired.
    pub async fn refresh(&self, key: &str, ttl: Option<Duration>) -> Result<bool> {
        let (refreshed, snapshot) = {
            let mut store = self.inner.store.write().await;
            let refreshed = store.refresh(key, ttl)?;
            let snapshot = if refreshed { self.capture(&store) } else { None };
            (refreshed, snapshot)
        };
        self.persist(snapshot);
        Ok(refreshed)
    }

    // == Size ==
    /// Entry count, including expired entries not yet swept.
    pub async fn size(&self) -> usize {
        self.inner.store.read().await.len()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.inner.store.read().await.keys()
    }

    /// Metadata for a fresh entry without recording an access.
    pub async fn entry_info(&self, key: &str) -> Option<EntryInfo> {
        self.inner.store.read().await.entry_info(key)
    }

    // == Invalidate ==
    /// Removes every entry whose key matches `pattern`.
    pub async fn invalidate_pattern(&self, pattern: &KeyPattern) -> usize {
        self.invalidate_where(|key| pattern.matches(key)).await
    }

    /// Removes every entry whose key satisfies `predicate`.
    pub async fn invalidate_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let (count, snapshot) = {
            let mut store = self.inner.store.write().await;
            let count = store.invalidate_where(predicate);
            let snapshot = if count > 0 { self.capture(&store) } else { None };
            (count, snapshot)
        };
        self.persist(snapshot);
        if count > 0 {
            debug!(namespace = %self.namespace(), count, "Invalidated cache entries");
        }
        count
    }

    /// Removes every key prefixed with `"<ns>:"`.
    pub async fn invalidate_namespace(&self, ns: &str) -> usize {
        self.invalidate_pattern(&KeyPattern::namespace(ns)).await
    }

    // == Clear ==
    /// Removes every entry. Hit and miss counters are kept.
    pub async fn clear(&self) -> usize {
        let (count, snapshot) = {
            let mut store = self.inner.store.write().await;
            let count = store.clear();
            (count, self.capture(&store))
        };
        self.persist(snapshot);
        count
    }

    // == Sweep ==
    /// Runs an expiration sweep now, returning the number of entries removed.
    pub async fn sweep_expired(&self) -> usize {
        let (count, snapshot) = {
            let mut store = self.inner.store.write().await;
            let count = store.cleanup_expired();
            let snapshot = if count > 0 { self.capture(&store) } else { None };
            (count, snapshot)
        };
        self.persist(snapshot);
        count
    }

    // == Stats ==
    /// Read-only statistics snapshot.
    pub async fn stats(&self) -> CacheStats {
        let mut stats = self.inner.store.read().await.stats();
        if let Some(writer) = &self.inner.writer {
            stats.persistence_failures = writer.failures();
            stats.dropped_writes = writer.dropped();
        }
        stats
    }

    // == Get Or Fetch ==
    /// Returns the cached value or computes it with `fetch`, stores it under
    /// `key`, and returns it. Fetch errors are passed through and nothing is
    /// stored.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        fetch: F,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let value = fetch().await?;
        if let Err(e) = self.set(key, value.clone(), ttl).await {
            warn!(namespace = %self.namespace(), key, error = %e, "Fetched value not cached");
        }
        Ok(value)
    }

    // == Destroy ==
    /// Stops the sweep task, flushes pending snapshots, and releases all
    /// entries without persisting the emptied store. Idempotent.
    ///
    /// The handle stays usable afterwards as a plain in-memory cache.
    pub async fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        let sweep = self.inner.sweep.lock().take();
        if let Some(sweep) = sweep {
            sweep.abort();
        }
        if let Some(writer) = &self.inner.writer {
            writer.close().await;
        }

        let released = self.inner.store.write().await.clear();
        info!(namespace = %self.namespace(), released, "Cache instance destroyed");
    }

    // == Internal Helpers ==
    /// Must be called with the store lock held so generations follow the
    /// order in which mutations were applied.
    fn capture(&self, store: &CacheStore<V>) -> Option<(u64, Vec<CacheEntry<V>>)> {
        self.inner
            .writer
            .as_ref()
            .filter(|writer| !writer.is_closed())
            .map(|writer| (writer.next_generation(), store.snapshot_entries()))
    }

    fn persist(&self, snapshot: Option<(u64, Vec<CacheEntry<V>>)>) {
        if let (Some(writer), Some((generation, entries))) = (&self.inner.writer, snapshot) {
            writer.enqueue_entries(generation, entries);
        }
    }
}
