//! TTL Sweep Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{CacheStore, CacheValue};
use crate::persistence::SnapshotWriter;

/// Spawns a background task that periodically sweeps expired entries from
/// one cache instance.
///
/// The task holds only a weak reference to the store and exits on its own
/// once the owning instance is gone. It acquires the same write lock as
/// foreground operations. When entries were removed and a writer is given,
/// the remaining entries are snapshotted and numbered under the lock and
/// handed to the writer after the lock is released.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
pub fn spawn_sweep_task<V: CacheValue>(
    namespace: String,
    store: &Arc<RwLock<CacheStore<V>>>,
    writer: Option<Arc<SnapshotWriter>>,
    interval: Duration,
) -> JoinHandle<()> {
    let weak_store = Arc::downgrade(store);

    tokio::spawn(async move {
        info!(
            namespace = %namespace,
            interval_ms = interval.as_millis() as u64,
            "Starting TTL sweep task"
        );

        loop {
            // Sleep for the configured interval
            tokio::time::sleep(interval).await;

            let Some(store) = weak_store.upgrade() else {
                debug!(namespace = %namespace, "Cache dropped, sweep task exiting");
                break;
            };

            let (removed, snapshot) = {
                let mut guard = store.write().await;
                let removed = guard.cleanup_expired();
                let snapshot = match &writer {
                    Some(writer) if removed > 0 => {
                        Some((writer.next_generation(), guard.snapshot_entries()))
                    }
                    _ => None,
                };
                (removed, snapshot)
            };

            if let (Some(writer), Some((generation, entries))) = (&writer, snapshot) {
                writer.enqueue_entries(generation, entries);
            }

            if removed > 0 {
                info!(namespace = %namespace, count = removed, "TTL sweep removed expired entries");
            } else {
                debug!(namespace = %namespace, "TTL sweep: no expired entries found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{decode, MemorySnapshotBackend, PersistenceOptions, SnapshotBackend};

    fn shared_store() -> Arc<RwLock<CacheStore<String>>> {
        Arc::new(RwLock::new(CacheStore::new(100, Duration::from_secs(300))))
    }

    #[tokio::test]
    async fn test_sweep_task_removes_expired_entries() {
        let cache = shared_store();

        // Add an entry with very short TTL
        cache
            .write()
            .await
            .set("expire_soon".to_string(), "value".to_string(), Some(Duration::from_millis(50)))
            .unwrap();

        let handle = spawn_sweep_task("test".to_string(), &cache, None, Duration::from_millis(40));

        tokio::time::sleep(Duration::from_millis(250)).await;

        // Removed without any read
        assert_eq!(cache.read().await.len(), 0);
        assert_eq!(cache.read().await.stats().expirations, 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_preserves_valid_entries() {
        let cache = shared_store();

        cache
            .write()
            .await
            .set("long_lived".to_string(), "value".to_string(), Some(Duration::from_secs(3600)))
            .unwrap();

        let handle = spawn_sweep_task("test".to_string(), &cache, None, Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(
            cache.write().await.get("long_lived"),
            Some("value".to_string()),
            "Valid entry should not be removed"
        );

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_persists_after_removal() {
        let cache = shared_store();
        let backend = Arc::new(MemorySnapshotBackend::new());
        let writer = Arc::new(SnapshotWriter::spawn(
            "test",
            &PersistenceOptions::new(backend.clone()),
        ));

        {
            let mut guard = cache.write().await;
            guard
                .set("short".to_string(), "a".to_string(), Some(Duration::from_millis(30)))
                .unwrap();
            guard.set("long".to_string(), "b".to_string(), None).unwrap();
        }

        let handle = spawn_sweep_task(
            "test".to_string(),
            &cache,
            Some(writer.clone()),
            Duration::from_millis(40),
        );
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.abort();
        writer.close().await;

        let bytes = backend.load("test").unwrap().unwrap();
        let entries: Vec<crate::cache::CacheEntry<String>> = decode("test", &bytes).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "long");
    }

    #[tokio::test]
    async fn test_sweep_task_exits_when_store_dropped() {
        let cache = shared_store();
        let handle = spawn_sweep_task("test".to_string(), &cache, None, Duration::from_millis(10));

        drop(cache);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(handle.is_finished(), "Task should exit once the store is gone");
    }

    #[tokio::test]
    async fn test_sweep_task_can_be_aborted() {
        let cache = shared_store();

        let handle = spawn_sweep_task("test".to_string(), &cache, None, Duration::from_secs(1));

        // Abort immediately
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
