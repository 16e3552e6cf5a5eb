//! Persistence Module
//!
//! Optional snapshot persistence: pluggable durable media, the snapshot
//! format, and the background writer.

mod backend;
mod snapshot;
mod writer;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::cache::CacheEntry;
use crate::config::{DEFAULT_MAX_PENDING_WRITES, DEFAULT_WRITE_TIMEOUT};
use crate::error::{CacheError, Result};

pub use backend::{FileSnapshotBackend, MemorySnapshotBackend, SnapshotBackend};
pub use snapshot::{decode, encode, Snapshot, SNAPSHOT_VERSION};
pub use writer::SnapshotWriter;

// == Persistence Options ==
/// Durable medium plus the write-back limits used with it.
#[derive(Debug, Clone)]
pub struct PersistenceOptions {
    pub backend: Arc<dyn SnapshotBackend>,
    /// Upper bound on a single load or save
    pub write_timeout: Duration,
    /// Snapshots allowed to wait for the writer
    pub max_pending_writes: usize,
}

impl PersistenceOptions {
    pub fn new(backend: Arc<dyn SnapshotBackend>) -> Self {
        Self {
            backend,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_pending_writes: DEFAULT_MAX_PENDING_WRITES,
        }
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_max_pending_writes(mut self, max: usize) -> Self {
        self.max_pending_writes = max;
        self
    }
}

// == Load Snapshot ==
/// Reads and decodes the stored snapshot for `namespace`.
///
/// Returns `Ok(None)` when nothing was stored. The backend call runs on the
/// blocking pool under the options' timeout.
pub async fn load_snapshot<V>(
    namespace: &str,
    options: &PersistenceOptions,
) -> Result<Option<Vec<CacheEntry<V>>>>
where
    V: DeserializeOwned,
{
    let backend = Arc::clone(&options.backend);
    let ns = namespace.to_string();
    let task = tokio::task::spawn_blocking(move || backend.load(&ns));

    let bytes = match tokio::time::timeout(options.write_timeout, task).await {
        Ok(Ok(loaded)) => loaded?,
        Ok(Err(e)) => return Err(CacheError::Persistence(format!("load task failed: {e}"))),
        Err(_) => {
            return Err(CacheError::Timeout(format!(
                "loading snapshot for '{namespace}'"
            )))
        }
    };

    match bytes {
        Some(bytes) => decode(namespace, &bytes).map(Some),
        None => Ok(None),
    }
}
