//! Snapshot document format.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

/// Format version written into every snapshot
pub const SNAPSHOT_VERSION: u32 = 1;

/// Whole-store snapshot as written to the durable medium.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot<V> {
    pub version: u32,
    pub namespace: String,
    pub saved_at: DateTime<Utc>,
    pub entries: Vec<CacheEntry<V>>,
}

/// Encodes `entries` as a JSON snapshot for `namespace`.
pub fn encode<V: Serialize>(namespace: &str, entries: Vec<CacheEntry<V>>) -> Result<Vec<u8>> {
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        namespace: namespace.to_string(),
        saved_at: Utc::now(),
        entries,
    };
    Ok(serde_json::to_vec(&snapshot)?)
}

/// Decodes a snapshot, rejecting other versions and other namespaces.
pub fn decode<V: DeserializeOwned>(namespace: &str, bytes: &[u8]) -> Result<Vec<CacheEntry<V>>> {
    let snapshot: Snapshot<V> = serde_json::from_slice(bytes)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(CacheError::Persistence(format!(
            "unsupported snapshot version {}",
            snapshot.version
        )));
    }
    if snapshot.namespace != namespace {
        return Err(CacheError::Persistence(format!(
            "snapshot belongs to namespace '{}'",
            snapshot.namespace
        )));
    }
    Ok(snapshot.entries)
}
