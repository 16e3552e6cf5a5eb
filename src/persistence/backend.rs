//! Durable media for cache snapshots.
//!
//! A backend stores one opaque byte blob per namespace. The cache never
//! relies on a backend for correctness: every failure is logged and the
//! in-memory store carries on.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tempfile::NamedTempFile;

use crate::error::{CacheError, Result};

/// Byte-oriented get/set-by-key storage for snapshots.
///
/// # Thread Safety
///
/// Calls arrive from tokio's blocking pool, so implementations must be
/// `Send + Sync` and may block.
pub trait SnapshotBackend: Send + Sync + fmt::Debug {
    /// Returns the stored snapshot for `namespace`, `Ok(None)` if there is none.
    fn load(&self, namespace: &str) -> Result<Option<Vec<u8>>>;

    /// Replaces the stored snapshot for `namespace`.
    fn save(&self, namespace: &str, bytes: &[u8]) -> Result<()>;
}

// == File Backend ==
/// Stores each namespace as `<dir>/<namespace>.json`.
///
/// Each write goes to a uniquely named temporary file in the same directory
/// and is renamed into place, so a crash mid-write leaves the previous
/// snapshot intact and concurrent writers never share a temporary file.
#[derive(Debug, Clone)]
pub struct FileSnapshotBackend {
    dir: PathBuf,
}

impl FileSnapshotBackend {
    /// Opens (and creates if needed) the snapshot directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot file for a namespace. Characters outside `[A-Za-z0-9_-]`
    /// become `_`.
    pub fn path_for(&self, namespace: &str) -> PathBuf {
        let file_name: String = namespace
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }
}

impl SnapshotBackend for FileSnapshotBackend {
    fn load(&self, namespace: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(namespace)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, namespace: &str, bytes: &[u8]) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(namespace)).map_err(|e| e.error)?;
        Ok(())
    }
}

// == Memory Backend ==
/// Process-local backend. Snapshots outlive cache instances but not the
/// process; `set_available(false)` makes every call fail.
#[derive(Debug)]
pub struct MemorySnapshotBackend {
    snapshots: Mutex<HashMap<String, Vec<u8>>>,
    available: AtomicBool,
}

impl Default for MemorySnapshotBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySnapshotBackend {
    pub fn new() -> Self {
        Self {
            snapshots: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Stores raw bytes directly, bypassing availability.
    pub fn insert_raw(&self, namespace: &str, bytes: Vec<u8>) {
        self.snapshots.lock().insert(namespace.to_string(), bytes);
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.snapshots.lock().contains_key(namespace)
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Persistence(
                "memory backend unavailable".to_string(),
            ))
        }
    }
}

impl SnapshotBackend for MemorySnapshotBackend {
    fn load(&self, namespace: &str) -> Result<Option<Vec<u8>>> {
        self.check_available()?;
        Ok(self.snapshots.lock().get(namespace).cloned())
    }

    fn save(&self, namespace: &str, bytes: &[u8]) -> Result<()> {
        self.check_available()?;
        self.snapshots
            .lock()
            .insert(namespace.to_string(), bytes.to_vec());
        Ok(())
    }
}
