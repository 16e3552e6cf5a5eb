//! Snapshot Writer
//!
//! Background task that writes snapshots to the durable medium, decoupled
//! from the cache lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::CacheEntry;
use crate::persistence::{encode, PersistenceOptions, SnapshotBackend};

// == Snapshot Writer ==
/// Per-instance write-back queue.
///
/// Snapshots carry a generation taken under the store lock, and anything
/// older than a snapshot already queued or written is discarded, so the
/// medium only ever moves forward. At most `max_pending_writes` snapshots wait
/// at once; when a new one arrives on a full queue the oldest is dropped.
///
/// Saves run one at a time on the blocking pool. A save that exceeds
/// `write_timeout` counts as a failure, but the next save waits for it to
/// finish and then writes only the newest pending snapshot.
#[derive(Debug)]
pub struct SnapshotWriter {
    shared: Arc<WriterShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug)]
struct WriterShared {
    namespace: String,
    backend: Arc<dyn SnapshotBackend>,
    backlog: Mutex<Backlog>,
    notify: Notify,
    closed: AtomicBool,
    next_generation: AtomicU64,
    max_pending: usize,
    write_timeout: Duration,
    written: AtomicU64,
    failures: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Default)]
struct Backlog {
    pending: VecDeque<(u64, Vec<u8>)>,
    /// Generation of the last snapshot handed to the backend
    started: u64,
}

impl Backlog {
    fn newest(&self) -> u64 {
        self.pending
            .back()
            .map(|(generation, _)| *generation)
            .unwrap_or(self.started)
    }
}

impl SnapshotWriter {
    // == Spawn ==
    /// Starts the writer task. Must be called inside a tokio runtime.
    pub fn spawn(namespace: &str, options: &PersistenceOptions) -> Self {
        let shared = Arc::new(WriterShared {
            namespace: namespace.to_string(),
            backend: Arc::clone(&options.backend),
            backlog: Mutex::new(Backlog::default()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            next_generation: AtomicU64::new(1),
            max_pending: options.max_pending_writes.max(1),
            write_timeout: options.write_timeout,
            written: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });

        let worker = tokio::spawn(Arc::clone(&shared).run());

        Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    // == Generation ==
    /// Orders snapshots. Call while holding the lock the snapshot is taken
    /// under.
    pub fn next_generation(&self) -> u64 {
        self.shared.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    // == Enqueue ==
    /// Queues a snapshot for writing. Ignored once the writer is closed or
    /// when a newer snapshot is already queued or written.
    pub fn enqueue(&self, generation: u64, bytes: Vec<u8>) {
        if self.shared.closed.load(Ordering::Acquire) {
            debug!(namespace = %self.shared.namespace, "Writer closed, snapshot discarded");
            return;
        }

        {
            let mut backlog = self.shared.backlog.lock();
            if generation <= backlog.newest() {
                debug!(
                    namespace = %self.shared.namespace,
                    generation,
                    "Superseded snapshot discarded"
                );
                return;
            }
            while backlog.pending.len() >= self.shared.max_pending {
                backlog.pending.pop_front();
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    namespace = %self.shared.namespace,
                    "Snapshot backlog full, dropped oldest pending write"
                );
            }
            backlog.pending.push_back((generation, bytes));
        }
        self.shared.notify.notify_one();
    }

    /// Encodes a store snapshot and queues it. Encoding failures are logged
    /// and counted.
    pub fn enqueue_entries<V: Serialize>(&self, generation: u64, entries: Vec<CacheEntry<V>>) {
        match encode(&self.shared.namespace, entries) {
            Ok(bytes) => self.enqueue(generation, bytes),
            Err(e) => {
                self.record_failure();
                warn!(namespace = %self.shared.namespace, error = %e, "Snapshot encoding failed");
            }
        }
    }

    /// Counts a persistence failure that happened outside the writer task.
    pub fn record_failure(&self) {
        self.shared.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn written(&self) -> u64 {
        self.shared.written.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.shared.failures.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stops accepting snapshots. The task drains what is pending and exits
    /// without anyone waiting for it.
    pub fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_one();
    }

    // == Close ==
    /// Writes out everything still pending and stops the task. Idempotent.
    ///
    /// Waits at most one `write_timeout` per possible queued save plus the
    /// one in flight. A medium slower than that is left to finish in the
    /// background.
    pub async fn close(&self) {
        self.shutdown();

        let worker = self.worker.lock().take();
        let Some(mut worker) = worker else {
            return;
        };

        let slots = u32::try_from(self.shared.max_pending.saturating_add(1)).unwrap_or(u32::MAX);
        let grace = self.shared.write_timeout.saturating_mul(slots);
        match tokio::time::timeout(grace, &mut worker).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(namespace = %self.shared.namespace, error = %e, "Snapshot writer task failed");
            }
            Err(_) => {
                warn!(
                    namespace = %self.shared.namespace,
                    grace_ms = grace.as_millis() as u64,
                    "Snapshot writer still busy, leaving it to finish in the background"
                );
            }
        }
    }
}

impl WriterShared {
    async fn run(self: Arc<Self>) {
        debug!(namespace = %self.namespace, "Snapshot writer started");

        loop {
            let next = {
                let mut backlog = self.backlog.lock();
                let next = backlog.pending.pop_front();
                if let Some((generation, _)) = &next {
                    backlog.started = *generation;
                }
                next
            };
            match next {
                Some((generation, bytes)) => self.write(generation, bytes).await,
                None if self.closed.load(Ordering::Acquire) => break,
                None => self.notify.notified().await,
            }
        }

        debug!(namespace = %self.namespace, "Snapshot writer stopped");
    }

    async fn write(&self, generation: u64, bytes: Vec<u8>) {
        let backend = Arc::clone(&self.backend);
        let namespace = self.namespace.clone();
        let size = bytes.len();
        let mut task = tokio::task::spawn_blocking(move || backend.save(&namespace, &bytes));

        match tokio::time::timeout(self.write_timeout, &mut task).await {
            Ok(Ok(Ok(()))) => {
                self.written.fetch_add(1, Ordering::Relaxed);
                debug!(namespace = %self.namespace, generation, bytes = size, "Snapshot written");
            }
            Ok(Ok(Err(e))) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(namespace = %self.namespace, error = %e, "Snapshot write failed");
            }
            Ok(Err(e)) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(namespace = %self.namespace, error = %e, "Snapshot write task panicked");
            }
            Err(_) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    namespace = %self.namespace,
                    generation,
                    timeout_ms = self.write_timeout.as_millis() as u64,
                    "Snapshot write timed out"
                );

                // The blocking save cannot be cancelled. Letting the next one
                // start now would race it on the medium.
                let late = task.await;
                debug!(
                    namespace = %self.namespace,
                    generation,
                    ok = matches!(late, Ok(Ok(()))),
                    "Timed-out snapshot write finished"
                );
                self.keep_newest_pending();
            }
        }
    }

    /// Every snapshot is a full image, so after a stall only the newest
    /// pending one is worth writing.
    fn keep_newest_pending(&self) {
        let mut backlog = self.backlog.lock();
        let stale = backlog.pending.len().saturating_sub(1);
        if stale > 0 {
            backlog.pending.drain(..stale);
            self.dropped.fetch_add(stale as u64, Ordering::Relaxed);
            debug!(namespace = %self.namespace, count = stale, "Collapsed snapshot backlog");
        }
    }
}
