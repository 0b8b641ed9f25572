use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cuenote_storage_core::StorageError;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Write serialization for the storage engine.
///
/// Write operations on the same video are granted in submission order
/// and never overlap; writes to different videos may interleave.
/// Whole-store operations (bulk overwrite, clear-all, restore) exclude
/// every per-video writer for their duration. Reads never touch this
/// lock.
///
/// Layout: a table of per-video mutexes under a global reader/writer
/// lock. Per-video writers hold the global lock shared plus their
/// video's mutex; whole-store writers hold the global lock exclusively.
/// Both tokio primitives grant in FIFO order. The mutex table grows
/// with distinct video ids and entries are never removed; each is a
/// few dozen bytes.
///
/// An operation that holds its lock longer than the configured ceiling
/// is aborted at its next suspension point. Its caller gets
/// [`StorageError::LockTimeout`] and the next queued operation runs
/// against a lock that is genuinely free. Work the aborted operation
/// already performed is not undone.
#[derive(Debug)]
pub struct StorageLock {
    global: RwLock<()>,
    video_locks: DashMap<String, Arc<Mutex<()>>>,
    active: DashMap<u64, String>,
    next_ticket: AtomicU64,
    queued: AtomicUsize,
    ceiling: Duration,
}

/// Snapshot of lock activity, for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockStatus {
    pub locked: bool,
    /// Names of the operations currently holding a lock.
    pub active_operations: Vec<String>,
    /// Operations waiting for a grant.
    pub queued: usize,
}

impl StorageLock {
    pub fn new(ceiling: Duration) -> Self {
        Self {
            global: RwLock::new(()),
            video_locks: DashMap::new(),
            active: DashMap::new(),
            next_ticket: AtomicU64::new(0),
            queued: AtomicUsize::new(0),
            ceiling,
        }
    }

    /// Run `operation` while holding the write lock for one video.
    ///
    /// Waits behind earlier writers of the same video, runs, releases.
    /// Aborts the operation with `LockTimeout` once the ceiling passes.
    pub async fn with_video<F, T>(
        &self,
        video_id: &str,
        operation: &str,
        fut: F,
    ) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        let waiting = QueueGuard::enter(&self.queued);
        let _global = self.global.read().await;
        let mutex = self
            .video_locks
            .entry(video_id.to_string())
            .or_default()
            .clone();
        let _video = mutex.lock().await;
        drop(waiting);

        self.run_guarded(operation, fut).await
    }

    /// Run `operation` while excluding every writer in the store.
    pub async fn with_global<F, T>(&self, operation: &str, fut: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        let waiting = QueueGuard::enter(&self.queued);
        let _global = self.global.write().await;
        drop(waiting);

        self.run_guarded(operation, fut).await
    }

    async fn run_guarded<F, T>(&self, operation: &str, fut: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.active.insert(ticket, operation.to_string());
        let _active = ActiveGuard {
            ticket,
            active: &self.active,
        };

        debug!("lock granted for {}", operation);
        match tokio::time::timeout(self.ceiling, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "operation {} exceeded the {}s lock ceiling and was aborted",
                    operation,
                    self.ceiling.as_secs()
                );
                Err(StorageError::LockTimeout {
                    operation: operation.to_string(),
                })
            }
        }
    }

    /// Non-blocking activity snapshot.
    pub fn status(&self) -> LockStatus {
        let active_operations: Vec<String> =
            self.active.iter().map(|e| e.value().clone()).collect();
        LockStatus {
            locked: !active_operations.is_empty(),
            active_operations,
            queued: self.queued.load(Ordering::Relaxed),
        }
    }
}

/// Waiting-operation counter. Decrements even when the waiter's future
/// is dropped before a grant.
struct QueueGuard<'a> {
    queued: &'a AtomicUsize,
}

impl<'a> QueueGuard<'a> {
    fn enter(queued: &'a AtomicUsize) -> Self {
        queued.fetch_add(1, Ordering::Relaxed);
        Self { queued }
    }
}

impl Drop for QueueGuard<'_> {
    fn drop(&mut self) {
        self.queued.fetch_sub(1, Ordering::Relaxed);
    }
}

struct ActiveGuard<'a> {
    ticket: u64,
    active: &'a DashMap<u64, String>,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.remove(&self.ticket);
    }
}
