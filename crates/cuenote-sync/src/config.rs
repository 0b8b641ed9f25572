use std::time::Duration;

/// Tuning knobs for the synchronization engine.
///
/// The defaults match the behavior existing stores were written
/// against; tests shrink them to keep runtimes short.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long a cached note list stays valid.
    pub cache_ttl: Duration,
    /// A local record younger than this wins over the cloud copy on
    /// single-video reads.
    pub staleness_window: Duration,
    /// Ceiling on how long one write operation may hold its lock.
    /// An operation that exceeds it is aborted, not just unblocked.
    pub lock_ceiling: Duration,
    /// How many automatic backups survive pruning.
    pub backup_retain: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(5),
            staleness_window: Duration::from_secs(60),
            lock_ceiling: Duration::from_secs(30),
            backup_retain: 5,
        }
    }
}
