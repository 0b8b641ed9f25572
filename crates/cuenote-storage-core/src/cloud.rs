use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::StoredVideoData;

/// Cloud (multi-device) note store.
///
/// Network-dependent and treated as opportunistic: the engine degrades
/// to local-only whenever activation fails and never re-probes within a
/// process lifetime. Transport retry and auth details live behind the
/// implementation.
#[async_trait]
pub trait CloudStore: Send + Sync {
    /// Returns the backend identifier (e.g. "rest").
    fn backend_name(&self) -> &'static str;

    /// Attempt activation. `Ok(true)` means the backend is reachable and
    /// ready; `Ok(false)` or an error makes the engine fall back to
    /// local-only mode for the rest of the process lifetime.
    async fn initialize(&self) -> Result<bool, StorageError>;

    /// Whether a previous `initialize` succeeded.
    fn is_available(&self) -> bool;

    /// Create or replace the record for `data.video_id`.
    async fn save_video_notes(&self, data: &StoredVideoData) -> Result<(), StorageError>;

    /// Load one video record, `None` when the cloud has no copy.
    async fn load_video_notes(&self, video_id: &str)
        -> Result<Option<StoredVideoData>, StorageError>;

    /// Enumerate every video record the cloud holds.
    async fn load_all_videos(&self) -> Result<Vec<StoredVideoData>, StorageError>;

    /// Delete one video record. Deleting an absent record succeeds.
    async fn delete_video(&self, video_id: &str) -> Result<(), StorageError>;

    /// Delete every video record.
    async fn delete_all_notes(&self) -> Result<(), StorageError>;

    /// Replicate a batch of records in one call (outbox drain).
    async fn sync_to_cloud(&self, videos: &[StoredVideoData]) -> Result<(), StorageError>;
}
