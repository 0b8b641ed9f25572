use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cuenote_storage_core::{now_millis, CloudStore, LocalStore, StorageError, StoredVideoData};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::SyncConfig;
use crate::keys;

/// Uniform storage surface over a local store and an optional cloud
/// replica.
///
/// Local writes come first and are never conditional on the cloud; a
/// failed cloud write lands the record in a persisted outbox for the
/// next activation. Reads decide per call which backend's value wins.
///
/// Settings, presets, order lists and backups go through the generic
/// key surface, which is local-only.
pub struct StorageAdapter {
    local: Arc<dyn LocalStore>,
    cloud: Option<Arc<dyn CloudStore>>,
    cloud_active: AtomicBool,
    staleness_window: Duration,
    /// Serializes outbox read-modify-writes. Saves of different videos
    /// may run concurrently, and the outbox is one shared document.
    outbox_lock: Mutex<()>,
}

impl std::fmt::Debug for StorageAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAdapter")
            .field("local", &self.local.backend_name())
            .field("has_cloud", &self.cloud.is_some())
            .field("cloud_active", &self.cloud_active.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl StorageAdapter {
    pub fn new(
        local: Arc<dyn LocalStore>,
        cloud: Option<Arc<dyn CloudStore>>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            local,
            cloud,
            cloud_active: AtomicBool::new(false),
            staleness_window: config.staleness_window,
            outbox_lock: Mutex::new(()),
        }
    }

    /// A local-only adapter, with no cloud replica configured.
    pub fn local_only(local: Arc<dyn LocalStore>, config: &SyncConfig) -> Self {
        Self::new(local, None, config)
    }

    /// Attempt cloud activation.
    ///
    /// On success the pending-sync outbox is drained first, so earlier
    /// offline writes reach the cloud before anything else does. On
    /// failure the adapter runs local-only until the next explicit
    /// call; there is no background re-probe. Returns whether the
    /// cloud is active.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<bool, StorageError> {
        let Some(cloud) = self.cloud.as_ref() else {
            debug!("no cloud backend configured, running local-only");
            return Ok(false);
        };

        let active = match cloud.initialize().await {
            Ok(true) => true,
            Ok(false) => {
                warn!("cloud backend unavailable, running local-only");
                false
            }
            Err(e) => {
                warn!("cloud initialization failed, running local-only: {e}");
                false
            }
        };
        self.cloud_active.store(active, Ordering::Relaxed);

        if active {
            info!("cloud backend {} active", cloud.backend_name());
            if let Err(e) = self.drain_pending_sync().await {
                warn!("pending sync drain failed, will retry next activation: {e}");
            }
        }
        Ok(active)
    }

    /// Whether cloud replication is currently active.
    pub fn cloud_active(&self) -> bool {
        self.cloud_active.load(Ordering::Relaxed)
    }

    fn active_cloud(&self) -> Option<&Arc<dyn CloudStore>> {
        if self.cloud_active() {
            self.cloud.as_ref()
        } else {
            None
        }
    }

    /// Persist one video record: local always, cloud when possible.
    ///
    /// Returns whether the cloud write happened. A cloud failure queues
    /// the record in the outbox and the save still succeeds; a local
    /// failure fails the save outright.
    #[instrument(skip(self, data), level = "debug", fields(video_id = %data.video_id))]
    pub async fn save_video_notes(&self, data: &StoredVideoData) -> Result<bool, StorageError> {
        let value = serde_json::to_value(data)
            .map_err(|e| StorageError::Serialization(format!("encode video record: {e}")))?;
        self.local.set(&data.video_id, value).await?;

        let Some(cloud) = self.active_cloud() else {
            // Without any cloud configured there is nothing to queue for.
            if self.cloud.is_some() {
                self.queue_pending_sync(data).await;
            }
            return Ok(false);
        };

        match cloud.save_video_notes(data).await {
            Ok(()) => {
                // A stale outbox entry would push old data over this
                // write on the next activation drain.
                self.remove_pending_entry(&data.video_id).await;
                Ok(true)
            }
            Err(e) => {
                warn!("cloud save failed for {}, queued for sync: {e}", data.video_id);
                self.queue_pending_sync(data).await;
                Ok(false)
            }
        }
    }

    /// Load one video record, preferring whichever backend is fresher.
    ///
    /// A local copy younger than the staleness window is authoritative
    /// (it is this device's own recent write). Otherwise the cloud
    /// value wins when the cloud has one; cloud failures fall back to
    /// local.
    #[instrument(skip(self), level = "debug")]
    pub async fn load_video_notes(
        &self,
        video_id: &str,
    ) -> Result<Option<StoredVideoData>, StorageError> {
        let local = self.read_local_video(video_id).await?;

        let Some(cloud) = self.active_cloud() else {
            return Ok(local);
        };

        if let Some(ref data) = local {
            let age = now_millis() - data.last_modified;
            if age < self.staleness_window.as_millis() as i64 {
                debug!("local copy of {} is {}ms old, preferring it", video_id, age);
                return Ok(local);
            }
        }

        match cloud.load_video_notes(video_id).await {
            // A cloud miss does not erase a video the cloud never saw.
            Ok(None) => Ok(local),
            Ok(found) => Ok(found),
            Err(e) => {
                warn!("cloud read failed for {}, using local: {e}", video_id);
                Ok(local)
            }
        }
    }

    /// Enumerate every video record across both backends.
    ///
    /// Merged by video id, last-writer-wins on `last_modified`, ties
    /// prefer local. Cloud failure degrades to the local list alone.
    #[instrument(skip(self), level = "debug")]
    pub async fn load_all_videos(&self) -> Result<Vec<StoredVideoData>, StorageError> {
        let local = self.read_all_local_videos().await?;

        let Some(cloud) = self.active_cloud() else {
            return Ok(local);
        };

        let remote = match cloud.load_all_videos().await {
            Ok(remote) => remote,
            Err(e) => {
                warn!("cloud enumeration failed, using local list: {e}");
                return Ok(local);
            }
        };

        let mut merged: BTreeMap<String, StoredVideoData> = BTreeMap::new();
        for video in remote {
            // A remote id that matches a reserved local key would
            // shadow engine state once written back.
            if !keys::is_video_key(&video.video_id) {
                warn!("cloud returned reserved id {}, skipping", video.video_id);
                continue;
            }
            merged.insert(video.video_id.clone(), video);
        }
        for video in local {
            match merged.get(&video.video_id) {
                Some(existing) if existing.last_modified > video.last_modified => {}
                _ => {
                    merged.insert(video.video_id.clone(), video);
                }
            }
        }

        Ok(merged.into_values().collect())
    }

    /// Delete one video record.
    ///
    /// Local deletion is unconditional and any queued outbox entry is
    /// dropped with it. The cloud delete is best-effort and never rolls
    /// the local delete back; outbox coverage does not extend to
    /// deletes.
    #[instrument(skip(self), level = "debug")]
    pub async fn delete_video(&self, video_id: &str) -> Result<(), StorageError> {
        self.local.remove(video_id).await?;
        self.remove_pending_entry(video_id).await;

        if let Some(cloud) = self.active_cloud() {
            if let Err(e) = cloud.delete_video(video_id).await {
                warn!("cloud delete failed for {}: {e}", video_id);
            }
        }
        Ok(())
    }

    // Generic key surface. Local-only: settings, presets, order lists
    // and backups are not cloud-synchronized at this layer.

    pub async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.local.get(key).await
    }

    pub async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.local.set(key, value).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.local.remove(key).await
    }

    pub async fn get_all(&self) -> Result<BTreeMap<String, Value>, StorageError> {
        self.local.get_all().await
    }

    pub async fn bytes_in_use(&self) -> Result<u64, StorageError> {
        self.local.bytes_in_use().await
    }

    /// Videos queued for cloud replication.
    pub async fn pending_sync_count(&self) -> usize {
        self.read_outbox().await.len()
    }

    async fn read_local_video(
        &self,
        video_id: &str,
    ) -> Result<Option<StoredVideoData>, StorageError> {
        let Some(value) = self.local.get(video_id).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                warn!("undecodable local record for {}, ignoring: {e}", video_id);
                Ok(None)
            }
        }
    }

    async fn read_all_local_videos(&self) -> Result<Vec<StoredVideoData>, StorageError> {
        let entries = self.local.get_all().await?;
        let mut videos = Vec::new();
        for (key, value) in entries {
            if !keys::is_video_key(&key) {
                continue;
            }
            match serde_json::from_value::<StoredVideoData>(value) {
                Ok(data) => videos.push(data),
                Err(e) => {
                    warn!("undecodable local record for {}, skipping: {e}", key);
                }
            }
        }
        Ok(videos)
    }

    // Outbox. Persisted under a reserved key, deduplicated by video id
    // with last write winning, drained in one batch on activation.

    async fn read_outbox(&self) -> Vec<StoredVideoData> {
        match self.local.get(keys::PENDING_SYNC).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("undecodable pending sync outbox, resetting: {e}");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("failed to read pending sync outbox: {e}");
                Vec::new()
            }
        }
    }

    async fn write_outbox(&self, entries: &[StoredVideoData]) -> Result<(), StorageError> {
        if entries.is_empty() {
            return self.local.remove(keys::PENDING_SYNC).await;
        }
        let value = serde_json::to_value(entries)
            .map_err(|e| StorageError::Serialization(format!("encode outbox: {e}")))?;
        self.local.set(keys::PENDING_SYNC, value).await
    }

    /// Upsert one video into the outbox. Failures are logged, not
    /// surfaced: the record is already durable locally.
    async fn queue_pending_sync(&self, data: &StoredVideoData) {
        let _guard = self.outbox_lock.lock().await;
        let mut entries = self.read_outbox().await;
        match entries.iter_mut().find(|e| e.video_id == data.video_id) {
            Some(entry) => *entry = data.clone(),
            None => entries.push(data.clone()),
        }
        if let Err(e) = self.write_outbox(&entries).await {
            warn!("failed to queue {} for cloud sync: {e}", data.video_id);
        } else {
            debug!("queued {} for cloud sync ({} pending)", data.video_id, entries.len());
        }
    }

    async fn remove_pending_entry(&self, video_id: &str) {
        let _guard = self.outbox_lock.lock().await;
        let mut entries = self.read_outbox().await;
        let before = entries.len();
        entries.retain(|e| e.video_id != video_id);
        if entries.len() == before {
            return;
        }
        if let Err(e) = self.write_outbox(&entries).await {
            warn!("failed to drop {} from the outbox: {e}", video_id);
        }
    }

    /// Push the whole outbox to the cloud in one batch, then clear it.
    async fn drain_pending_sync(&self) -> Result<(), StorageError> {
        let Some(cloud) = self.active_cloud() else {
            return Ok(());
        };

        let _guard = self.outbox_lock.lock().await;
        let entries = self.read_outbox().await;
        if entries.is_empty() {
            return Ok(());
        }

        cloud.sync_to_cloud(&entries).await?;
        self.write_outbox(&[]).await?;
        info!("drained {} pending videos to the cloud", entries.len());
        Ok(())
    }
}
