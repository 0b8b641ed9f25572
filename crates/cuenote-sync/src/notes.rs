use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use cuenote_storage_core::{now_millis, Note, StorageError, StoredVideoData, VideoSummary};
use moka::future::Cache;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::adapter::StorageAdapter;
use crate::backup::{BackupInfo, BackupRecord};
use crate::config::SyncConfig;
use crate::keys;
use crate::lock::{LockStatus, StorageLock};

/// Metadata accompanying a note save. Fields left `None` keep the
/// existing record's values.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    pub video_title: Option<String>,
    pub group: Option<String>,
    pub channel_name: Option<String>,
    pub channel_id: Option<String>,
}

/// What a save did with the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { cloud_synced: bool },
    /// The note list was empty, so the record was removed.
    Removed,
}

#[derive(Debug, Clone, Default)]
pub struct LoadAllOptions {
    /// Purge records whose `last_modified` is older than this window,
    /// as a side effect of the enumeration.
    pub retention: Option<Duration>,
}

/// Outcome of a completed bulk overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverwriteReport {
    /// Key of the pre-operation backup, for manual recovery.
    pub backup_key: String,
    pub videos_deleted: usize,
    pub videos_written: usize,
    /// The incoming set held less than half the existing notes.
    pub data_loss_warning: bool,
}

/// Domain-level storage API for video notes.
///
/// Mutations run under the write lock; reads are cache-first and never
/// block behind writers. The cache is an accelerator, not a source of
/// truth: every write goes through the adapter regardless of cache
/// state.
pub struct NotesRepository {
    adapter: Arc<StorageAdapter>,
    lock: StorageLock,
    cache: Cache<String, Vec<Note>>,
    /// Serializes order-list read-modify-writes, which the per-video
    /// lock alone does not cover.
    order_lock: Mutex<()>,
    config: SyncConfig,
}

impl std::fmt::Debug for NotesRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotesRepository")
            .field("adapter", &self.adapter)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn validate_video_id(video_id: &str) -> Result<(), StorageError> {
    if video_id.is_empty() {
        return Err(StorageError::InvalidArgument(
            "video id must not be empty".into(),
        ));
    }
    if keys::is_reserved(video_id) {
        return Err(StorageError::InvalidArgument(format!(
            "video id '{video_id}' collides with a reserved storage key"
        )));
    }
    Ok(())
}

impl NotesRepository {
    pub fn new(adapter: Arc<StorageAdapter>, config: SyncConfig) -> Self {
        let cache = Cache::builder()
            .time_to_live(config.cache_ttl)
            .max_capacity(10_000)
            .build();
        Self {
            adapter,
            lock: StorageLock::new(config.lock_ceiling),
            cache,
            order_lock: Mutex::new(()),
            config,
        }
    }

    /// Notes for one video, cache-first.
    #[instrument(skip(self), level = "debug")]
    pub async fn load_notes(&self, video_id: &str) -> Result<Vec<Note>, StorageError> {
        validate_video_id(video_id)?;
        if let Some(notes) = self.cache.get(video_id).await {
            debug!("cache hit for {}", video_id);
            return Ok(notes);
        }

        let notes = self
            .adapter
            .load_video_notes(video_id)
            .await?
            .map(|data| data.notes)
            .unwrap_or_default();
        self.cache.insert(video_id.to_string(), notes.clone()).await;
        Ok(notes)
    }

    /// Persist one video's note list.
    ///
    /// An empty list removes the record instead of storing an empty
    /// array, and succeeds even when no record existed. Notes without
    /// ids get them here, before anything touches a backend.
    #[instrument(skip(self, notes, options), level = "debug", fields(count = notes.len()))]
    pub async fn save_notes(
        &self,
        video_id: &str,
        notes: Vec<Note>,
        options: SaveOptions,
    ) -> Result<SaveOutcome, StorageError> {
        validate_video_id(video_id)?;
        self.lock
            .with_video(video_id, "save_notes", async {
                if notes.is_empty() {
                    self.adapter.delete_video(video_id).await?;
                    self.cache.invalidate(video_id).await;
                    debug!("empty save removed {}", video_id);
                    return Ok(SaveOutcome::Removed);
                }

                let mut data = self
                    .local_record(video_id)
                    .await?
                    .unwrap_or_else(|| StoredVideoData::new(video_id));
                if let Some(title) = options.video_title {
                    data.video_title = title;
                }
                if let Some(group) = options.group {
                    data.group = Some(group);
                }
                if let Some(channel_name) = options.channel_name {
                    data.channel_name = Some(channel_name);
                }
                if let Some(channel_id) = options.channel_id {
                    data.channel_id = Some(channel_id);
                }
                data.notes = notes;
                data.assign_missing_note_ids();
                data.last_modified = now_millis();

                let cloud_synced = self.adapter.save_video_notes(&data).await?;
                self.cache
                    .insert(video_id.to_string(), data.notes.clone())
                    .await;
                Ok(SaveOutcome::Saved { cloud_synced })
            })
            .await
    }

    /// Remove one note by id: load, filter, re-save.
    ///
    /// Dropping the last note removes the whole record, exactly as an
    /// empty save would.
    #[instrument(skip(self), level = "debug")]
    pub async fn delete_note(
        &self,
        video_id: &str,
        note_id: &str,
    ) -> Result<SaveOutcome, StorageError> {
        let current = self.load_notes(video_id).await?;
        let remaining: Vec<Note> = current.into_iter().filter(|n| n.id != note_id).collect();
        self.save_notes(video_id, remaining, SaveOptions::default())
            .await
    }

    /// Remove a video record and its manual-order entry.
    #[instrument(skip(self), level = "debug")]
    pub async fn delete_video(&self, video_id: &str) -> Result<(), StorageError> {
        validate_video_id(video_id)?;
        self.lock
            .with_video(video_id, "delete_video", async {
                self.adapter.delete_video(video_id).await?;
                self.cache.invalidate(video_id).await;
                self.remove_from_order(video_id).await?;
                Ok(())
            })
            .await
    }

    /// Enumerate every video, optionally purging expired records.
    ///
    /// Output order: videos absent from the manual order list come
    /// first, sorted by `last_modified` descending, followed by the
    /// manually ordered videos in their recorded order.
    #[instrument(skip(self), level = "debug")]
    pub async fn load_all_videos(
        &self,
        options: LoadAllOptions,
    ) -> Result<Vec<VideoSummary>, StorageError> {
        let mut videos = self.adapter.load_all_videos().await?;

        if let Some(window) = options.retention {
            let cutoff = now_millis() - window.as_millis() as i64;
            let mut kept = Vec::with_capacity(videos.len());
            for video in videos {
                // A last_modified of zero is a legacy record that never
                // carried a timestamp; those are never purged.
                if video.last_modified > 0 && video.last_modified < cutoff {
                    info!(
                        "retention purge of {} (last modified {})",
                        video.video_id, video.last_modified
                    );
                    self.delete_video(&video.video_id).await?;
                } else {
                    kept.push(video);
                }
            }
            videos = kept;
        }

        let mut by_id: HashMap<String, StoredVideoData> = videos
            .into_iter()
            .map(|v| (v.video_id.clone(), v))
            .collect();

        let order = self.read_order().await?;
        let mut manual = Vec::new();
        for id in &order {
            // Duplicate order entries emit once; remove dedupes.
            if let Some(video) = by_id.remove(id) {
                manual.push(video);
            }
        }
        let mut remainder: Vec<StoredVideoData> = by_id.into_values().collect();
        remainder.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));

        let mut result = Vec::with_capacity(remainder.len() + manual.len());
        result.extend(remainder.into_iter().map(VideoSummary::from_data));
        result.extend(manual.into_iter().map(VideoSummary::from_data));
        Ok(result)
    }

    /// Total notes across both backends' merged view.
    pub async fn get_total_notes_count(&self) -> Result<usize, StorageError> {
        let videos = self.adapter.load_all_videos().await?;
        Ok(videos.iter().map(|v| v.notes.len()).sum())
    }

    /// Delete every video, one per-video delete at a time so the cloud
    /// sees each one. Returns how many were deleted.
    #[instrument(skip(self))]
    pub async fn clear_all_notes(&self) -> Result<usize, StorageError> {
        self.lock
            .with_global("clear_all_notes", async {
                let videos = self.adapter.load_all_videos().await?;
                let mut deleted = 0;
                for video in &videos {
                    self.adapter.delete_video(&video.video_id).await?;
                    deleted += 1;
                }
                self.cache.invalidate_all();
                info!("cleared {} videos", deleted);
                Ok(deleted)
            })
            .await
    }

    /// Replace the entire store with `videos`, protected by a verified
    /// backup.
    ///
    /// The sequence: validate input, snapshot and verify a backup,
    /// check the data-loss heuristic, then reconcile incrementally
    /// (delete absentees, upsert incomers) rather than wipe-and-reload.
    /// Any mid-flight failure rolls back to the snapshot; if the
    /// rollback itself fails the error is fatal and names the backup
    /// key for manual recovery.
    #[instrument(skip(self, videos), fields(incoming = videos.len()))]
    pub async fn overwrite_all_notes(
        &self,
        videos: Vec<StoredVideoData>,
    ) -> Result<OverwriteReport, StorageError> {
        let mut seen = HashSet::new();
        for video in &videos {
            validate_video_id(&video.video_id)?;
            if !seen.insert(video.video_id.clone()) {
                return Err(StorageError::InvalidArgument(format!(
                    "duplicate video id '{}' in overwrite input",
                    video.video_id
                )));
            }
        }

        self.lock
            .with_global("overwrite_all_notes", async {
                // No destructive step happens before this succeeds.
                let (backup_key, backup) = self.snapshot_backup("pre-overwrite").await?;

                let incoming_notes: usize = videos.iter().map(|v| v.notes.len()).sum();
                let data_loss_warning =
                    backup.notes_count > 0 && incoming_notes * 2 < backup.notes_count;
                if data_loss_warning {
                    // Detector, not a guard: the operation proceeds.
                    warn!(
                        "overwrite shrinks the store from {} to {} notes; backup {} holds the prior state",
                        backup.notes_count, incoming_notes, backup_key
                    );
                }

                match self.reconcile(&backup, &videos).await {
                    Ok((videos_deleted, videos_written)) => {
                        self.cache.invalidate_all();
                        info!(
                            "overwrite complete: {} deleted, {} written, backup {}",
                            videos_deleted, videos_written, backup_key
                        );
                        Ok(OverwriteReport {
                            backup_key,
                            videos_deleted,
                            videos_written,
                            data_loss_warning,
                        })
                    }
                    Err(cause) => {
                        warn!(
                            "overwrite failed mid-flight, rolling back to {}: {}",
                            backup_key, cause
                        );
                        match self.replace_all_with(&backup.data).await {
                            Ok(_) => {
                                self.cache.invalidate_all();
                                Err(StorageError::OverwriteRolledBack {
                                    backup_key,
                                    reason: cause.to_string(),
                                })
                            }
                            Err(restore_err) => {
                                error!(
                                    "rollback from {} failed, manual restore required: {}",
                                    backup_key, restore_err
                                );
                                Err(StorageError::RestoreFailed {
                                    backup_key,
                                    reason: format!(
                                        "{cause}; rollback failed: {restore_err}"
                                    ),
                                })
                            }
                        }
                    }
                }
            })
            .await
    }

    /// Delete videos absent from the incoming set, then upsert every
    /// incoming video. Counts are (deleted, written).
    async fn reconcile(
        &self,
        backup: &BackupRecord,
        videos: &[StoredVideoData],
    ) -> Result<(usize, usize), StorageError> {
        let incoming_ids: HashSet<&str> = videos.iter().map(|v| v.video_id.as_str()).collect();

        let mut deleted = 0;
        for existing in &backup.data {
            if !incoming_ids.contains(existing.video_id.as_str()) {
                self.adapter.delete_video(&existing.video_id).await?;
                deleted += 1;
            }
        }

        let mut written = 0;
        for video in videos {
            let mut data = video.clone();
            data.assign_missing_note_ids();
            // Imports without a timestamp start their history here;
            // nonzero timestamps survive so reconciliation stays sane.
            if data.last_modified == 0 {
                data.last_modified = now_millis();
            }
            self.adapter.save_video_notes(&data).await?;
            written += 1;
        }
        Ok((deleted, written))
    }

    /// Delete everything currently stored, then re-save the given
    /// videos through the normal per-video path so cloud replication is
    /// attempted for each. Caller must hold the global lock.
    async fn replace_all_with(&self, videos: &[StoredVideoData]) -> Result<usize, StorageError> {
        let current = self.adapter.load_all_videos().await?;
        for video in &current {
            self.adapter.delete_video(&video.video_id).await?;
        }

        let mut restored = 0;
        for video in videos {
            let mut data = video.clone();
            data.assign_missing_note_ids();
            if data.last_modified == 0 {
                data.last_modified = now_millis();
            }
            self.adapter.save_video_notes(&data).await?;
            restored += 1;
        }
        Ok(restored)
    }

    // Backups.

    /// Snapshot the current store under a fresh backup key.
    pub async fn create_backup(&self, reason: &str) -> Result<String, StorageError> {
        self.lock
            .with_global("create_backup", async {
                let (key, _record) = self.snapshot_backup(reason).await?;
                Ok(key)
            })
            .await
    }

    /// Stored backups, newest first, without payloads.
    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>, StorageError> {
        let entries = self.adapter.get_all().await?;
        let mut backups = Vec::new();
        for (key, value) in entries {
            if keys::parse_backup_timestamp(&key).is_none() {
                continue;
            }
            match serde_json::from_value::<BackupRecord>(value) {
                Ok(record) => backups.push(BackupInfo::from_record(key, &record)),
                Err(e) => warn!("undecodable backup {}, skipping: {e}", key),
            }
        }
        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(backups)
    }

    /// Restore the store to a stored backup's contents.
    ///
    /// The record is validated first; an invalid backup is never used.
    #[instrument(skip(self))]
    pub async fn restore_backup(&self, backup_key: &str) -> Result<usize, StorageError> {
        self.lock
            .with_global("restore_backup", async {
                let value = self
                    .adapter
                    .get(backup_key)
                    .await?
                    .ok_or_else(|| StorageError::NotFound(format!("backup {backup_key}")))?;
                let record: BackupRecord = serde_json::from_value(value).map_err(|e| {
                    StorageError::Backup(format!("decode backup {backup_key}: {e}"))
                })?;
                record.validate().map_err(|reason| {
                    StorageError::Backup(format!(
                        "backup {backup_key} failed validation, refusing restore: {reason}"
                    ))
                })?;

                let restored = self.replace_all_with(&record.data).await?;
                self.cache.invalidate_all();
                info!("restored {} videos from {}", restored, backup_key);
                Ok(restored)
            })
            .await
    }

    /// Write, re-read and verify a backup of the merged current state.
    /// Returns its key and the verified record. Prunes old backups.
    async fn snapshot_backup(
        &self,
        reason: &str,
    ) -> Result<(String, BackupRecord), StorageError> {
        let videos = self.adapter.load_all_videos().await?;
        let mut record = BackupRecord::new(reason, videos);
        // A fresh backup's key must be unique and sort strictly newest;
        // snapshots landing in the same millisecond would violate both.
        let newest = self
            .adapter
            .get_all()
            .await
            .map_err(|e| StorageError::Backup(format!("enumerate backups: {e}")))?
            .keys()
            .filter_map(|k| keys::parse_backup_timestamp(k))
            .max();
        if let Some(newest) = newest {
            record.timestamp = record.timestamp.max(newest + 1);
        }
        let key = keys::backup_key(record.timestamp);

        let value = serde_json::to_value(&record)
            .map_err(|e| StorageError::Backup(format!("encode backup: {e}")))?;
        self.adapter
            .set(&key, value)
            .await
            .map_err(|e| StorageError::Backup(format!("write backup {key}: {e}")))?;

        // Trust only what actually landed in storage.
        let stored = self
            .adapter
            .get(&key)
            .await
            .map_err(|e| StorageError::Backup(format!("re-read backup {key}: {e}")))?
            .ok_or_else(|| StorageError::Backup(format!("backup {key} vanished after write")))?;
        let stored: BackupRecord = serde_json::from_value(stored)
            .map_err(|e| StorageError::Backup(format!("decode backup {key}: {e}")))?;
        stored
            .validate()
            .map_err(|reason| StorageError::Backup(format!("backup {key} failed validation: {reason}")))?;

        self.prune_backups().await;
        info!(
            "backup {} created ({} videos, {} notes)",
            key, stored.videos_count, stored.notes_count
        );
        Ok((key, stored))
    }

    /// Keep the newest `backup_retain` backups, drop the rest.
    async fn prune_backups(&self) {
        let entries = match self.adapter.get_all().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("backup prune skipped, enumeration failed: {e}");
                return;
            }
        };
        let mut stamps: Vec<i64> = entries
            .keys()
            .filter_map(|k| keys::parse_backup_timestamp(k))
            .collect();
        if stamps.len() <= self.config.backup_retain {
            return;
        }
        stamps.sort_unstable_by(|a, b| b.cmp(a));
        for stamp in stamps.split_off(self.config.backup_retain) {
            let key = keys::backup_key(stamp);
            match self.adapter.remove(&key).await {
                Ok(()) => debug!("pruned backup {}", key),
                Err(e) => warn!("failed to prune backup {}: {e}", key),
            }
        }
    }

    // Manual ordering.

    pub async fn video_order(&self) -> Result<Vec<String>, StorageError> {
        self.read_order().await
    }

    pub async fn set_video_order(&self, order: Vec<String>) -> Result<(), StorageError> {
        let _guard = self.order_lock.lock().await;
        self.write_order(&order).await
    }

    /// Drop the first order-list occurrence of `video_id`. Duplicates
    /// beyond the first are left alone.
    async fn remove_from_order(&self, video_id: &str) -> Result<(), StorageError> {
        let _guard = self.order_lock.lock().await;
        let mut order = self.read_order().await?;
        if let Some(pos) = order.iter().position(|id| id == video_id) {
            order.remove(pos);
            self.write_order(&order).await?;
        }
        Ok(())
    }

    async fn read_order(&self) -> Result<Vec<String>, StorageError> {
        match self.adapter.get(keys::VIDEO_ORDER).await? {
            Some(value) => match serde_json::from_value(value) {
                Ok(order) => Ok(order),
                Err(e) => {
                    warn!("undecodable video order list, ignoring: {e}");
                    Ok(Vec::new())
                }
            },
            None => Ok(Vec::new()),
        }
    }

    async fn write_order(&self, order: &[String]) -> Result<(), StorageError> {
        let value = serde_json::to_value(order)
            .map_err(|e| StorageError::Serialization(format!("encode video order: {e}")))?;
        self.adapter.set(keys::VIDEO_ORDER, value).await
    }

    // Cache hooks.

    /// Drop one video's cached notes, e.g. on an external change
    /// notification.
    pub async fn invalidate(&self, video_id: &str) {
        self.cache.invalidate(video_id).await;
    }

    /// Drop every cached note list.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Diagnostics snapshot of the write lock.
    pub fn lock_status(&self) -> LockStatus {
        self.lock.status()
    }

    async fn local_record(
        &self,
        video_id: &str,
    ) -> Result<Option<StoredVideoData>, StorageError> {
        let Some(value) = self.adapter.get(video_id).await? else {
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
}
