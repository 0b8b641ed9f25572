//! Shared fixtures for the engine tests: a scripted cloud backend and
//! a local store with injectable write failures.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cuenote_storage_core::{CloudStore, LocalStore, Note, StorageError, StoredVideoData};
use cuenote_storage_local::MemoryStore;
use serde_json::Value;

pub fn note(id: &str, seconds: f64, text: &str) -> Note {
    Note {
        id: id.to_string(),
        timestamp_display: format!("{}:{:02}", seconds as u64 / 60, seconds as u64 % 60),
        timestamp_seconds: seconds,
        text: text.to_string(),
    }
}

pub fn video(id: &str, note_count: usize) -> StoredVideoData {
    let mut data = StoredVideoData::new(id);
    data.video_title = format!("Video {id}");
    data.last_modified = 1_000;
    for i in 0..note_count {
        data.notes.push(note(
            &format!("{id}-n{i}"),
            i as f64 * 10.0,
            &format!("note {i} of {id}"),
        ));
    }
    data
}

/// In-memory cloud backend with scripted health and failures.
#[derive(Debug, Default)]
pub struct MockCloud {
    healthy: AtomicBool,
    available: AtomicBool,
    fail_saves: AtomicBool,
    fail_loads: AtomicBool,
    videos: Mutex<BTreeMap<String, StoredVideoData>>,
    saved_ids: Mutex<Vec<String>>,
    deleted_ids: Mutex<Vec<String>>,
    batch_sizes: Mutex<Vec<usize>>,
}

impl MockCloud {
    pub fn healthy() -> Arc<Self> {
        let cloud = Self::default();
        cloud.healthy.store(true, Ordering::Relaxed);
        Arc::new(cloud)
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::Relaxed);
    }

    pub fn seed(&self, videos: Vec<StoredVideoData>) {
        let mut store = self.videos.lock().unwrap();
        for video in videos {
            store.insert(video.video_id.clone(), video);
        }
    }

    pub fn video(&self, video_id: &str) -> Option<StoredVideoData> {
        self.videos.lock().unwrap().get(video_id).cloned()
    }

    pub fn video_ids(&self) -> Vec<String> {
        self.videos.lock().unwrap().keys().cloned().collect()
    }

    pub fn saved_ids(&self) -> Vec<String> {
        self.saved_ids.lock().unwrap().clone()
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted_ids.lock().unwrap().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }
}

#[async_trait]
impl CloudStore for MockCloud {
    fn backend_name(&self) -> &'static str {
        "mock-cloud"
    }

    async fn initialize(&self) -> Result<bool, StorageError> {
        let healthy = self.healthy.load(Ordering::Relaxed);
        self.available.store(healthy, Ordering::Relaxed);
        Ok(healthy)
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    async fn save_video_notes(&self, data: &StoredVideoData) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::Relaxed) {
            return Err(StorageError::Network("scripted save failure".into()));
        }
        self.saved_ids.lock().unwrap().push(data.video_id.clone());
        self.videos
            .lock()
            .unwrap()
            .insert(data.video_id.clone(), data.clone());
        Ok(())
    }

    async fn load_video_notes(
        &self,
        video_id: &str,
    ) -> Result<Option<StoredVideoData>, StorageError> {
        if self.fail_loads.load(Ordering::Relaxed) {
            return Err(StorageError::Network("scripted load failure".into()));
        }
        Ok(self.videos.lock().unwrap().get(video_id).cloned())
    }

    async fn load_all_videos(&self) -> Result<Vec<StoredVideoData>, StorageError> {
        if self.fail_loads.load(Ordering::Relaxed) {
            return Err(StorageError::Network("scripted load failure".into()));
        }
        Ok(self.videos.lock().unwrap().values().cloned().collect())
    }

    async fn delete_video(&self, video_id: &str) -> Result<(), StorageError> {
        self.deleted_ids.lock().unwrap().push(video_id.to_string());
        self.videos.lock().unwrap().remove(video_id);
        Ok(())
    }

    async fn delete_all_notes(&self) -> Result<(), StorageError> {
        self.videos.lock().unwrap().clear();
        Ok(())
    }

    async fn sync_to_cloud(&self, videos: &[StoredVideoData]) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::Relaxed) {
            return Err(StorageError::Network("scripted batch failure".into()));
        }
        self.batch_sizes.lock().unwrap().push(videos.len());
        let mut store = self.videos.lock().unwrap();
        for video in videos {
            store.insert(video.video_id.clone(), video.clone());
        }
        Ok(())
    }
}

/// Local store that fails writes to chosen keys. Everything else
/// delegates to a `MemoryStore`.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_set_keys: Mutex<HashSet<String>>,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_writes_to(&self, key: &str) {
        self.fail_set_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn heal(&self) {
        self.fail_set_keys.lock().unwrap().clear();
    }
}

#[async_trait]
impl LocalStore for FlakyStore {
    fn backend_name(&self) -> &'static str {
        "flaky"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        if self.fail_set_keys.lock().unwrap().contains(key) {
            return Err(StorageError::Io(format!("injected write failure for {key}")));
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key).await
    }

    async fn get_all(&self) -> Result<BTreeMap<String, Value>, StorageError> {
        self.inner.get_all().await
    }

    async fn bytes_in_use(&self) -> Result<u64, StorageError> {
        self.inner.bytes_in_use().await
    }
}
