use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cuenote_storage_core::{LocalStore, StorageError};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::fs;
use tracing::{debug, instrument, warn};

/// Filesystem-backed `LocalStore`.
///
/// One JSON document per key:
/// ```text
/// {base_dir}/
///   kv/
///     {percent-encoded key}.json
/// ```
/// Keys are percent-encoded so arbitrary ids (slashes, colons, dots)
/// stay round-trippable through filenames. Writes go through a temp
/// file plus rename so a crash never leaves a half-written value.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a new FileStore rooted at the given directory.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    fn kv_dir(&self) -> PathBuf {
        self.base_dir.join("kv")
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.kv_dir()
            .join(format!("{}.json", urlencoding::encode(key)))
    }

    async fn ensure_kv_dir(&self) -> Result<(), StorageError> {
        let dir = self.kv_dir();
        fs::create_dir_all(&dir).await.map_err(|e| {
            StorageError::Io(format!("Failed to create store dir {}: {}", dir.display(), e))
        })?;
        Ok(())
    }

    fn map_write_err(path: &Path, e: std::io::Error) -> StorageError {
        if e.kind() == std::io::ErrorKind::StorageFull {
            StorageError::QuotaExceeded(format!("{}: {}", path.display(), e))
        } else {
            StorageError::Io(format!("Failed to write {}: {}", path.display(), e))
        }
    }
}

#[async_trait]
impl LocalStore for FileStore {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.entry_path(key);
        match fs::read(&path).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|e| {
                    StorageError::Serialization(format!(
                        "Failed to parse {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.ensure_kv_dir().await?;
        let path = self.entry_path(key);

        let content = serde_json::to_vec(&value)
            .map_err(|e| StorageError::Serialization(format!("Failed to serialize {}: {}", key, e)))?;

        // Write atomically via temp file
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content)
            .await
            .map_err(|e| Self::map_write_err(&temp_path, e))?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| Self::map_write_err(&path, e))?;

        debug!("Stored {} ({} bytes)", key, content.len());
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.entry_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_all(&self) -> Result<BTreeMap<String, Value>, StorageError> {
        let dir = self.kv_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(StorageError::Io(format!(
                    "Failed to list {}: {}",
                    dir.display(),
                    e
                )))
            }
        };

        let mut all = BTreeMap::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            StorageError::Io(format!("Failed to list {}: {}", dir.display(), e))
        })? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let key = match urlencoding::decode(stem) {
                Ok(k) => k.into_owned(),
                Err(e) => {
                    warn!("Skipping undecodable store file {}: {}", path.display(), e);
                    continue;
                }
            };
            match self.get(&key).await {
                Ok(Some(value)) => {
                    all.insert(key, value);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Skipping unreadable store entry '{}': {}", key, e);
                }
            }
        }

        debug!("Enumerated {} entries", all.len());
        Ok(all)
    }

    async fn bytes_in_use(&self) -> Result<u64, StorageError> {
        let dir = self.kv_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(StorageError::Io(format!(
                    "Failed to list {}: {}",
                    dir.display(),
                    e
                )))
            }
        };

        let mut total = 0u64;
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            StorageError::Io(format!("Failed to list {}: {}", dir.display(), e))
        })? {
            if let Ok(meta) = entry.metadata().await {
                if meta.is_file() {
                    total += meta.len();
                }
            }
        }
        Ok(total)
    }
}
