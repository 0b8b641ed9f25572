use std::sync::Arc;

use cuenote_storage_core::StorageError;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::instrument;

use crate::adapter::StorageAdapter;
use crate::keys;

/// The consolidated settings document: one JSON object under one key.
pub type SettingsDocument = Map<String, Value>;

/// Cached access to the singleton settings document.
///
/// Single document, idempotent overwrite: no locking beyond the cache
/// guard. `update` is the read-modify-write entry point.
pub struct SettingsRepository {
    adapter: Arc<StorageAdapter>,
    cached: RwLock<Option<SettingsDocument>>,
}

impl SettingsRepository {
    pub fn new(adapter: Arc<StorageAdapter>) -> Self {
        Self {
            adapter,
            cached: RwLock::new(None),
        }
    }

    /// Current settings, from cache when warm.
    pub async fn get(&self) -> Result<SettingsDocument, StorageError> {
        if let Some(doc) = self.cached.read().await.as_ref() {
            return Ok(doc.clone());
        }

        let doc = match self.adapter.get(keys::USER_SETTINGS).await? {
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(StorageError::Serialization(format!(
                    "settings document is not an object: {other}"
                )))
            }
            None => SettingsDocument::new(),
        };
        *self.cached.write().await = Some(doc.clone());
        Ok(doc)
    }

    /// Replace the whole document.
    #[instrument(skip(self, doc), level = "debug")]
    pub async fn set(&self, doc: SettingsDocument) -> Result<(), StorageError> {
        self.adapter
            .set(keys::USER_SETTINGS, Value::Object(doc.clone()))
            .await?;
        *self.cached.write().await = Some(doc);
        Ok(())
    }

    /// Read-modify-write the document, returning the stored result.
    pub async fn update<F>(&self, f: F) -> Result<SettingsDocument, StorageError>
    where
        F: FnOnce(&mut SettingsDocument),
    {
        let mut doc = self.get().await?;
        f(&mut doc);
        self.set(doc.clone()).await?;
        Ok(doc)
    }

    /// Drop the cached copy, e.g. after an external change notification.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}
