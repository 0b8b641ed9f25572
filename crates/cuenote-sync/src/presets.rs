use std::collections::BTreeMap;
use std::sync::Arc;

use cuenote_storage_core::StorageError;
use tracing::instrument;

use crate::adapter::StorageAdapter;
use crate::keys;

/// Numbered template lists, one per preset slot.
pub struct PresetsRepository {
    adapter: Arc<StorageAdapter>,
}

impl PresetsRepository {
    pub fn new(adapter: Arc<StorageAdapter>) -> Self {
        Self { adapter }
    }

    pub async fn get(&self, slot: u32) -> Result<Option<Vec<String>>, StorageError> {
        match self.adapter.get(&keys::preset_key(slot)).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StorageError::Serialization(format!("decode preset {slot}: {e}"))),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, templates), level = "debug")]
    pub async fn set(&self, slot: u32, templates: Vec<String>) -> Result<(), StorageError> {
        let value = serde_json::to_value(templates)
            .map_err(|e| StorageError::Serialization(format!("encode preset {slot}: {e}")))?;
        self.adapter.set(&keys::preset_key(slot), value).await
    }

    pub async fn remove(&self, slot: u32) -> Result<(), StorageError> {
        self.adapter.remove(&keys::preset_key(slot)).await
    }

    /// All stored presets by slot number.
    pub async fn list(&self) -> Result<BTreeMap<u32, Vec<String>>, StorageError> {
        let entries = self.adapter.get_all().await?;
        let mut presets = BTreeMap::new();
        for (key, value) in entries {
            let Some(slot) = keys::parse_preset_number(&key) else {
                continue;
            };
            let templates: Vec<String> = serde_json::from_value(value)
                .map_err(|e| StorageError::Serialization(format!("decode preset {slot}: {e}")))?;
            presets.insert(slot, templates);
        }
        Ok(presets)
    }
}
