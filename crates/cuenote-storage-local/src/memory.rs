use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use cuenote_storage_core::{LocalStore, StorageError};
use serde_json::Value;

/// In-memory `LocalStore`.
///
/// No persistence. Used by tests and by tooling that wants a scratch
/// store without touching the filesystem.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Value>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Value>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.write().remove(key);
        Ok(())
    }

    async fn get_all(&self) -> Result<BTreeMap<String, Value>, StorageError> {
        Ok(self.read().clone())
    }

    async fn bytes_in_use(&self) -> Result<u64, StorageError> {
        let entries = self.read();
        let mut total = 0u64;
        for (key, value) in entries.iter() {
            total += key.len() as u64;
            total += serde_json::to_vec(value)
                .map(|v| v.len() as u64)
                .unwrap_or(0);
        }
        Ok(total)
    }
}
