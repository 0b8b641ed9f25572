use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;

/// Local persistent key-value store.
///
/// Always available, single-device, and the durability anchor of the
/// engine: every write lands here before the cloud is even attempted.
/// Values are JSON documents; the engine owns the key layout.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Returns the backend identifier (e.g. "file", "memory").
    fn backend_name(&self) -> &'static str;

    /// Load the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Enumerate every stored key/value pair.
    async fn get_all(&self) -> Result<BTreeMap<String, Value>, StorageError>;

    /// Approximate storage footprint in bytes, for quota reporting.
    async fn bytes_in_use(&self) -> Result<u64, StorageError>;
}
