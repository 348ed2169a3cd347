pub mod file;
pub mod memory;

pub use file::{FileStore, StoreCodec};
pub use memory::MemoryStore;

use crate::core::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// Keys of the persistent key-value store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Closed-object history, most recent first
    History,
    /// Durable copy of the live registry
    RegistrySnapshot,
    /// Settings shared with the UI
    Settings,
}

impl StoreKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::History => "history",
            StoreKey::RegistrySnapshot => "registrySnapshot",
            StoreKey::Settings => "settings",
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whole-value durable key-value store.
///
/// Only full get/set of a key is assumed; there are no partial-field updates.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn get(&self, key: StoreKey) -> Result<Option<serde_json::Value>>;

    async fn set(&self, key: StoreKey, value: serde_json::Value) -> Result<()>;
}

/// Read a key and decode it into `T`
pub async fn load<T: DeserializeOwned>(
    store: &dyn PersistentStore,
    key: StoreKey,
) -> Result<Option<T>> {
    match store.get(key).await? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
    }
}

/// Encode `value` and write it under `key`, replacing the previous value
pub async fn save<T: Serialize + ?Sized>(
    store: &dyn PersistentStore,
    key: StoreKey,
    value: &T,
) -> Result<()> {
    let encoded = serde_json::to_value(value)?;
    store.set(key, encoded).await
}
