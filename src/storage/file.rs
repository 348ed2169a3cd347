//! File-backed persistent store: one file per key, replaced atomically.

use super::{PersistentStore, StoreKey};
use crate::core::{HistoryError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// On-disk encoding of stored values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreCodec {
    #[default]
    Json,
    MessagePack,
}

impl StoreCodec {
    fn extension(&self) -> &'static str {
        match self {
            StoreCodec::Json => "json",
            StoreCodec::MessagePack => "msgpack",
        }
    }

    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>> {
        match self {
            StoreCodec::Json => Ok(serde_json::to_vec_pretty(value)?),
            StoreCodec::MessagePack => rmp_serde::to_vec(value)
                .map_err(|e| HistoryError::Serialization(format!("Failed to encode value: {}", e))),
        }
    }

    fn decode(&self, data: &[u8]) -> Result<serde_json::Value> {
        match self {
            StoreCodec::Json => Ok(serde_json::from_slice(data)?),
            StoreCodec::MessagePack => rmp_serde::from_slice(data)
                .map_err(|e| HistoryError::Serialization(format!("Failed to decode value: {}", e))),
        }
    }
}

pub struct FileStore {
    data_dir: PathBuf,
    codec: StoreCodec,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(data_dir: P, codec: StoreCodec) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir).map_err(|e| {
            HistoryError::Storage(format!(
                "Failed to create data directory {}: {}",
                data_dir.display(),
                e
            ))
        })?;
        Ok(Self { data_dir, codec })
    }

    pub fn path_for(&self, key: StoreKey) -> PathBuf {
        self.data_dir.join(format!("{}.{}", key.as_str(), self.codec.extension()))
    }
}

fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| HistoryError::Storage(format!("Failed to create temp file: {}", e)))?;
    temp.write_all(bytes)
        .map_err(|e| HistoryError::Storage(format!("Failed to write {}: {}", path.display(), e)))?;
    temp.flush()
        .map_err(|e| HistoryError::Storage(format!("Failed to flush {}: {}", path.display(), e)))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| HistoryError::Storage(format!("Failed to sync {}: {}", path.display(), e)))?;
    temp.persist(path).map_err(|e| {
        HistoryError::Storage(format!("Failed to rename into {}: {}", path.display(), e))
    })?;
    Ok(())
}

#[async_trait]
impl PersistentStore for FileStore {
    async fn get(&self, key: StoreKey) -> Result<Option<serde_json::Value>> {
        let path = self.path_for(key);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(HistoryError::Storage(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        self.codec.decode(&data).map(Some)
    }

    async fn set(&self, key: StoreKey, value: serde_json::Value) -> Result<()> {
        let bytes = self.codec.encode(&value)?;
        let dir = self.data_dir.clone();
        let path = self.path_for(key);
        tokio::task::spawn_blocking(move || write_atomically(&dir, &path, &bytes))
            .await
            .map_err(|e| HistoryError::Storage(format!("store write task: {}", e)))?
    }
}
