//! Key-value store contract and the in-process implementation.
//!
//! Stores only move bytes; serialization lives in [`super::adapter::CacheAdapter`].
//! Per-key atomicity is the only guarantee callers get.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl StoreError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Durable, key-addressed byte store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Short label used in logs and metrics.
    fn kind(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Replace the value under `key`.
    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local store. Entries live until overwritten or deleted.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, Bytes>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        rw_read(&self.entries, SOURCE, "contains").contains_key(key)
    }

    /// Sorted snapshot of stored keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = rw_read(&self.entries, SOURCE, "keys")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(rw_read(&self.entries, SOURCE, "get").get(key).cloned())
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        rw_write(&self.entries, SOURCE, "put").insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        rw_write(&self.entries, SOURCE, "delete").remove(key);
        Ok(())
    }
}
