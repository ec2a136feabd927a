//! Typed access to a key-value store.
//!
//! Reads fail open: any store or decoding problem is logged and reported as a
//! miss. Writes and removals report failures to the caller, which decides
//! whether they matter. Nothing here retries.

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use super::keys::CacheKey;
use super::store::{KeyValueStore, StoreError};

pub(crate) const METRIC_CACHE_HIT: &str = "edgecache_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "edgecache_cache_miss_total";
pub(crate) const METRIC_CACHE_READ_ERROR: &str = "edgecache_cache_read_error_total";
pub(crate) const METRIC_CACHE_WRITE_ERROR: &str = "edgecache_cache_write_error_total";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to encode value for `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write `{key}`: {source}")]
    Write {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to remove `{key}`: {source}")]
    Remove {
        key: String,
        #[source]
        source: StoreError,
    },
}

/// Cache handle for one KV namespace.
#[derive(Clone)]
pub struct CacheAdapter {
    namespace: Arc<str>,
    store: Arc<dyn KeyValueStore>,
}

impl CacheAdapter {
    pub fn new(namespace: impl Into<Arc<str>>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            namespace: namespace.into(),
            store,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Look up `key`. Store failures and undecodable payloads count as misses.
    pub async fn read<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let bytes = match self.store.get(key.as_str()).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                counter!(METRIC_CACHE_MISS, "namespace" => self.namespace.to_string())
                    .increment(1);
                debug!(namespace = %self.namespace, key = %key, "cache miss");
                return None;
            }
            Err(err) => {
                self.record_read_error(key, &err);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                counter!(METRIC_CACHE_HIT, "namespace" => self.namespace.to_string())
                    .increment(1);
                debug!(namespace = %self.namespace, key = %key, "cache hit");
                Some(value)
            }
            Err(err) => {
                self.record_read_error(key, &err);
                None
            }
        }
    }

    /// Replace the entry under `key` with `value`.
    pub async fn write<T: Serialize + ?Sized>(
        &self,
        key: &CacheKey,
        value: &T,
    ) -> Result<(), CacheError> {
        let encoded = serde_json::to_vec(value).map_err(|source| CacheError::Encode {
            key: key.to_string(),
            source,
        })?;

        self.store
            .put(key.as_str(), Bytes::from(encoded))
            .await
            .map_err(|source| {
                counter!(METRIC_CACHE_WRITE_ERROR, "namespace" => self.namespace.to_string())
                    .increment(1);
                CacheError::Write {
                    key: key.to_string(),
                    source,
                }
            })
    }

    /// Delete the entry under `key`. Absent keys are not an error.
    pub async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.store
            .delete(key.as_str())
            .await
            .map_err(|source| {
                counter!(METRIC_CACHE_WRITE_ERROR, "namespace" => self.namespace.to_string())
                    .increment(1);
                CacheError::Remove {
                    key: key.to_string(),
                    source,
                }
            })
    }

    fn record_read_error(&self, key: &CacheKey, err: &dyn std::error::Error) {
        counter!(METRIC_CACHE_READ_ERROR, "namespace" => self.namespace.to_string()).increment(1);
        warn!(
            namespace = %self.namespace,
            store = self.store.kind(),
            key = %key,
            error = %err,
            "cache read failed; treating as miss"
        );
    }
}
