//! Backing-store contract.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("backing store unreachable: {0}")]
    Unavailable(String),
    #[error("backing store returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("backing store response could not be decoded: {0}")]
    Decode(String),
}

impl RepoError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }

    /// The store understood the request and refused it (4xx).
    pub fn is_rejection(&self) -> bool {
        matches!(self, RepoError::Status { status, .. } if (400..500).contains(status))
    }
}

/// System of record the cache sits in front of.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Every row of `table`.
    async fn fetch_collection(&self, table: &str) -> Result<Vec<Value>, RepoError>;

    /// The row of `table` whose `id_field` equals `id`, if any.
    async fn fetch_item(
        &self,
        table: &str,
        id_field: &str,
        id: &str,
    ) -> Result<Option<Value>, RepoError>;

    /// Insert `row` and return the stored representation.
    async fn insert(&self, table: &str, row: Map<String, Value>) -> Result<Vec<Value>, RepoError>;
}
