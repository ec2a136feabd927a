//! In-process backing store for local development and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::application::repos::{BackingStore, RepoError};
use crate::domain::record::record_id;

/// Column the store fills in when an inserted row lacks one.
const GENERATED_ID_FIELD: &str = "id";

/// Tables of JSON rows kept in insertion order.
#[derive(Default)]
pub struct MemoryBackingStore {
    tables: RwLock<HashMap<String, Vec<Value>>>,
    rejection: RwLock<Option<String>>,
    unavailable: AtomicBool,
    collection_queries: AtomicUsize,
    item_queries: AtomicUsize,
}

impl MemoryBackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents of `table`.
    pub async fn seed(&self, table: &str, rows: Vec<Value>) {
        self.tables.write().await.insert(table.to_string(), rows);
    }

    /// Replace the row whose `id_field` matches, or append it.
    pub async fn upsert(&self, table: &str, id_field: &str, row: Value) {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        let id = record_id(&row, id_field);
        match rows
            .iter_mut()
            .find(|existing| id.is_some() && record_id(existing, id_field) == id)
        {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
    }

    /// Drop the row whose `id_field` equals `id`.
    pub async fn remove(&self, table: &str, id_field: &str, id: &str) {
        if let Some(rows) = self.tables.write().await.get_mut(table) {
            rows.retain(|row| record_id(row, id_field).as_deref() != Some(id));
        }
    }

    pub async fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .read()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Make every call fail as if the store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make inserts fail with a 400 carrying `message`.
    pub async fn reject_inserts(&self, message: impl Into<String>) {
        *self.rejection.write().await = Some(message.into());
    }

    pub fn collection_queries(&self) -> usize {
        self.collection_queries.load(Ordering::SeqCst)
    }

    pub fn item_queries(&self) -> usize {
        self.item_queries.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> Result<(), RepoError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepoError::unavailable("memory backing store switched off"));
        }
        Ok(())
    }
}

#[async_trait]
impl BackingStore for MemoryBackingStore {
    async fn fetch_collection(&self, table: &str) -> Result<Vec<Value>, RepoError> {
        self.collection_queries.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;
        Ok(self.rows(table).await)
    }

    async fn fetch_item(
        &self,
        table: &str,
        id_field: &str,
        id: &str,
    ) -> Result<Option<Value>, RepoError> {
        self.item_queries.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;
        Ok(self.tables.read().await.get(table).and_then(|rows| {
            rows.iter()
                .find(|row| record_id(row, id_field).as_deref() == Some(id))
                .cloned()
        }))
    }

    async fn insert(&self, table: &str, mut row: Map<String, Value>) -> Result<Vec<Value>, RepoError> {
        self.ensure_available()?;
        if let Some(message) = self.rejection.read().await.clone() {
            return Err(RepoError::Status {
                status: 400,
                message,
            });
        }

        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        if !row.contains_key(GENERATED_ID_FIELD) {
            let next = rows
                .iter()
                .filter_map(|existing| existing.get(GENERATED_ID_FIELD)?.as_u64())
                .max()
                .unwrap_or(0)
                + 1;
            row.insert(GENERATED_ID_FIELD.to_string(), Value::from(next));
        }

        let stored = Value::Object(row);
        rows.push(stored.clone());
        Ok(vec![stored])
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let store = MemoryBackingStore::new();
        store.seed("articles", vec![json!({"id": 4, "title": "old"})]).await;

        let mut row = Map::new();
        row.insert("title".to_string(), json!("new"));
        let inserted = store.insert("articles", row).await.expect("insert");

        assert_eq!(inserted, vec![json!({"id": 5, "title": "new"})]);
        assert_eq!(store.rows("articles").await.len(), 2);
    }

    #[tokio::test]
    async fn item_lookup_matches_string_and_numeric_ids() {
        let store = MemoryBackingStore::new();
        store
            .seed(
                "articles",
                vec![json!({"id": 42, "title": "a"}), json!({"id": "x1", "title": "b"})],
            )
            .await;

        let numeric = store.fetch_item("articles", "id", "42").await.expect("fetch");
        let textual = store.fetch_item("articles", "id", "x1").await.expect("fetch");
        let absent = store.fetch_item("articles", "id", "7").await.expect("fetch");

        assert_eq!(numeric, Some(json!({"id": 42, "title": "a"})));
        assert_eq!(textual, Some(json!({"id": "x1", "title": "b"})));
        assert_eq!(absent, None);
        assert_eq!(store.item_queries(), 3);
    }

    #[tokio::test]
    async fn upsert_and_remove_by_id() {
        let store = MemoryBackingStore::new();
        store.upsert("weather", "id", json!({"id": 1, "temp": 20})).await;
        store.upsert("weather", "id", json!({"id": 1, "temp": 25})).await;
        store.upsert("weather", "id", json!({"id": 2, "temp": 5})).await;

        assert_eq!(
            store.rows("weather").await,
            vec![json!({"id": 1, "temp": 25}), json!({"id": 2, "temp": 5})]
        );

        store.remove("weather", "id", "1").await;
        assert_eq!(store.rows("weather").await, vec![json!({"id": 2, "temp": 5})]);
    }

    #[tokio::test]
    async fn switched_off_store_reports_unavailable() {
        let store = MemoryBackingStore::new();
        store.set_unavailable(true);

        let err = store.fetch_collection("weather").await.unwrap_err();
        assert!(matches!(err, RepoError::Unavailable(_)));
        assert!(!err.is_rejection());
        assert_eq!(store.collection_queries(), 1);
    }
}
