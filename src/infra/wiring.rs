//! Builds per-collection contexts from settings.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::application::context::{CollectionContext, CollectionRegistry};
use crate::application::repos::BackingStore;
use crate::cache::{CacheAdapter, KeyValueStore, MemoryKvStore};
use crate::config::{BackingKind, CacheBackend, Settings};

use super::cloudflare::CloudflareKvStore;
use super::error::InfraError;
use super::memory::MemoryBackingStore;
use super::postgrest::PostgrestStore;

/// Construct the backing store selected by `backing.kind`.
pub fn build_backing(settings: &Settings) -> Result<Arc<dyn BackingStore>, InfraError> {
    let backing: Arc<dyn BackingStore> = match settings.backing.kind {
        BackingKind::Postgrest => Arc::new(PostgrestStore::new(&settings.backing)?),
        BackingKind::Memory => Arc::new(MemoryBackingStore::new()),
    };
    Ok(backing)
}

/// One context per configured collection. Collections naming the same KV
/// namespace share a store handle.
pub fn build_registry(
    settings: &Settings,
    backing: Arc<dyn BackingStore>,
) -> Result<CollectionRegistry, InfraError> {
    let mut stores: HashMap<&str, Arc<dyn KeyValueStore>> = HashMap::new();
    let mut registry = CollectionRegistry::new();

    for collection in &settings.collections {
        let namespace = collection.kv_namespace.as_str();
        let store = match stores.get(namespace) {
            Some(store) => Arc::clone(store),
            None => {
                let store = build_store(settings, namespace)?;
                stores.insert(namespace, Arc::clone(&store));
                store
            }
        };

        info!(
            collection = %collection.spec.name,
            table = %collection.spec.table,
            granularity = ?collection.spec.granularity,
            namespace,
            store = store.kind(),
            "collection registered"
        );

        registry
            .register(CollectionContext::new(
                collection.spec.clone(),
                Arc::clone(&backing),
                CacheAdapter::new(namespace, store),
            ))
            .map_err(|err| InfraError::configuration(err.to_string()))?;
    }

    Ok(registry)
}

fn build_store(settings: &Settings, namespace: &str) -> Result<Arc<dyn KeyValueStore>, InfraError> {
    match settings.cache.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryKvStore::new())),
        CacheBackend::Cloudflare => {
            let cloudflare = settings.cache.cloudflare.as_ref().ok_or_else(|| {
                InfraError::configuration("cache.cloudflare settings are missing")
            })?;
            Ok(Arc::new(CloudflareKvStore::new(cloudflare, namespace)?))
        }
    }
}
