//! Per-request collaborators for the consistency engine.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::CacheAdapter;
use crate::domain::collection::CollectionSpec;
use crate::domain::error::DomainError;

use super::repos::BackingStore;

/// Everything one engine operation needs about one collection.
///
/// Built once per collection at startup and handed to every operation; the
/// engine keeps none of it between calls.
#[derive(Clone)]
pub struct CollectionContext {
    pub spec: Arc<CollectionSpec>,
    pub backing: Arc<dyn BackingStore>,
    pub cache: CacheAdapter,
}

impl CollectionContext {
    pub fn new(spec: CollectionSpec, backing: Arc<dyn BackingStore>, cache: CacheAdapter) -> Self {
        Self {
            spec: Arc::new(spec),
            backing,
            cache,
        }
    }

    pub fn name(&self) -> &str {
        self.spec.name.as_str()
    }
}

/// Configured collections, keyed by name.
#[derive(Clone, Default)]
pub struct CollectionRegistry {
    contexts: BTreeMap<String, CollectionContext>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, context: CollectionContext) -> Result<(), DomainError> {
        let name = context.name().to_string();
        if self.contexts.contains_key(&name) {
            return Err(DomainError::validation(format!(
                "collection `{name}` is registered twice"
            )));
        }
        self.contexts.insert(name, context);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CollectionContext> {
        self.contexts.get(name)
    }

    /// Contexts in name order.
    pub fn iter(&self) -> impl Iterator<Item = &CollectionContext> {
        self.contexts.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.contexts.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryKvStore;
    use crate::domain::collection::{CollectionName, Granularity};
    use crate::infra::memory::MemoryBackingStore;

    fn context(name: &str) -> CollectionContext {
        let spec = CollectionSpec::new(
            CollectionName::parse(name).expect("valid name"),
            Granularity::Collection,
        );
        CollectionContext::new(
            spec,
            Arc::new(MemoryBackingStore::new()),
            CacheAdapter::new(name, Arc::new(MemoryKvStore::new())),
        )
    }

    #[test]
    fn registers_and_lists_in_name_order() {
        let mut registry = CollectionRegistry::new();
        registry.register(context("weather")).expect("register");
        registry.register(context("articles")).expect("register");

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["articles", "weather"]);
        assert_eq!(
            registry.get("weather").map(CollectionContext::name),
            Some("weather")
        );
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut registry = CollectionRegistry::new();
        registry.register(context("weather")).expect("register");
        assert!(registry.register(context("weather")).is_err());
        assert_eq!(registry.len(), 1);
    }
}
