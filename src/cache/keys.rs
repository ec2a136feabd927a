//! Cache key derivation.
//!
//! Keys mirror resource paths so an operator can read a KV namespace and see
//! which route each entry backs: `/weather`, `/articles`, `/articles/42`.

use std::fmt;

use crate::domain::collection::CollectionSpec;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a whole collection.
    pub fn collection(spec: &CollectionSpec) -> Self {
        Self(spec.collection_path())
    }

    /// Key for one row of a collection.
    pub fn item(spec: &CollectionSpec, id: &str) -> Self {
        Self(spec.item_path(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::collection::{CollectionName, Granularity};

    fn spec(name: &str) -> CollectionSpec {
        CollectionSpec::new(
            CollectionName::parse(name).expect("valid name"),
            Granularity::Item,
        )
    }

    #[test]
    fn keys_mirror_resource_paths() {
        let articles = spec("articles");
        assert_eq!(CacheKey::collection(&articles).as_str(), "/articles");
        assert_eq!(CacheKey::item(&articles, "42").as_str(), "/articles/42");
    }

    #[test]
    fn keys_are_stable_and_distinct() {
        let articles = spec("articles");
        assert_eq!(
            CacheKey::item(&articles, "7"),
            CacheKey::item(&articles, "7")
        );
        assert_ne!(
            CacheKey::collection(&articles),
            CacheKey::item(&articles, "7")
        );
        assert_ne!(
            CacheKey::collection(&articles),
            CacheKey::collection(&spec("weather"))
        );
    }

    #[test]
    fn table_does_not_leak_into_keys() {
        let mut weather = spec("weather");
        weather.table = "weather_readings".to_string();
        assert_eq!(CacheKey::collection(&weather).to_string(), "/weather");
    }
}
