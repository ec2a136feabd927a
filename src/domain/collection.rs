//! Collection descriptors.
//!
//! A collection is a named set of rows in the backing store that is cached as
//! one unit. Collections configured with item granularity additionally cache
//! each row under its own key.

use std::fmt;

use serde::Deserialize;

use super::error::DomainError;

const MAX_NAME_LEN: usize = 64;

/// Validated collection name used both as a route segment and a cache key segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionName(String);

impl CollectionName {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(DomainError::invalid_name(raw, "must not be empty"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(DomainError::invalid_name(raw, "must be at most 64 characters"));
        }
        if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Err(DomainError::invalid_name(
                raw,
                "must start with a lowercase ASCII letter",
            ));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Err(DomainError::invalid_name(
                raw,
                "may only contain lowercase letters, digits, `_` and `-`",
            ));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How finely a collection is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One entry for the whole collection.
    #[default]
    Collection,
    /// One entry for the collection plus one per row.
    Item,
}

/// Fully-resolved description of a cached collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub name: CollectionName,
    /// Backing-store table the collection reads from.
    pub table: String,
    pub granularity: Granularity,
    /// Column that identifies a row.
    pub id_field: String,
    pub refresh_path: String,
    pub webhook_path: String,
    pub accepts_writes: bool,
    /// Fields a client write must carry. When non-empty, only these are inserted.
    pub required_fields: Vec<String>,
    /// Refresh the collection entry after an item-level DELETE event. On by default.
    pub refresh_collection_on_delete: bool,
}

impl CollectionSpec {
    /// Spec with default routes for `name`, reading from a table of the same name.
    pub fn new(name: CollectionName, granularity: Granularity) -> Self {
        Self {
            table: name.as_str().to_string(),
            refresh_path: default_refresh_path(&name),
            webhook_path: default_webhook_path(&name),
            name,
            granularity,
            id_field: "id".to_string(),
            accepts_writes: false,
            required_fields: Vec::new(),
            refresh_collection_on_delete: true,
        }
    }

    /// Route of the collection, also used as its cache key.
    pub fn collection_path(&self) -> String {
        format!("/{}", self.name)
    }

    /// Route of one item, also used as its cache key.
    pub fn item_path(&self, id: &str) -> String {
        format!("/{}/{}", self.name, id)
    }

    pub fn supports_items(&self) -> bool {
        self.granularity == Granularity::Item
    }
}

pub fn default_refresh_path(name: &CollectionName) -> String {
    format!("/set-{name}")
}

pub fn default_webhook_path(name: &CollectionName) -> String {
    format!("/{name}/changes")
}
