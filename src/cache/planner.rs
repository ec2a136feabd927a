//! Refresh plan generation.
//!
//! Turns one change event into the cache actions the deferred refresh runs.
//! Planning is pure so the consistency rules can be tested without I/O.

use std::fmt;

use crate::domain::change::{ChangeEvent, ChangeKind};
use crate::domain::collection::CollectionSpec;

/// What happens to an item-level entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemAction {
    /// Re-query the row and overwrite its entry (or remove it if the row is gone).
    Reload { id: String },
    /// Remove the entry without consulting the backing store.
    Evict { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPlan {
    pub item: Option<ItemAction>,
    /// Re-query the whole collection and overwrite the collection entry.
    pub refresh_collection: bool,
}

impl fmt::Display for RefreshPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.item {
            Some(ItemAction::Reload { id }) => write!(f, "reload item {id}")?,
            Some(ItemAction::Evict { id }) => write!(f, "evict item {id}")?,
            None => f.write_str("no item action")?,
        }
        if self.refresh_collection {
            f.write_str(", refresh collection")?;
        }
        Ok(())
    }
}

impl RefreshPlan {
    /// Plan the cache work for `event` against `spec`.
    ///
    /// - Collection granularity: every event refreshes the collection entry.
    /// - Item granularity, insert/update: reload the item, refresh the collection.
    /// - Item granularity, delete: evict the item and refresh the collection
    ///   unless the collection opts out.
    /// - Item granularity without a resolvable id: refresh the collection.
    pub fn for_event(event: &ChangeEvent, spec: &CollectionSpec) -> Self {
        if !spec.supports_items() {
            return Self::collection_only();
        }

        let Some(id) = event.subject_id(&spec.id_field) else {
            return Self::collection_only();
        };

        match event.kind {
            ChangeKind::Insert | ChangeKind::Update => Self {
                item: Some(ItemAction::Reload { id }),
                refresh_collection: true,
            },
            ChangeKind::Delete => Self {
                item: Some(ItemAction::Evict { id }),
                refresh_collection: spec.refresh_collection_on_delete,
            },
        }
    }

    fn collection_only() -> Self {
        Self {
            item: None,
            refresh_collection: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.item.is_none() && !self.refresh_collection
    }
}
