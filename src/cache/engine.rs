//! Cache consistency engine.
//!
//! Four operations decide how a collection's cache entries relate to the
//! backing store:
//!
//! - **read-through fetch**: serve the entry if present, otherwise query the
//!   backing store and populate the entry;
//! - **forced refresh**: overwrite the collection entry from the backing store;
//! - **write**: insert into the backing store only; the cache catches up when
//!   the resulting change event arrives;
//! - **change ingestion**: acknowledge at once and refresh the affected entries
//!   in a deferred task.
//!
//! Concurrent refreshes of one key are not coordinated. The last write to
//! reach the store wins.

use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};

use crate::application::context::CollectionContext;
use crate::application::repos::RepoError;
use crate::domain::change::ChangeEvent;
use crate::domain::error::DomainError;
use crate::domain::record::prepare_insert;

use super::adapter::CacheAdapter;
use super::config::{CacheConfig, PopulateMode};
use super::deferred::{DeferredRefresh, DeferredTasks};
use super::keys::CacheKey;
use super::planner::{ItemAction, RefreshPlan};

pub(crate) const METRIC_DEFERRED_REFRESH_MS: &str = "edgecache_deferred_refresh_ms";
pub(crate) const METRIC_DEFERRED_REFRESH_FAILED: &str = "edgecache_deferred_refresh_failed_total";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("resource not found")]
    NotFound,
    #[error("invalid write: {0}")]
    Invalid(#[from] DomainError),
    #[error("insert rejected: {0}")]
    InsertRejected(#[source] RepoError),
    #[error(transparent)]
    Backing(#[from] RepoError),
}

/// Where a fetched value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache,
    BackingStore,
}

impl Origin {
    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Cache => "HIT",
            Origin::BackingStore => "MISS",
        }
    }
}

/// Result of a read-through fetch.
#[derive(Debug)]
pub struct Fetched<T> {
    pub value: T,
    pub origin: Origin,
    /// Background cache population, when the populate mode defers it.
    pub pending: Option<DeferredRefresh>,
}

/// Acknowledgement of a forced refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefreshAck {
    pub cache_updated: bool,
}

/// Acknowledgement of a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChangeAck {
    pub received: bool,
}

/// Acknowledgement plus the deferred refresh it scheduled, if any.
#[derive(Debug)]
pub struct ChangeReceipt {
    pub ack: ChangeAck,
    pub deferred: Option<DeferredRefresh>,
}

pub struct CacheConsistencyEngine {
    config: CacheConfig,
    deferred: DeferredTasks,
}

impl CacheConsistencyEngine {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            deferred: DeferredTasks::new(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn deferred(&self) -> &DeferredTasks {
        &self.deferred
    }

    /// Read-through fetch of a whole collection.
    #[instrument(skip_all, fields(collection = %ctx.spec.name))]
    pub async fn fetch_collection(
        &self,
        ctx: &CollectionContext,
    ) -> Result<Fetched<Vec<Value>>, EngineError> {
        let key = CacheKey::collection(&ctx.spec);
        if let Some(rows) = ctx.cache.read::<Vec<Value>>(&key).await {
            return Ok(Fetched {
                value: rows,
                origin: Origin::Cache,
                pending: None,
            });
        }

        let rows = ctx.backing.fetch_collection(&ctx.spec.table).await?;
        debug!(key = %key, rows = rows.len(), "fetched collection from backing store");

        let pending = self
            .populate(&ctx.cache, key, Value::Array(rows.clone()))
            .await;
        Ok(Fetched {
            value: rows,
            origin: Origin::BackingStore,
            pending,
        })
    }

    /// Read-through fetch of one row. Collections cached as a whole have no items.
    #[instrument(skip_all, fields(collection = %ctx.spec.name, id = %id))]
    pub async fn fetch_item(
        &self,
        ctx: &CollectionContext,
        id: &str,
    ) -> Result<Fetched<Value>, EngineError> {
        if !ctx.spec.supports_items() {
            return Err(EngineError::NotFound);
        }

        let key = CacheKey::item(&ctx.spec, id);
        if let Some(row) = ctx.cache.read::<Value>(&key).await {
            return Ok(Fetched {
                value: row,
                origin: Origin::Cache,
                pending: None,
            });
        }

        let row = ctx
            .backing
            .fetch_item(&ctx.spec.table, &ctx.spec.id_field, id)
            .await?
            .ok_or(EngineError::NotFound)?;

        let pending = self.populate(&ctx.cache, key, row.clone()).await;
        Ok(Fetched {
            value: row,
            origin: Origin::BackingStore,
            pending,
        })
    }

    /// Overwrite the collection entry from the backing store, ignoring the cache.
    ///
    /// A failed cache write is reported through `cache_updated`, not as an error.
    #[instrument(skip_all, fields(collection = %ctx.spec.name))]
    pub async fn refresh_collection(
        &self,
        ctx: &CollectionContext,
    ) -> Result<RefreshAck, EngineError> {
        let key = CacheKey::collection(&ctx.spec);
        let rows = ctx.backing.fetch_collection(&ctx.spec.table).await?;

        let cache_updated = match ctx.cache.write(&key, &rows).await {
            Ok(()) => {
                info!(key = %key, rows = rows.len(), "collection cache refreshed");
                true
            }
            Err(err) => {
                warn!(key = %key, error = %err, "collection refresh could not be cached");
                false
            }
        };

        Ok(RefreshAck { cache_updated })
    }

    /// Insert a client-supplied row. The cache is left untouched.
    #[instrument(skip_all, fields(collection = %ctx.spec.name))]
    pub async fn insert_record(
        &self,
        ctx: &CollectionContext,
        payload: Value,
    ) -> Result<Vec<Value>, EngineError> {
        if !ctx.spec.accepts_writes {
            return Err(DomainError::validation(format!(
                "collection `{}` does not accept writes",
                ctx.spec.name
            ))
            .into());
        }

        let row = prepare_insert(payload, &ctx.spec.required_fields)?;
        let inserted = ctx
            .backing
            .insert(&ctx.spec.table, row)
            .await
            .map_err(|err| {
                if err.is_rejection() {
                    EngineError::InsertRejected(err)
                } else {
                    EngineError::Backing(err)
                }
            })?;

        info!(rows = inserted.len(), "record inserted; cache awaits change event");
        Ok(inserted)
    }

    /// Accept a change event and schedule the refresh it implies.
    ///
    /// Returns before any I/O happens. Events addressed to another table are
    /// acknowledged and dropped.
    pub fn ingest_change(&self, ctx: &CollectionContext, event: ChangeEvent) -> ChangeReceipt {
        let ack = ChangeAck { received: true };

        if !event.targets(&ctx.spec.table) {
            warn!(
                collection = %ctx.spec.name,
                expected_table = %ctx.spec.table,
                event_table = event.table.as_deref().unwrap_or(""),
                "change event addressed to another table; ignoring"
            );
            return ChangeReceipt {
                ack,
                deferred: None,
            };
        }

        let plan = RefreshPlan::for_event(&event, &ctx.spec);
        info!(
            collection = %ctx.spec.name,
            event_kind = event.kind.as_str(),
            plan = %plan,
            "change event accepted"
        );

        let deferred = self.deferred.spawn(
            "change_refresh",
            apply_plan(ctx.clone(), plan, OffsetDateTime::now_utc()),
        );

        ChangeReceipt {
            ack,
            deferred: Some(deferred),
        }
    }

    async fn populate(
        &self,
        cache: &CacheAdapter,
        key: CacheKey,
        value: Value,
    ) -> Option<DeferredRefresh> {
        match self.config.populate {
            PopulateMode::Inline => {
                store_entry(cache, &key, &value).await;
                None
            }
            PopulateMode::Background => {
                let cache = cache.clone();
                Some(self.deferred.spawn("populate", async move {
                    store_entry(&cache, &key, &value).await;
                }))
            }
        }
    }
}

async fn store_entry(cache: &CacheAdapter, key: &CacheKey, value: &Value) -> bool {
    match cache.write(key, value).await {
        Ok(()) => {
            debug!(key = %key, "cache populated");
            true
        }
        Err(err) => {
            warn!(key = %key, error = %err, "cache write failed; continuing without it");
            false
        }
    }
}

async fn apply_plan(ctx: CollectionContext, plan: RefreshPlan, received_at: OffsetDateTime) {
    let started = Instant::now();
    let mut failed = false;

    match &plan.item {
        Some(ItemAction::Reload { id }) => {
            let key = CacheKey::item(&ctx.spec, id);
            match ctx
                .backing
                .fetch_item(&ctx.spec.table, &ctx.spec.id_field, id)
                .await
            {
                Ok(Some(row)) => failed |= !store_entry(&ctx.cache, &key, &row).await,
                Ok(None) => {
                    debug!(key = %key, "row no longer exists; removing item entry");
                    failed |= !remove_entry(&ctx.cache, &key).await;
                }
                Err(err) => {
                    error!(key = %key, error = %err, "item reload failed");
                    failed = true;
                }
            }
        }
        Some(ItemAction::Evict { id }) => {
            failed |= !remove_entry(&ctx.cache, &CacheKey::item(&ctx.spec, id)).await;
        }
        None => {}
    }

    if plan.refresh_collection {
        let key = CacheKey::collection(&ctx.spec);
        match ctx.backing.fetch_collection(&ctx.spec.table).await {
            Ok(rows) => failed |= !store_entry(&ctx.cache, &key, &Value::Array(rows)).await,
            Err(err) => {
                error!(key = %key, error = %err, "collection refresh failed");
                failed = true;
            }
        }
    }

    let lag_ms = (OffsetDateTime::now_utc() - received_at).whole_milliseconds();
    histogram!(METRIC_DEFERRED_REFRESH_MS, "collection" => ctx.name().to_string())
        .record(started.elapsed().as_secs_f64() * 1000.0);

    if failed {
        counter!(METRIC_DEFERRED_REFRESH_FAILED, "collection" => ctx.name().to_string())
            .increment(1);
        warn!(collection = %ctx.spec.name, plan = %plan, lag_ms, "change refresh incomplete");
    } else {
        info!(collection = %ctx.spec.name, plan = %plan, lag_ms, "change refresh applied");
    }
}

async fn remove_entry(cache: &CacheAdapter, key: &CacheKey) -> bool {
    match cache.remove(key).await {
        Ok(()) => true,
        Err(err) => {
            warn!(key = %key, error = %err, "cache removal failed");
            false
        }
    }
}
