//! Edge cache
//!
//! Keeps one KV entry per logical resource in front of the backing store:
//!
//! - **Collection entries** (`/{collection}`): every row of a table, as a JSON array
//! - **Item entries** (`/{collection}/{id}`): one row, as a JSON object
//!
//! Entries never expire. They are created by read-through misses and
//! overwritten by forced refreshes and change events; item entries are
//! removed by DELETE events.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! backend = "memory"     # or "cloudflare"
//! populate = "inline"    # or "background"
//! ```

mod adapter;
mod config;
mod deferred;
mod engine;
mod keys;
mod lock;
mod planner;
mod store;

pub use adapter::CacheAdapter;
pub use adapter::CacheError;
pub use config::{CacheConfig, PopulateMode};
pub use deferred::{DeferredRefresh, DeferredTasks};
pub use engine::{
    CacheConsistencyEngine, ChangeAck, ChangeReceipt, EngineError, Fetched, Origin, RefreshAck,
};
pub use keys::CacheKey;
pub use planner::{ItemAction, RefreshPlan};
pub use store::{KeyValueStore, MemoryKvStore, StoreError};

pub(crate) use adapter::{
    METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_CACHE_READ_ERROR, METRIC_CACHE_WRITE_ERROR,
};
pub(crate) use deferred::METRIC_DEFERRED_IN_FLIGHT;
pub(crate) use engine::{METRIC_DEFERRED_REFRESH_FAILED, METRIC_DEFERRED_REFRESH_MS};
