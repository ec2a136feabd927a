//! HTTP surface. Routes are generated from the registered collections.

mod error;
mod handlers;
mod middleware;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Extension, Router,
    middleware::from_fn,
    routing::{MethodRouter, get, post},
};

pub use error::{ApiError, ApiErrorBody};
pub use handlers::CACHE_STATUS_HEADER;
pub use middleware::{REQUEST_ID_HEADER, RequestContext};

use crate::application::context::{CollectionContext, CollectionRegistry};
use crate::cache::CacheConsistencyEngine;
use crate::config::HEALTH_PATH;

#[derive(Clone)]
pub struct HttpState {
    pub engine: Arc<CacheConsistencyEngine>,
}

impl HttpState {
    pub fn new(engine: CacheConsistencyEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

pub fn build_router(state: HttpState, registry: &CollectionRegistry) -> Router {
    let mut router = Router::new().route(
        HEALTH_PATH,
        get(handlers::health).fallback(handlers::not_found),
    );
    for ctx in registry.iter() {
        router = router.merge(collection_router(ctx));
    }

    router
        .fallback(handlers::not_found)
        .layer(from_fn(middleware::log_responses))
        .layer(from_fn(middleware::set_request_context))
        .with_state(state)
}

/// Routes for one collection, all carrying its context. A known path called
/// with an unrouted method answers like an unknown path.
fn collection_router(ctx: &CollectionContext) -> Router<HttpState> {
    let spec = &ctx.spec;
    let mut routes: BTreeMap<String, MethodRouter<HttpState>> = BTreeMap::new();

    add_route(
        &mut routes,
        spec.collection_path(),
        get(handlers::fetch_collection),
    );
    if spec.supports_items() {
        add_route(&mut routes, spec.item_path("{id}"), get(handlers::fetch_item));
    }
    add_route(
        &mut routes,
        spec.refresh_path.clone(),
        get(handlers::refresh_collection),
    );
    if spec.accepts_writes {
        add_route(
            &mut routes,
            spec.collection_path(),
            post(handlers::insert_record),
        );
    }
    add_route(
        &mut routes,
        spec.webhook_path.clone(),
        post(handlers::ingest_change),
    );

    routes
        .into_iter()
        .fold(Router::new(), |router, (path, method_router)| {
            router.route(&path, method_router.fallback(handlers::not_found))
        })
        .route_layer(Extension(ctx.clone()))
}

// Paths may be shared between methods (e.g. a webhook posting to the read path).
fn add_route(
    routes: &mut BTreeMap<String, MethodRouter<HttpState>>,
    path: String,
    method_router: MethodRouter<HttpState>,
) {
    let merged = match routes.remove(&path) {
        Some(existing) => existing.merge(method_router),
        None => method_router,
    };
    routes.insert(path, merged);
}
