//! Collection endpoints. Every handler receives its collection through the
//! `Extension` installed by the collection's route layer.

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;

use crate::application::context::CollectionContext;
use crate::cache::Fetched;
use crate::domain::change::ChangeEvent;

use super::HttpState;
use super::error::ApiError;

pub const CACHE_STATUS_HEADER: &str = "x-cache";

pub async fn fetch_collection(
    State(state): State<HttpState>,
    Extension(ctx): Extension<CollectionContext>,
) -> Result<Response, ApiError> {
    let fetched = state
        .engine
        .fetch_collection(&ctx)
        .await
        .map_err(|err| ApiError::from_engine("infra::http::fetch_collection", err))?;
    Ok(cached_json(fetched))
}

pub async fn fetch_item(
    State(state): State<HttpState>,
    Extension(ctx): Extension<CollectionContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let fetched = state
        .engine
        .fetch_item(&ctx, &id)
        .await
        .map_err(|err| ApiError::from_engine("infra::http::fetch_item", err))?;
    Ok(cached_json(fetched))
}

pub async fn refresh_collection(
    State(state): State<HttpState>,
    Extension(ctx): Extension<CollectionContext>,
) -> Result<Response, ApiError> {
    let ack = state
        .engine
        .refresh_collection(&ctx)
        .await
        .map_err(|err| ApiError::from_engine("infra::http::refresh_collection", err))?;
    Ok(Json(ack).into_response())
}

pub async fn insert_record(
    State(state): State<HttpState>,
    Extension(ctx): Extension<CollectionContext>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|err| ApiError::insert_failed("infra::http::insert_record", &err))?;

    let inserted = state
        .engine
        .insert_record(&ctx, payload)
        .await
        .map_err(|err| ApiError::from_engine("infra::http::insert_record", err))?;
    Ok(Json(inserted).into_response())
}

pub async fn ingest_change(
    State(state): State<HttpState>,
    Extension(ctx): Extension<CollectionContext>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let event: ChangeEvent = serde_json::from_slice(&body).map_err(|err| {
        ApiError::from_error(
            "infra::http::ingest_change",
            StatusCode::BAD_REQUEST,
            "invalid change event",
            &err,
        )
    })?;

    let receipt = state.engine.ingest_change(&ctx, event);
    Ok(Json(receipt.ack).into_response())
}

pub async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not found").into_response()
}

fn cached_json<T: Serialize>(fetched: Fetched<T>) -> Response {
    let mut response = Json(fetched.value).into_response();
    response.headers_mut().insert(
        CACHE_STATUS_HEADER,
        HeaderValue::from_static(fetched.origin.as_str()),
    );
    response
}
