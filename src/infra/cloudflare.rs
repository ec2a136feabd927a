//! Cloudflare Workers KV over the REST API.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, StatusCode, Url, header};
use tracing::instrument;

use crate::cache::{KeyValueStore, StoreError};
use crate::config::CloudflareSettings;
use crate::infra::error::InfraError;

/// One KV namespace. Keys are percent-encoded into the final path segment,
/// so `/articles/42` is stored verbatim.
#[derive(Clone, Debug)]
pub struct CloudflareKvStore {
    client: Client,
    values_url: Url,
    api_token: String,
}

impl CloudflareKvStore {
    pub fn new(settings: &CloudflareSettings, namespace_id: &str) -> Result<Self, InfraError> {
        let mut values_url = settings.base_url.clone();
        values_url
            .path_segments_mut()
            .map_err(|()| {
                InfraError::configuration(format!(
                    "`{}` cannot be used as a Cloudflare API base",
                    settings.base_url
                ))
            })?
            .pop_if_empty()
            .extend([
                "accounts",
                settings.account_id.as_str(),
                "storage",
                "kv",
                "namespaces",
                namespace_id,
                "values",
            ]);

        let client = Client::builder()
            .user_agent(concat!("edgecache/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            client,
            values_url,
            api_token: settings.api_token.clone(),
        })
    }

    fn value_url(&self, key: &str) -> Result<Url, StoreError> {
        let mut url = self.values_url.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::unavailable("KV values URL cannot carry a key"))?
            .push(key);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.api_token)
    }

    async fn rejected(response: reqwest::Response) -> StoreError {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|err| format!("unreadable error body: {err}"));
        StoreError::Rejected { status, message }
    }
}

#[async_trait]
impl KeyValueStore for CloudflareKvStore {
    fn kind(&self) -> &'static str {
        "cloudflare"
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let response = self
            .authorize(self.client.get(self.value_url(key)?))
            .send()
            .await
            .map_err(StoreError::unavailable)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .bytes()
                .await
                .map(Some)
                .map_err(StoreError::unavailable),
            _ => Err(Self::rejected(response).await),
        }
    }

    #[instrument(skip(self, value), fields(bytes = value.len()))]
    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        let response = self
            .authorize(self.client.put(self.value_url(key)?))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(value)
            .send()
            .await
            .map_err(StoreError::unavailable)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::rejected(response).await)
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let response = self
            .authorize(self.client.delete(self.value_url(key)?))
            .send()
            .await
            .map_err(StoreError::unavailable)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            _ => Err(Self::rejected(response).await),
        }
    }
}
