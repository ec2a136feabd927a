//! PostgREST backing store.
//!
//! Talks to `{base}/rest/v1/{table}` the way Supabase exposes it: the API key
//! travels both as `apikey` and as a bearer token, and a non-default schema is
//! selected with the profile headers.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url, header};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::application::repos::{BackingStore, RepoError};
use crate::config::BackingSettings;
use crate::infra::error::InfraError;

const REST_PREFIX: [&str; 2] = ["rest", "v1"];
const APIKEY_HEADER: &str = "apikey";
const ACCEPT_PROFILE_HEADER: &str = "Accept-Profile";
const CONTENT_PROFILE_HEADER: &str = "Content-Profile";
const PREFER_HEADER: &str = "Prefer";

#[derive(Clone, Debug)]
pub struct PostgrestStore {
    client: Client,
    base: Url,
    api_key: String,
    schema: Option<String>,
}

impl PostgrestStore {
    pub fn new(settings: &BackingSettings) -> Result<Self, InfraError> {
        let base = settings
            .url
            .clone()
            .ok_or_else(|| InfraError::configuration("backing.url is not set"))?;
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| InfraError::configuration("backing.api_key is not set"))?;
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            client,
            base,
            api_key,
            schema: settings.schema.clone(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("edgecache/", env!("CARGO_PKG_VERSION"))
    }

    fn table_url(&self, table: &str) -> Result<Url, RepoError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| RepoError::unavailable(format!("`{}` cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(REST_PREFIX)
            .push(table);
        url.query_pairs_mut().append_pair("select", "*");
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .header(APIKEY_HEADER, &self.api_key)
            .bearer_auth(&self.api_key)
            .header(header::ACCEPT, "application/json");
        match self.schema.as_deref() {
            Some(schema) => request
                .header(ACCEPT_PROFILE_HEADER, schema)
                .header(CONTENT_PROFILE_HEADER, schema),
            None => request,
        }
    }

    async fn rows(request: RequestBuilder) -> Result<Vec<Value>, RepoError> {
        let response = request.send().await.map_err(RepoError::unavailable)?;
        Self::handle(response).await
    }

    async fn handle(response: Response) -> Result<Vec<Value>, RepoError> {
        let status = response.status();
        let bytes = response.bytes().await.map_err(RepoError::unavailable)?;
        if !status.is_success() {
            return Err(RepoError::Status {
                status: status.as_u16(),
                message: error_message(status, &bytes),
            });
        }
        serde_json::from_slice(&bytes).map_err(RepoError::decode)
    }
}

#[async_trait]
impl BackingStore for PostgrestStore {
    #[instrument(skip(self))]
    async fn fetch_collection(&self, table: &str) -> Result<Vec<Value>, RepoError> {
        let url = self.table_url(table)?;
        let rows = Self::rows(self.authorize(self.client.get(url))).await?;
        debug!(rows = rows.len(), "postgrest collection query");
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn fetch_item(
        &self,
        table: &str,
        id_field: &str,
        id: &str,
    ) -> Result<Option<Value>, RepoError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut()
            .append_pair(id_field, &format!("eq.{id}"));
        let rows = Self::rows(self.authorize(self.client.get(url))).await?;
        Ok(rows.into_iter().next())
    }

    #[instrument(skip(self, row))]
    async fn insert(&self, table: &str, row: Map<String, Value>) -> Result<Vec<Value>, RepoError> {
        let url = self.table_url(table)?;
        let request = self
            .authorize(self.client.post(url))
            .header(PREFER_HEADER, "return=representation")
            .json(&row);
        Self::rows(request).await
    }
}

/// PostgREST errors carry a JSON body with a `message`; fall back to the raw text.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|value| value.get("message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| {
            let text = String::from_utf8_lossy(body).trim().to_string();
            if text.is_empty() {
                status.to_string()
            } else {
                text
            }
        })
}
