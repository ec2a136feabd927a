//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    collections::{BTreeMap, BTreeSet},
    net::SocketAddr,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::PopulateMode;
use crate::domain::collection::{
    CollectionName, CollectionSpec, Granularity, default_refresh_path, default_webhook_path,
};

mod cli;

pub use cli::{BackingOverrides, CliArgs, Command, RefreshArgs, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "edgecache";
const ENV_PREFIX: &str = "EDGECACHE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8787;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_BACKING_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CLOUDFLARE_BASE_URL: &str = "https://api.cloudflare.com/client/v4/";
const DEFAULT_CLOUDFLARE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_ID_FIELD: &str = "id";
pub(crate) const HEALTH_PATH: &str = "/_health";

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub backing: BackingSettings,
    pub cache: CacheSettings,
    pub collections: Vec<CollectionSettings>,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackingKind {
    #[default]
    Postgrest,
    Memory,
}

#[derive(Debug, Clone)]
pub struct BackingSettings {
    pub kind: BackingKind,
    /// Project base URL; `/rest/v1/{table}` is appended per request.
    pub url: Option<Url>,
    pub api_key: Option<String>,
    /// Schema selected through the `Accept-Profile`/`Content-Profile` headers.
    pub schema: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Cloudflare,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub populate: PopulateMode,
    /// Present exactly when `backend` is `cloudflare`.
    pub cloudflare: Option<CloudflareSettings>,
}

#[derive(Debug, Clone)]
pub struct CloudflareSettings {
    pub account_id: String,
    pub api_token: String,
    pub base_url: Url,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CollectionSettings {
    pub spec: CollectionSpec,
    /// KV namespace backing this collection. With the memory backend,
    /// collections sharing a namespace share one store.
    pub kv_namespace: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    raw.apply_backing_overrides(&cli.backing);
    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Refresh(args)) => raw.apply_refresh_overrides(args),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    backing: RawBackingSettings,
    cache: RawCacheSettings,
    collections: Vec<RawCollectionSettings>,
}

impl RawSettings {
    fn apply_backing_overrides(&mut self, overrides: &BackingOverrides) {
        if let Some(url) = overrides.backing_url.as_ref() {
            self.backing.url = Some(url.clone());
        }
        if let Some(key) = overrides.backing_api_key.as_ref() {
            self.backing.api_key = Some(key.clone());
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(populate) = overrides.cache_populate {
            self.cache.populate = Some(populate);
        }
    }

    fn apply_refresh_overrides(&mut self, args: &RefreshArgs) {
        if let Some(level) = args.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            backing,
            cache,
            collections,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let backing = build_backing_settings(backing)?;
        let cache = build_cache_settings(cache)?;
        let collections = build_collection_settings(collections, &cache)?;

        Ok(Self {
            server,
            logging,
            backing,
            cache,
            collections,
        })
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionSettings> {
        self.collections
            .iter()
            .find(|collection| collection.spec.name.as_str() == name)
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_backing_settings(backing: RawBackingSettings) -> Result<BackingSettings, LoadError> {
    let kind = backing.kind.unwrap_or_default();

    let url = non_empty(backing.url)
        .map(|raw| parse_base_url(&raw).map_err(|reason| LoadError::invalid("backing.url", reason)))
        .transpose()?;
    let api_key = non_empty(backing.api_key);

    if kind == BackingKind::Postgrest {
        if url.is_none() {
            return Err(LoadError::invalid(
                "backing.url",
                "required for the postgrest backing store (set SUPABASE_URL)",
            ));
        }
        if api_key.is_none() {
            return Err(LoadError::invalid(
                "backing.api_key",
                "required for the postgrest backing store (set SUPABASE_ANON_KEY)",
            ));
        }
    }

    Ok(BackingSettings {
        kind,
        url,
        api_key,
        schema: non_empty(backing.schema),
        timeout: timeout(
            backing.timeout_seconds,
            DEFAULT_BACKING_TIMEOUT_SECS,
            "backing.timeout_seconds",
        )?,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = cache.backend.unwrap_or_default();
    let populate = cache.populate.unwrap_or_default();

    let cloudflare = match backend {
        CacheBackend::Memory => None,
        CacheBackend::Cloudflare => Some(build_cloudflare_settings(cache.cloudflare)?),
    };

    Ok(CacheSettings {
        backend,
        populate,
        cloudflare,
    })
}

fn build_cloudflare_settings(
    cloudflare: RawCloudflareSettings,
) -> Result<CloudflareSettings, LoadError> {
    let account_id = non_empty(cloudflare.account_id).ok_or_else(|| {
        LoadError::invalid(
            "cache.cloudflare.account_id",
            "required when cache.backend is `cloudflare`",
        )
    })?;
    let api_token = non_empty(cloudflare.api_token).ok_or_else(|| {
        LoadError::invalid(
            "cache.cloudflare.api_token",
            "required when cache.backend is `cloudflare`",
        )
    })?;
    let base_url = parse_base_url(
        cloudflare
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_CLOUDFLARE_BASE_URL),
    )
    .map_err(|reason| LoadError::invalid("cache.cloudflare.base_url", reason))?;

    Ok(CloudflareSettings {
        account_id,
        api_token,
        base_url,
        timeout: timeout(
            cloudflare.timeout_seconds,
            DEFAULT_CLOUDFLARE_TIMEOUT_SECS,
            "cache.cloudflare.timeout_seconds",
        )?,
    })
}

fn build_collection_settings(
    collections: Vec<RawCollectionSettings>,
    cache: &CacheSettings,
) -> Result<Vec<CollectionSettings>, LoadError> {
    if collections.is_empty() {
        return Err(LoadError::invalid(
            "collections",
            "at least one collection must be configured",
        ));
    }

    let mut names = BTreeSet::new();
    let mut built = Vec::with_capacity(collections.len());
    for raw in collections {
        let name = CollectionName::parse(raw.name.as_deref().unwrap_or_default())
            .map_err(|err| LoadError::invalid("collections.name", err.to_string()))?;
        if !names.insert(name.as_str().to_string()) {
            return Err(LoadError::invalid(
                "collections.name",
                format!("collection `{name}` is configured twice"),
            ));
        }

        let kv_namespace = match (non_empty(raw.kv_namespace), cache.backend) {
            (Some(namespace), _) => namespace,
            (None, CacheBackend::Memory) => name.as_str().to_string(),
            (None, CacheBackend::Cloudflare) => {
                return Err(LoadError::invalid(
                    "collections.kv_namespace",
                    format!("collection `{name}` needs a KV namespace id for the cloudflare backend"),
                ));
            }
        };

        let id_field = non_empty(raw.id_field).unwrap_or_else(|| DEFAULT_ID_FIELD.to_string());
        let refresh_path = match raw.refresh_path {
            Some(path) => validate_route("collections.refresh_path", &name, path)?,
            None => default_refresh_path(&name),
        };
        let webhook_path = match raw.webhook_path {
            Some(path) => validate_route("collections.webhook_path", &name, path)?,
            None => default_webhook_path(&name),
        };

        let spec = CollectionSpec {
            table: non_empty(raw.table).unwrap_or_else(|| name.as_str().to_string()),
            granularity: raw.granularity.unwrap_or_default(),
            id_field,
            refresh_path,
            webhook_path,
            accepts_writes: raw.accepts_writes.unwrap_or(false),
            required_fields: raw.required_fields,
            refresh_collection_on_delete: raw.refresh_collection_on_delete.unwrap_or(true),
            name,
        };

        built.push(CollectionSettings { spec, kv_namespace });
    }

    check_route_collisions(&built)?;
    Ok(built)
}

fn validate_route(
    key: &'static str,
    name: &CollectionName,
    path: String,
) -> Result<String, LoadError> {
    let path = path.trim().to_string();
    if !path.starts_with('/') || path.len() < 2 {
        return Err(LoadError::invalid(
            key,
            format!("collection `{name}`: route `{path}` must start with `/` and name a resource"),
        ));
    }
    if path.contains(['{', '}', '*', '?', '#']) {
        return Err(LoadError::invalid(
            key,
            format!("collection `{name}`: route `{path}` must be a literal path"),
        ));
    }
    if path == HEALTH_PATH {
        return Err(LoadError::invalid(
            key,
            format!("collection `{name}`: route `{path}` is reserved"),
        ));
    }
    Ok(path)
}

/// Routes a collection registers, as `(method, path)` pairs.
pub(crate) fn collection_routes(spec: &CollectionSpec) -> Vec<(&'static str, String)> {
    let mut routes = vec![
        ("GET", spec.collection_path()),
        ("GET", spec.refresh_path.clone()),
        ("POST", spec.webhook_path.clone()),
    ];
    if spec.supports_items() {
        routes.push(("GET", spec.item_path("{id}")));
    }
    if spec.accepts_writes {
        routes.push(("POST", spec.collection_path()));
    }
    routes
}

fn check_route_collisions(collections: &[CollectionSettings]) -> Result<(), LoadError> {
    let mut owners: BTreeMap<String, &CollectionName> = BTreeMap::new();
    for collection in collections {
        let name = &collection.spec.name;
        let mut seen = BTreeSet::new();
        for (method, path) in collection_routes(&collection.spec) {
            if !seen.insert((method, path.clone())) {
                return Err(LoadError::invalid(
                    "collections",
                    format!("collection `{name}` registers `{method} {path}` twice"),
                ));
            }
            match owners.get(&path) {
                Some(owner) if *owner != name => {
                    return Err(LoadError::invalid(
                        "collections",
                        format!("route `{path}` is claimed by both `{owner}` and `{name}`"),
                    ));
                }
                Some(_) => {}
                None => {
                    owners.insert(path, name);
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBackingSettings {
    kind: Option<BackingKind>,
    url: Option<String>,
    api_key: Option<String>,
    schema: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<CacheBackend>,
    populate: Option<PopulateMode>,
    cloudflare: RawCloudflareSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCloudflareSettings {
    account_id: Option<String>,
    api_token: Option<String>,
    base_url: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCollectionSettings {
    name: Option<String>,
    table: Option<String>,
    granularity: Option<Granularity>,
    id_field: Option<String>,
    refresh_path: Option<String>,
    webhook_path: Option<String>,
    accepts_writes: Option<bool>,
    required_fields: Vec<String>,
    kv_namespace: Option<String>,
    refresh_collection_on_delete: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// Parse a base URL so that `Url::join` appends rather than replaces the last segment.
fn parse_base_url(raw: &str) -> Result<Url, String> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&with_slash).map_err(|err| format!("invalid URL `{trimmed}`: {err}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported URL scheme `{}`", url.scheme()));
    }
    Ok(url)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn timeout(value: Option<u64>, default: u64, key: &'static str) -> Result<Duration, LoadError> {
    let seconds = value.unwrap_or(default);
    if seconds == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(seconds))
}
