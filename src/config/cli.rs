use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

use crate::cache::PopulateMode;

/// Command-line arguments for the edgecache binary.
#[derive(Debug, Parser)]
#[command(
    name = "edgecache",
    version,
    about = "Read-through cache in front of a PostgREST backing store"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "EDGECACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub backing: BackingOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Overwrite collection entries from the backing store and exit.
    Refresh(RefreshArgs),
}

/// Backing-store credentials. Accepted before or after the subcommand.
#[derive(Debug, Args, Default, Clone)]
pub struct BackingOverrides {
    /// Override the backing-store base URL.
    #[arg(
        long = "backing-url",
        env = "SUPABASE_URL",
        value_name = "URL",
        global = true
    )]
    pub backing_url: Option<String>,

    /// Override the backing-store API key.
    #[arg(
        long = "backing-api-key",
        env = "SUPABASE_ANON_KEY",
        value_name = "KEY",
        hide_env_values = true,
        global = true
    )]
    pub backing_api_key: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override when read-through misses populate the cache (inline|background).
    #[arg(long = "cache-populate", value_name = "MODE")]
    pub cache_populate: Option<PopulateMode>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RefreshArgs {
    /// Collections to refresh; all configured collections when omitted.
    #[arg(value_name = "COLLECTION")]
    pub collections: Vec<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,
}
