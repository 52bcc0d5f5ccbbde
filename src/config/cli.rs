use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the morpho binary.
#[derive(Debug, Parser)]
#[command(name = "morpho", version, about = "Project and model-solution catalog server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "MORPHO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub required: RequiredOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Print an argon2 hash suitable for the `users.password_hash` column.
    #[command(name = "hash-password")]
    HashPassword(HashPasswordArgs),
}

/// Settings without defaults. The legacy deployment variables still work as fallbacks.
#[derive(Debug, Args, Default, Clone)]
pub struct RequiredOverrides {
    /// Override the database connection URL.
    #[arg(long = "database-url", env = "DB_STRING", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Override the object-storage endpoint used to build asset URLs.
    #[arg(
        long = "storage-endpoint-url",
        env = "AWS_S3_ENDPOINT_URL",
        value_name = "URL",
        global = true
    )]
    pub storage_endpoint_url: Option<String>,

    /// Override the object-storage bucket used to build asset URLs.
    #[arg(
        long = "storage-bucket",
        env = "AWS_STORAGE_BUCKET_NAME",
        value_name = "NAME",
        global = true
    )]
    pub storage_bucket: Option<String>,
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

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the per-request catalog query deadline.
    #[arg(long = "database-query-timeout-ms", value_name = "MILLIS")]
    pub database_query_timeout_ms: Option<u64>,

    /// Toggle the response cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the number of cached paths.
    #[arg(long = "cache-capacity", value_name = "COUNT")]
    pub cache_capacity: Option<usize>,

    /// Expire cached responses after this many seconds.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Secret used to sign login and session tokens.
    #[arg(long = "auth-signing-secret", env = "MORPHO_SIGNING_SECRET", value_name = "SECRET")]
    pub auth_signing_secret: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct HashPasswordArgs {
    /// Plain-text password to hash.
    #[arg(long, env = "MORPHO_PASSWORD", value_name = "PASSWORD")]
    pub password: String,
}
