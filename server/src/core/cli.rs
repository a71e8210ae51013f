use clap::{Parser, Subcommand};

use super::constants::{
    ENV_API_DEBUG, ENV_API_HOST, ENV_API_PORT, ENV_AUTH_ACCESS_TOKEN_EXPIRE_MINUTES,
    ENV_AUTH_ENABLED, ENV_AUTH_SECRET_KEY, ENV_CLEANUP_ACKED_OLDER_THAN_SECONDS,
    ENV_CLEANUP_BATCH_SIZE, ENV_CLEANUP_STUCK_LOCK_TIMEOUT_SECONDS, ENV_DATABASE_ECHO,
    ENV_DATABASE_MAX_OVERFLOW, ENV_DATABASE_POOL_SIZE, ENV_DATABASE_PRE_PING, ENV_DATABASE_URL,
    ENV_LOG_FORMATTER, ENV_SUBSCRIPTION_BACKOFF_MAX_SECONDS, ENV_SUBSCRIPTION_BACKOFF_MIN_SECONDS,
    ENV_SUBSCRIPTION_MAX_DELIVERY_ATTEMPTS,
};

#[derive(Parser)]
#[command(name = "fastpubsub")]
#[command(version, about = "PostgreSQL-backed publish/subscribe broker", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// PostgreSQL connection URL
    #[arg(long, global = true, env = ENV_DATABASE_URL)]
    pub database_url: Option<String>,

    /// Log SQL statements
    #[arg(long, global = true, env = ENV_DATABASE_ECHO)]
    pub database_echo: Option<bool>,

    /// Base connection pool size
    #[arg(long, global = true, env = ENV_DATABASE_POOL_SIZE)]
    pub database_pool_size: Option<u32>,

    /// Extra connections allowed beyond the base pool
    #[arg(long, global = true, env = ENV_DATABASE_MAX_OVERFLOW)]
    pub database_max_overflow: Option<u32>,

    /// Validate pooled connections before use
    #[arg(long, global = true, env = ENV_DATABASE_PRE_PING)]
    pub database_pre_ping: Option<bool>,

    /// Server host address
    #[arg(long, short = 'H', global = true, env = ENV_API_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', global = true, env = ENV_API_PORT)]
    pub port: Option<u16>,

    /// Enable debug mode
    #[arg(long, global = true, env = ENV_API_DEBUG)]
    pub debug: bool,

    /// Default max delivery attempts for new subscriptions
    #[arg(long, global = true, env = ENV_SUBSCRIPTION_MAX_DELIVERY_ATTEMPTS)]
    pub subscription_max_delivery_attempts: Option<i32>,

    /// Default backoff floor in seconds for new subscriptions
    #[arg(long, global = true, env = ENV_SUBSCRIPTION_BACKOFF_MIN_SECONDS)]
    pub subscription_backoff_min_seconds: Option<i32>,

    /// Default backoff cap in seconds for new subscriptions
    #[arg(long, global = true, env = ENV_SUBSCRIPTION_BACKOFF_MAX_SECONDS)]
    pub subscription_backoff_max_seconds: Option<i32>,

    /// Delete acked messages older than this many seconds
    #[arg(long, global = true, env = ENV_CLEANUP_ACKED_OLDER_THAN_SECONDS)]
    pub cleanup_acked_older_than_seconds: Option<u64>,

    /// Recover leases held longer than this many seconds
    #[arg(long, global = true, env = ENV_CLEANUP_STUCK_LOCK_TIMEOUT_SECONDS)]
    pub cleanup_stuck_lock_timeout_seconds: Option<u64>,

    /// Rows touched per sweeper transaction
    #[arg(long, global = true, env = ENV_CLEANUP_BATCH_SIZE)]
    pub cleanup_batch_size: Option<u32>,

    /// Require bearer tokens on the API
    #[arg(long, global = true, env = ENV_AUTH_ENABLED)]
    pub auth_enabled: Option<bool>,

    /// HS256 signing key, hex encoded (use generate-secret-key)
    #[arg(long, global = true, env = ENV_AUTH_SECRET_KEY, hide_env_values = true)]
    pub auth_secret_key: Option<String>,

    /// Access token lifetime in minutes
    #[arg(long, global = true, env = ENV_AUTH_ACCESS_TOKEN_EXPIRE_MINUTES)]
    pub auth_access_token_expire_minutes: Option<u64>,

    /// Log formatter (text or json)
    #[arg(long, global = true, env = ENV_LOG_FORMATTER, value_parser = parse_log_formatter)]
    pub log_formatter: Option<LogFormatter>,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormatter {
    #[default]
    Text,
    Json,
}

fn parse_log_formatter(s: &str) -> Result<LogFormatter, String> {
    match s.to_lowercase().as_str() {
        "text" => Ok(LogFormatter::Text),
        "json" => Ok(LogFormatter::Json),
        _ => Err(format!(
            "Invalid log formatter '{}'. Valid options: text, json",
            s
        )),
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the API server (default command)
    Server,
    /// Apply pending database migrations and exit
    #[command(name = "db-migrate")]
    DbMigrate,
    /// Delete acked messages past the retention threshold
    #[command(name = "cleanup_acked_messages")]
    CleanupAckedMessages,
    /// Recover messages whose lease expired
    #[command(name = "cleanup_stuck_messages")]
    CleanupStuckMessages,
    /// Print a fresh 256-bit signing key (hex)
    #[command(name = "generate_secret_key")]
    GenerateSecretKey,
    /// Create an auth client and print its credentials
    #[command(name = "create_client")]
    CreateClient {
        /// Human-readable client name
        name: String,
        /// Space-separated scope list, e.g. "topics:publish:orders subscriptions:consume"
        scopes: String,
        /// Whether the client starts active
        is_active: bool,
    },
}

/// Parse CLI arguments into config inputs and the selected command
pub fn parse() -> (Cli, Option<Commands>) {
    let cli = Cli::parse();
    let command = cli.command.clone();
    (cli, command)
}
