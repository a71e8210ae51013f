//! Application-wide constants and environment variable names

pub const APP_NAME: &str = "fastpubsub";

// =============================================================================
// Environment variable names (all prefixed FASTPUBSUB_)
// =============================================================================

pub const ENV_DATABASE_URL: &str = "FASTPUBSUB_DATABASE_URL";
pub const ENV_DATABASE_ECHO: &str = "FASTPUBSUB_DATABASE_ECHO";
pub const ENV_DATABASE_POOL_SIZE: &str = "FASTPUBSUB_DATABASE_POOL_SIZE";
pub const ENV_DATABASE_MAX_OVERFLOW: &str = "FASTPUBSUB_DATABASE_MAX_OVERFLOW";
pub const ENV_DATABASE_PRE_PING: &str = "FASTPUBSUB_DATABASE_PRE_PING";

pub const ENV_SUBSCRIPTION_MAX_DELIVERY_ATTEMPTS: &str =
    "FASTPUBSUB_SUBSCRIPTION_MAX_DELIVERY_ATTEMPTS";
pub const ENV_SUBSCRIPTION_BACKOFF_MIN_SECONDS: &str =
    "FASTPUBSUB_SUBSCRIPTION_BACKOFF_MIN_SECONDS";
pub const ENV_SUBSCRIPTION_BACKOFF_MAX_SECONDS: &str =
    "FASTPUBSUB_SUBSCRIPTION_BACKOFF_MAX_SECONDS";

pub const ENV_API_HOST: &str = "FASTPUBSUB_API_HOST";
pub const ENV_API_PORT: &str = "FASTPUBSUB_API_PORT";
pub const ENV_API_DEBUG: &str = "FASTPUBSUB_API_DEBUG";

pub const ENV_CLEANUP_ACKED_OLDER_THAN_SECONDS: &str =
    "FASTPUBSUB_CLEANUP_ACKED_OLDER_THAN_SECONDS";
pub const ENV_CLEANUP_STUCK_LOCK_TIMEOUT_SECONDS: &str =
    "FASTPUBSUB_CLEANUP_STUCK_LOCK_TIMEOUT_SECONDS";
pub const ENV_CLEANUP_BATCH_SIZE: &str = "FASTPUBSUB_CLEANUP_BATCH_SIZE";

pub const ENV_AUTH_ENABLED: &str = "FASTPUBSUB_AUTH_ENABLED";
pub const ENV_AUTH_SECRET_KEY: &str = "FASTPUBSUB_AUTH_SECRET_KEY";
pub const ENV_AUTH_ACCESS_TOKEN_EXPIRE_MINUTES: &str =
    "FASTPUBSUB_AUTH_ACCESS_TOKEN_EXPIRE_MINUTES";

pub const ENV_LOG_LEVEL: &str = "FASTPUBSUB_LOG_LEVEL";
pub const ENV_LOG_FORMATTER: &str = "FASTPUBSUB_LOG_FORMATTER";

// =============================================================================
// Defaults
// =============================================================================

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

pub const DATABASE_DEFAULT_POOL_SIZE: u32 = 10;
pub const DATABASE_DEFAULT_MAX_OVERFLOW: u32 = 5;
pub const DATABASE_DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
pub const DATABASE_DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 60;

pub const SUBSCRIPTION_DEFAULT_MAX_DELIVERY_ATTEMPTS: i32 = 5;
pub const SUBSCRIPTION_DEFAULT_BACKOFF_MIN_SECONDS: i32 = 5;
pub const SUBSCRIPTION_DEFAULT_BACKOFF_MAX_SECONDS: i32 = 300;

pub const CLEANUP_DEFAULT_ACKED_OLDER_THAN_SECONDS: u64 = 86_400;
pub const CLEANUP_DEFAULT_STUCK_LOCK_TIMEOUT_SECONDS: u64 = 300;
pub const CLEANUP_DEFAULT_BATCH_SIZE: u32 = 1_000;

pub const AUTH_DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES: u64 = 30;

/// Consume batch size bounds (inclusive)
pub const CONSUME_MIN_BATCH_SIZE: u32 = 1;
pub const CONSUME_MAX_BATCH_SIZE: u32 = 100;

/// Default page size for list endpoints (hard cap is 500)
pub const DEFAULT_PAGE_LIMIT: u32 = 50;
