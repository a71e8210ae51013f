//! Runtime configuration
//!
//! Configuration is layered defaults -> environment/CLI (clap binds every
//! flag to a `FASTPUBSUB_*` variable). There is no config file; the
//! deployment contract for the broker is environment variables.

use anyhow::Result;

use super::cli::{Cli, LogFormatter};
use super::constants::{
    AUTH_DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES, CLEANUP_DEFAULT_ACKED_OLDER_THAN_SECONDS,
    CLEANUP_DEFAULT_BATCH_SIZE, CLEANUP_DEFAULT_STUCK_LOCK_TIMEOUT_SECONDS,
    DATABASE_DEFAULT_MAX_OVERFLOW, DATABASE_DEFAULT_POOL_SIZE, DEFAULT_HOST, DEFAULT_PORT,
    SUBSCRIPTION_DEFAULT_BACKOFF_MAX_SECONDS, SUBSCRIPTION_DEFAULT_BACKOFF_MIN_SECONDS,
    SUBSCRIPTION_DEFAULT_MAX_DELIVERY_ATTEMPTS,
};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub debug: bool,
}

/// PostgreSQL configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    /// Log SQL statements at DEBUG
    pub echo: bool,
    /// Base pool size (connections kept available)
    pub pool_size: u32,
    /// Extra connections allowed beyond the base pool
    pub max_overflow: u32,
    /// Validate connections before handing them out
    pub pre_ping: bool,
}

impl PostgresConfig {
    /// Upper bound on pooled connections
    pub fn max_connections(&self) -> u32 {
        self.pool_size.saturating_add(self.max_overflow).max(1)
    }
}

/// Defaults applied when a subscription is created without an explicit policy
#[derive(Debug, Clone)]
pub struct SubscriptionDefaults {
    pub max_delivery_attempts: i32,
    pub backoff_min_seconds: i32,
    pub backoff_max_seconds: i32,
}

/// Sweeper thresholds
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    pub acked_older_than_seconds: u64,
    pub stuck_lock_timeout_seconds: u64,
    pub batch_size: u32,
}

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub enabled: bool,
    /// HS256 signing key, hex encoded
    pub secret_key: Option<String>,
    pub access_token_expire_minutes: u64,
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub subscription_defaults: SubscriptionDefaults,
    pub cleanup: CleanupConfig,
    pub auth: AuthConfig,
    pub log_formatter: LogFormatter,
}

impl AppConfig {
    /// Load configuration from CLI arguments (which include env var
    /// fallbacks via clap) over built-in defaults.
    pub fn load(cli: &Cli) -> Result<Self> {
        let server = ServerConfig {
            host: cli.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.port.unwrap_or(DEFAULT_PORT),
            debug: cli.debug,
        };

        let postgres = PostgresConfig {
            url: cli.database_url.clone().unwrap_or_default(),
            echo: cli.database_echo.unwrap_or(false),
            pool_size: cli.database_pool_size.unwrap_or(DATABASE_DEFAULT_POOL_SIZE),
            max_overflow: cli
                .database_max_overflow
                .unwrap_or(DATABASE_DEFAULT_MAX_OVERFLOW),
            pre_ping: cli.database_pre_ping.unwrap_or(true),
        };

        let subscription_defaults = SubscriptionDefaults {
            max_delivery_attempts: cli
                .subscription_max_delivery_attempts
                .unwrap_or(SUBSCRIPTION_DEFAULT_MAX_DELIVERY_ATTEMPTS),
            backoff_min_seconds: cli
                .subscription_backoff_min_seconds
                .unwrap_or(SUBSCRIPTION_DEFAULT_BACKOFF_MIN_SECONDS),
            backoff_max_seconds: cli
                .subscription_backoff_max_seconds
                .unwrap_or(SUBSCRIPTION_DEFAULT_BACKOFF_MAX_SECONDS),
        };

        let cleanup = CleanupConfig {
            acked_older_than_seconds: cli
                .cleanup_acked_older_than_seconds
                .unwrap_or(CLEANUP_DEFAULT_ACKED_OLDER_THAN_SECONDS),
            stuck_lock_timeout_seconds: cli
                .cleanup_stuck_lock_timeout_seconds
                .unwrap_or(CLEANUP_DEFAULT_STUCK_LOCK_TIMEOUT_SECONDS),
            batch_size: cli.cleanup_batch_size.unwrap_or(CLEANUP_DEFAULT_BATCH_SIZE),
        };

        let auth = AuthConfig {
            enabled: cli.auth_enabled.unwrap_or(false),
            secret_key: cli.auth_secret_key.clone(),
            access_token_expire_minutes: cli
                .auth_access_token_expire_minutes
                .unwrap_or(AUTH_DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES),
        };

        let config = Self {
            server,
            postgres,
            subscription_defaults,
            cleanup,
            auth,
            log_formatter: cli.log_formatter.unwrap_or_default(),
        };

        config.validate()?;

        tracing::debug!(
            host = %config.server.host,
            port = config.server.port,
            debug = config.server.debug,
            pool_size = config.postgres.pool_size,
            max_overflow = config.postgres.max_overflow,
            pre_ping = config.postgres.pre_ping,
            auth_enabled = config.auth.enabled,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Configuration error: API host must not be empty");
        }
        if self.server.port == 0 {
            anyhow::bail!("Configuration error: API port must be greater than 0");
        }

        if self.postgres.url.is_empty() {
            anyhow::bail!(
                "Configuration error: FASTPUBSUB_DATABASE_URL is required"
            );
        }

        let defaults = &self.subscription_defaults;
        if defaults.max_delivery_attempts < 1 {
            anyhow::bail!("Configuration error: subscription max_delivery_attempts must be >= 1");
        }
        if defaults.backoff_min_seconds < 0 {
            anyhow::bail!("Configuration error: subscription backoff_min_seconds must be >= 0");
        }
        if defaults.backoff_max_seconds < defaults.backoff_min_seconds {
            anyhow::bail!(
                "Configuration error: subscription backoff_max_seconds ({}) must be >= backoff_min_seconds ({})",
                defaults.backoff_max_seconds,
                defaults.backoff_min_seconds
            );
        }

        if self.cleanup.batch_size == 0 {
            anyhow::bail!("Configuration error: cleanup batch_size must be greater than 0");
        }

        if self.auth.enabled {
            let key = self.auth.secret_key.as_deref().unwrap_or_default();
            if key.is_empty() {
                anyhow::bail!(
                    "Configuration error: FASTPUBSUB_AUTH_SECRET_KEY is required when auth is enabled (run `fastpubsub generate-secret-key`)"
                );
            }
            if hex::decode(key).is_err() {
                anyhow::bail!("Configuration error: FASTPUBSUB_AUTH_SECRET_KEY must be hex encoded");
            }
            if self.auth.access_token_expire_minutes == 0 {
                anyhow::bail!(
                    "Configuration error: access_token_expire_minutes must be greater than 0"
                );
            }
        }

        Ok(())
    }
}
