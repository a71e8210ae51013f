//! PostgreSQL database service
//!
//! The database is the sole persistent substrate and the single
//! serialization point of the broker. All schema definitions and
//! migrations are managed here; all concurrency correctness rests on the
//! short transactions in the repositories.

pub mod error;
mod migrations;
pub mod repositories;
pub mod schema;

pub use error::PostgresError;
pub use sqlx::PgPool;

use std::time::Duration;

use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::log::LevelFilter;

use crate::core::config::PostgresConfig;
use crate::core::constants::{
    DATABASE_DEFAULT_ACQUIRE_TIMEOUT_SECS, DATABASE_DEFAULT_STATEMENT_TIMEOUT_SECS,
};

/// PostgreSQL database service
///
/// Handles pool initialization and migrations. Created once at startup and
/// shared across all modules.
pub struct PostgresService {
    pool: PgPool,
}

impl PostgresService {
    /// Initialize the database service from configuration
    ///
    /// The pool keeps `pool_size` connections warm and allows bursts up to
    /// `pool_size + max_overflow`. `pre_ping` validates connections before
    /// they are handed out, and a per-connection statement timeout guards
    /// against runaway queries. Pending migrations run on every init.
    pub async fn init(config: &PostgresConfig) -> Result<Self, PostgresError> {
        let url = config.url.as_str();
        if url.is_empty() {
            return Err(PostgresError::Config("PostgreSQL URL is required".into()));
        }

        let mut options: PgConnectOptions = url
            .parse()
            .map_err(|e| PostgresError::Config(format!("Invalid PostgreSQL URL: {}", e)))?;

        options = if config.echo {
            options.log_statements(LevelFilter::Debug)
        } else {
            options.log_statements(LevelFilter::Trace)
        };

        options = options.options([(
            "statement_timeout",
            format!("{}s", DATABASE_DEFAULT_STATEMENT_TIMEOUT_SECS),
        )]);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections())
            .min_connections(config.pool_size.min(config.max_connections()))
            .acquire_timeout(Duration::from_secs(DATABASE_DEFAULT_ACQUIRE_TIMEOUT_SECS))
            .test_before_acquire(config.pre_ping)
            .connect_with(options)
            .await?;

        migrations::run_migrations(&pool).await?;

        tracing::debug!(
            max_connections = config.max_connections(),
            pool_size = config.pool_size,
            pre_ping = config.pre_ping,
            "PostgresService initialized"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Liveness probe against the database
    pub async fn ping(&self) -> Result<(), PostgresError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the connection pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("PostgreSQL pool closed");
    }
}
