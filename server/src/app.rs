//! Core application

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::ApiServer;
use crate::api::auth::{AuthService, ScopeSet};
use crate::core::cli::{self, Commands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME, ENV_LOG_FORMATTER, ENV_LOG_LEVEL};
use crate::core::shutdown::ShutdownService;
use crate::data::postgres::PostgresService;
use crate::data::postgres::repositories::client;
use crate::utils::crypto;
use crate::workers::cleanup;

pub struct CoreApp {
    pub config: AppConfig,
    pub database: Arc<PostgresService>,
    pub auth: Arc<AuthService>,
    pub shutdown: ShutdownService,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        // The only command that needs no configuration or database.
        if let Some(Commands::GenerateSecretKey) = command {
            println!("{}", hex::encode(crypto::generate_signing_key()));
            return Ok(());
        }

        let config = AppConfig::load(&cli_config)?;

        match command {
            Some(Commands::DbMigrate) => Self::run_db_migrate(&config).await,
            Some(Commands::CleanupAckedMessages) => Self::run_cleanup_acked(&config).await,
            Some(Commands::CleanupStuckMessages) => Self::run_cleanup_stuck(&config).await,
            Some(Commands::CreateClient {
                name,
                scopes,
                is_active,
            }) => Self::run_create_client(&config, &name, &scopes, is_active).await,
            Some(Commands::GenerateSecretKey) => unreachable!("handled above"),
            Some(Commands::Server) | None => {
                let app = Self::init(config).await?;
                ApiServer::new(app).start().await
            }
        }
    }

    async fn init(config: AppConfig) -> Result<Self> {
        let database = Arc::new(
            PostgresService::init(&config.postgres)
                .await
                .context("Failed to initialize PostgreSQL")?,
        );
        let auth = Arc::new(AuthService::from_config(&config.auth)?);
        let shutdown = ShutdownService::new(database.clone());

        Ok(Self {
            config,
            database,
            auth,
            shutdown,
        })
    }

    /// Apply pending migrations and exit. `PostgresService::init` migrates
    /// on connect, so this just connects and reports.
    async fn run_db_migrate(config: &AppConfig) -> Result<()> {
        let database = PostgresService::init(&config.postgres)
            .await
            .context("Migration failed")?;
        database.close().await;
        println!("Migrations applied");
        Ok(())
    }

    async fn run_cleanup_acked(config: &AppConfig) -> Result<()> {
        let database = PostgresService::init(&config.postgres).await?;
        let deleted = cleanup::run_acked_cleanup(
            database.pool(),
            config.cleanup.acked_older_than_seconds,
            config.cleanup.batch_size,
        )
        .await
        .context("Acked cleanup failed")?;
        database.close().await;
        println!("Deleted {} acked messages", deleted);
        Ok(())
    }

    async fn run_cleanup_stuck(config: &AppConfig) -> Result<()> {
        let database = PostgresService::init(&config.postgres).await?;
        let sweep = cleanup::run_stuck_cleanup(
            database.pool(),
            config.cleanup.stuck_lock_timeout_seconds,
            config.cleanup.batch_size,
        )
        .await
        .context("Stuck cleanup failed")?;
        database.close().await;
        println!(
            "Recovered {} messages, dead-lettered {}",
            sweep.recovered, sweep.dead_lettered
        );
        Ok(())
    }

    /// Create an auth client and print its credentials. The secret is
    /// shown exactly once; only its salted hash is stored.
    async fn run_create_client(
        config: &AppConfig,
        name: &str,
        scopes: &str,
        is_active: bool,
    ) -> Result<()> {
        ScopeSet::parse(scopes).map_err(|e| anyhow::anyhow!("{}", e))?;

        let secret = crypto::generate_token(32);
        let secret_hash = crypto::hash_secret(&secret);

        let database = PostgresService::init(&config.postgres).await?;
        let created =
            client::create_client(database.pool(), name, scopes, is_active, &secret_hash)
                .await
                .context("Failed to create client")?;
        database.close().await;

        println!("client_id:     {}", created.id);
        println!("client_secret: {}", secret);
        println!("scopes:        {}", created.scopes);
        println!("is_active:     {}", created.is_active);
        Ok(())
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME);

        let filter = std::env::var(ENV_LOG_LEVEL)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        let json = matches!(
            std::env::var(ENV_LOG_FORMATTER).ok().as_deref(),
            Some("json")
        );

        if json {
            tracing_subscriber::fmt()
                .with_target(false)
                .with_level(true)
                .json()
                .with_env_filter(filter)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_target(false)
                .with_thread_ids(false)
                .with_level(true)
                .with_ansi(true)
                .compact()
                .with_env_filter(filter)
                .init();
        }
    }
}
