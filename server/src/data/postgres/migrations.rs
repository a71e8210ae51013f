//! PostgreSQL migration management
//!
//! Handles schema initialization and versioned migrations. The whole run
//! is serialized through an advisory lock so multiple worker processes can
//! race at startup without tripping over each other's DDL.

use sqlx::{Acquire, PgConnection, PgPool};

use super::error::PostgresError;
use super::schema::{SCHEMA, SCHEMA_VERSION};

/// Advisory lock key for migration runs
const MIGRATION_LOCK_KEY: i64 = 0x66617374_70756273; // "fastpubs"

/// Run all pending migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), PostgresError> {
    let mut conn = pool.acquire().await?;

    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut *conn)
        .await?;

    let result = run_migrations_locked(&mut conn).await;

    // Release the lock even when a migration failed.
    let unlock = sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut *conn)
        .await;
    if let Err(e) = unlock {
        tracing::warn!(error = %e, "Failed to release migration advisory lock");
    }

    result
}

async fn run_migrations_locked(conn: &mut PgConnection) -> Result<(), PostgresError> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = 'public'
            AND table_name = 'schema_version'
        )
        "#,
    )
    .fetch_one(&mut *conn)
    .await?;

    if !table_exists {
        tracing::debug!("Applying initial schema v{}", SCHEMA_VERSION);
        apply_initial_schema(conn).await?;
        return Ok(());
    }

    let current_version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version WHERE id = 1")
            .fetch_optional(&mut *conn)
            .await?;

    match current_version {
        None => {
            tracing::debug!("Applying initial schema v{}", SCHEMA_VERSION);
            apply_initial_schema(conn).await?;
        }
        Some(v) if v < SCHEMA_VERSION => {
            tracing::debug!("Migrating schema from v{} to v{}", v, SCHEMA_VERSION);
            for version in (v + 1)..=SCHEMA_VERSION {
                apply_versioned_migration(conn, version).await?;
            }
        }
        Some(v) if v > SCHEMA_VERSION => {
            tracing::warn!(
                "Schema version {} is newer than application version {}. This may cause issues.",
                v,
                SCHEMA_VERSION
            );
        }
        _ => {
            tracing::debug!("Schema is up to date (v{})", SCHEMA_VERSION);
        }
    }

    Ok(())
}

/// Apply the initial schema atomically
async fn apply_initial_schema(conn: &mut PgConnection) -> Result<(), PostgresError> {
    let mut tx = conn.begin().await?;

    sqlx::query(SCHEMA).execute(&mut *tx).await?;

    sqlx::query(
        "INSERT INTO schema_version (id, version, applied_at, description)
         VALUES (1, $1, NOW(), 'Initial schema')
         ON CONFLICT (id) DO UPDATE SET version = $1, applied_at = NOW()",
    )
    .bind(SCHEMA_VERSION)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::debug!("Schema v{} applied successfully", SCHEMA_VERSION);
    Ok(())
}

/// Apply a specific versioned migration
///
/// Add new migrations here as the schema evolves. Currently no versioned
/// migrations exist - schema v1 is applied via the SCHEMA constant.
#[allow(unused_variables, clippy::match_single_binding)]
async fn apply_versioned_migration(
    conn: &mut PgConnection,
    version: i32,
) -> Result<(), PostgresError> {
    let start = std::time::Instant::now();

    let (name, sql): (&str, &str) = match version {
        // Example:
        // 2 => ("add_ordering_keys", "ALTER TABLE messages ADD COLUMN ..."),
        _ => {
            return Err(PostgresError::MigrationFailed {
                version,
                name: "unknown".to_string(),
                error: format!("No migration defined for version {}", version),
            });
        }
    };

    #[allow(unreachable_code)]
    {
        let mut tx = conn.begin().await?;

        sqlx::query(sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| PostgresError::MigrationFailed {
                version,
                name: name.to_string(),
                error: e.to_string(),
            })?;

        let elapsed = start.elapsed().as_millis() as i64;

        sqlx::query(
            "INSERT INTO schema_migrations (version, name, applied_at, execution_time_ms, success)
             VALUES ($1, $2, NOW(), $3, TRUE)",
        )
        .bind(version)
        .bind(name)
        .bind(elapsed)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE schema_version SET version = $1, applied_at = NOW() WHERE id = 1")
            .bind(version)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(version, name, elapsed_ms = elapsed, "Migration applied");
        Ok(())
    }
}
