//! Auth client repository
//!
//! Clients are created by the `create-client` CLI command and read on every
//! authenticated request to check `is_active` and the current
//! `token_version`. Any client update must bump `token_version`; that bump
//! is the only revocation mechanism for outstanding tokens.

use sqlx::PgPool;
use uuid::Uuid;

use crate::data::postgres::PostgresError;
use crate::data::types::ClientRow;

/// Create a client. `secret_hash` is the salted hash of the one-time
/// secret; the plaintext never reaches the database.
pub async fn create_client(
    pool: &PgPool,
    name: &str,
    scopes: &str,
    is_active: bool,
    secret_hash: &str,
) -> Result<ClientRow, PostgresError> {
    let client = sqlx::query_as::<_, ClientRow>(
        r#"
        INSERT INTO clients (name, scopes, is_active, secret_hash)
        VALUES ($1, $2, $3, $4)
        RETURNING id, name, scopes, is_active, token_version, secret_hash,
                  created_at, updated_at
        "#,
    )
    .bind(name)
    .bind(scopes)
    .bind(is_active)
    .bind(secret_hash)
    .fetch_one(pool)
    .await?;

    tracing::debug!(client_id = %client.id, name, "Client created");
    Ok(client)
}

/// Get a client by ID
pub async fn get_client(pool: &PgPool, id: Uuid) -> Result<Option<ClientRow>, PostgresError> {
    let row = sqlx::query_as::<_, ClientRow>(
        r#"
        SELECT id, name, scopes, is_active, token_version, secret_hash,
               created_at, updated_at
        FROM clients
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
