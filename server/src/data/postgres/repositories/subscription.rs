//! Subscription repository

use sqlx::PgPool;

use crate::data::postgres::PostgresError;
use crate::data::types::SubscriptionRow;

/// Inputs for subscription creation; the retry policy fields have already
/// been defaulted and validated by the caller.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub id: String,
    pub topic_id: String,
    /// Normalized: `None` means match-all (JSON null is stored as SQL NULL)
    pub filter: Option<serde_json::Value>,
    pub max_delivery_attempts: i32,
    pub backoff_min_seconds: i32,
    pub backoff_max_seconds: i32,
}

/// Create a subscription referencing an existing topic.
///
/// Unknown topic surfaces as `NotFound`, ID collision as `Conflict`.
pub async fn create_subscription(
    pool: &PgPool,
    sub: NewSubscription,
) -> Result<SubscriptionRow, PostgresError> {
    let result = sqlx::query_as::<_, SubscriptionRow>(
        r#"
        INSERT INTO subscriptions
            (id, topic_id, filter, max_delivery_attempts, backoff_min_seconds, backoff_max_seconds)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, topic_id, filter, max_delivery_attempts,
                  backoff_min_seconds, backoff_max_seconds, created_at
        "#,
    )
    .bind(&sub.id)
    .bind(&sub.topic_id)
    .bind(&sub.filter)
    .bind(sub.max_delivery_attempts)
    .bind(sub.backoff_min_seconds)
    .bind(sub.backoff_max_seconds)
    .fetch_one(pool)
    .await;

    match result {
        Ok(row) => {
            tracing::debug!(subscription_id = %row.id, topic_id = %row.topic_id, "Subscription created");
            Ok(row)
        }
        Err(e) => {
            if let sqlx::Error::Database(db) = &e {
                if db.is_foreign_key_violation() {
                    return Err(PostgresError::NotFound(format!(
                        "topic {}",
                        sub.topic_id
                    )));
                }
            }
            Err(e.into())
        }
    }
}

/// Get a subscription by ID
pub async fn get_subscription(
    pool: &PgPool,
    id: &str,
) -> Result<Option<SubscriptionRow>, PostgresError> {
    let row = sqlx::query_as::<_, SubscriptionRow>(
        r#"
        SELECT id, topic_id, filter, max_delivery_attempts,
               backoff_min_seconds, backoff_max_seconds, created_at
        FROM subscriptions
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// List subscriptions ordered by creation time
pub async fn list_subscriptions(
    pool: &PgPool,
    offset: u32,
    limit: u32,
) -> Result<(Vec<SubscriptionRow>, u64), PostgresError> {
    let rows = sqlx::query_as::<_, SubscriptionRow>(
        r#"
        SELECT id, topic_id, filter, max_delivery_attempts,
               backoff_min_seconds, backoff_max_seconds, created_at
        FROM subscriptions
        ORDER BY created_at ASC, id ASC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit as i64)
    .bind(offset as i64)
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions")
        .fetch_one(pool)
        .await?;

    Ok((rows, total as u64))
}

/// Delete a subscription. Cascades to its messages. Returns true if a
/// subscription was deleted.
pub async fn delete_subscription(pool: &PgPool, id: &str) -> Result<bool, PostgresError> {
    let result = sqlx::query("DELETE FROM subscriptions WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    let deleted = result.rows_affected() > 0;
    if deleted {
        tracing::debug!(subscription_id = %id, "Subscription deleted");
    }
    Ok(deleted)
}
