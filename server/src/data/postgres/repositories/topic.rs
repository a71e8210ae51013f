//! Topic repository

use sqlx::PgPool;

use crate::data::postgres::PostgresError;
use crate::data::types::TopicRow;

/// Create a topic with a caller-supplied ID. ID collisions surface as
/// `Conflict`.
pub async fn create_topic(pool: &PgPool, id: &str) -> Result<TopicRow, PostgresError> {
    let topic = sqlx::query_as::<_, TopicRow>(
        "INSERT INTO topics (id) VALUES ($1) RETURNING id, created_at",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    tracing::debug!(topic_id = %topic.id, "Topic created");
    Ok(topic)
}

/// Get a topic by ID
pub async fn get_topic(pool: &PgPool, id: &str) -> Result<Option<TopicRow>, PostgresError> {
    let row = sqlx::query_as::<_, TopicRow>("SELECT id, created_at FROM topics WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// List topics ordered by creation time
pub async fn list_topics(
    pool: &PgPool,
    offset: u32,
    limit: u32,
) -> Result<(Vec<TopicRow>, u64), PostgresError> {
    let rows = sqlx::query_as::<_, TopicRow>(
        "SELECT id, created_at FROM topics ORDER BY created_at ASC, id ASC LIMIT $1 OFFSET $2",
    )
    .bind(limit as i64)
    .bind(offset as i64)
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM topics")
        .fetch_one(pool)
        .await?;

    Ok((rows, total as u64))
}

/// Delete a topic. Cascades to its subscriptions and their messages.
/// Returns true if a topic was deleted.
pub async fn delete_topic(pool: &PgPool, id: &str) -> Result<bool, PostgresError> {
    let result = sqlx::query("DELETE FROM topics WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    let deleted = result.rows_affected() > 0;
    if deleted {
        tracing::debug!(topic_id = %id, "Topic deleted");
    }
    Ok(deleted)
}
