//! Message dispatch engine
//!
//! Every operation here is a single short transaction against the shared
//! pool; row-level locks (`FOR UPDATE SKIP LOCKED`) are the only
//! concurrency primitive. Lifecycle:
//!
//! ```text
//! publish -> available -> consume -> delivered -> ack  -> acked -> swept (deleted)
//!                ^                       |
//!                |                       +-- nack/stuck, attempts left
//!                +-----------------------+
//!                                        |
//!                                        +-- nack/stuck, attempts exhausted -> dlq
//!                                                       (reprocess -> available)
//! ```
//!
//! `delivery_attempts` is incremented when the lease is taken, not when it
//! fails. A consumer that crashes without nacking still consumed an
//! attempt, so a poison message cannot loop forever behind a broken
//! consumer.

use metrics::counter;
use sqlx::PgPool;
use uuid::Uuid;

use crate::data::postgres::PostgresError;
use crate::data::types::{LeasedMessage, MessageRow, SubscriptionMetrics};

/// Publish a batch of payloads to a topic, fanning out one message row per
/// matching subscription. Returns the number of rows inserted.
///
/// The fan-out is one statement: subscriptions of the topic are joined
/// against the unnested payload batch, and the subscription filter is
/// evaluated server-side. A filter matches when every filter key exists in
/// the payload and the payload value is contained in the allowed set
/// (scalar jsonb containment is JSON equality; filters are validated to
/// hold only scalars). The whole batch commits or nothing does.
pub async fn publish(
    pool: &PgPool,
    topic_id: &str,
    payloads: &[serde_json::Value],
) -> Result<u64, PostgresError> {
    let mut tx = pool.begin().await?;

    let topic_exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM topics WHERE id = $1)")
        .bind(topic_id)
        .fetch_one(&mut *tx)
        .await?;
    if !topic_exists {
        return Err(PostgresError::NotFound(format!("topic {}", topic_id)));
    }

    let batch = serde_json::Value::Array(payloads.to_vec());
    let result = sqlx::query(
        r#"
        INSERT INTO messages (subscription_id, payload, status, delivery_attempts, available_at)
        SELECT s.id, p.payload, 'available', 0, NOW()
        FROM subscriptions s
        CROSS JOIN jsonb_array_elements($2::jsonb) AS p(payload)
        WHERE s.topic_id = $1
          AND (
            s.filter IS NULL
            OR s.filter = '{}'::jsonb
            OR NOT EXISTS (
                SELECT 1
                FROM jsonb_each(s.filter) AS f(key, allowed)
                WHERE NOT (p.payload ? f.key
                           AND f.allowed @> jsonb_build_array(p.payload -> f.key))
            )
          )
        "#,
    )
    .bind(topic_id)
    .bind(&batch)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let inserted = result.rows_affected();
    counter!("fastpubsub_messages_published_total").increment(inserted);
    tracing::debug!(topic_id, payloads = payloads.len(), inserted, "Published");
    Ok(inserted)
}

/// Lease up to `batch_size` available messages for a consumer.
///
/// Selection is ordered `(available_at, created_at, id)` and skips rows
/// locked by concurrent transactions, so parallel consumers partition the
/// backlog instead of contending. Each leased row transitions to
/// `delivered`, records the consumer and lease time, and has its attempt
/// counter incremented.
pub async fn consume(
    pool: &PgPool,
    subscription_id: &str,
    consumer_id: &str,
    batch_size: u32,
) -> Result<Vec<LeasedMessage>, PostgresError> {
    let messages = sqlx::query_as::<_, LeasedMessage>(
        r#"
        WITH next_batch AS (
            SELECT id
            FROM messages
            WHERE subscription_id = $1
              AND status = 'available'
              AND available_at <= NOW()
            ORDER BY available_at ASC, created_at ASC, id ASC
            LIMIT $3
            FOR UPDATE SKIP LOCKED
        ),
        leased AS (
            UPDATE messages m
            SET status = 'delivered',
                locked_by = $2,
                locked_at = NOW(),
                delivery_attempts = m.delivery_attempts + 1
            FROM next_batch
            WHERE m.id = next_batch.id
            RETURNING m.id, m.payload, m.delivery_attempts, m.available_at, m.created_at
        )
        SELECT id, payload, delivery_attempts, created_at
        FROM leased
        ORDER BY available_at ASC, created_at ASC, id ASC
        "#,
    )
    .bind(subscription_id)
    .bind(consumer_id)
    .bind(i64::from(batch_size))
    .fetch_all(pool)
    .await?;

    counter!("fastpubsub_messages_consumed_total").increment(messages.len() as u64);
    tracing::debug!(
        subscription_id,
        consumer_id,
        leased = messages.len(),
        "Consumed"
    );
    Ok(messages)
}

/// Acknowledge delivered messages owned by this consumer.
///
/// Rows not in `delivered`, or leased by a different consumer, are left
/// untouched: acks race with retries and sweeps by design, so the
/// operation is an idempotent no-op for anything but a live owned lease.
pub async fn ack(
    pool: &PgPool,
    subscription_id: &str,
    consumer_id: &str,
    message_ids: &[Uuid],
) -> Result<u64, PostgresError> {
    let result = sqlx::query(
        r#"
        UPDATE messages
        SET status = 'acked',
            acked_at = NOW(),
            locked_by = NULL,
            locked_at = NULL
        WHERE subscription_id = $1
          AND locked_by = $2
          AND status = 'delivered'
          AND id = ANY($3)
        "#,
    )
    .bind(subscription_id)
    .bind(consumer_id)
    .bind(message_ids)
    .execute(pool)
    .await?;

    let acked = result.rows_affected();
    counter!("fastpubsub_messages_acked_total").increment(acked);
    tracing::debug!(subscription_id, consumer_id, acked, "Acked");
    Ok(acked)
}

/// Negatively acknowledge delivered messages owned by this consumer.
///
/// Messages that exhausted their attempt budget move to the DLQ; the rest
/// are rescheduled after an exponential backoff of
/// `min(backoff_max, backoff_min * 2^(attempts - 1))` seconds. The attempt
/// counter is untouched here - it was already charged at lease time.
/// Ownership rules match `ack`.
pub async fn nack(
    pool: &PgPool,
    subscription_id: &str,
    consumer_id: &str,
    message_ids: &[Uuid],
) -> Result<u64, PostgresError> {
    let result = sqlx::query(
        r#"
        UPDATE messages m
        SET status = CASE WHEN m.delivery_attempts >= s.max_delivery_attempts
                          THEN 'dlq' ELSE 'available' END,
            available_at = CASE WHEN m.delivery_attempts >= s.max_delivery_attempts
                                THEN m.available_at
                                ELSE NOW() + make_interval(secs => LEAST(
                                    s.backoff_max_seconds::double precision,
                                    s.backoff_min_seconds::double precision
                                        * power(2, LEAST(GREATEST(m.delivery_attempts - 1, 0), 30))
                                )) END,
            locked_by = NULL,
            locked_at = NULL
        FROM subscriptions s
        WHERE s.id = m.subscription_id
          AND m.subscription_id = $1
          AND m.locked_by = $2
          AND m.status = 'delivered'
          AND m.id = ANY($3)
        "#,
    )
    .bind(subscription_id)
    .bind(consumer_id)
    .bind(message_ids)
    .execute(pool)
    .await?;

    let nacked = result.rows_affected();
    counter!("fastpubsub_messages_nacked_total").increment(nacked);
    tracing::debug!(subscription_id, consumer_id, nacked, "Nacked");
    Ok(nacked)
}

/// List dead-lettered messages for a subscription, oldest first
pub async fn list_dlq(
    pool: &PgPool,
    subscription_id: &str,
    offset: u32,
    limit: u32,
) -> Result<(Vec<MessageRow>, u64), PostgresError> {
    let rows = sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT id, subscription_id, payload, status, delivery_attempts,
               available_at, locked_by, locked_at, acked_at, created_at
        FROM messages
        WHERE subscription_id = $1
          AND status = 'dlq'
        ORDER BY created_at ASC, id ASC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(subscription_id)
    .bind(limit as i64)
    .bind(offset as i64)
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM messages WHERE subscription_id = $1 AND status = 'dlq'",
    )
    .bind(subscription_id)
    .fetch_one(pool)
    .await?;

    Ok((rows, total as u64))
}

/// Return dead-lettered messages to `available` with a fresh attempt
/// budget. Rows not currently in the DLQ are ignored.
pub async fn reprocess_dlq(
    pool: &PgPool,
    subscription_id: &str,
    message_ids: &[Uuid],
) -> Result<u64, PostgresError> {
    let result = sqlx::query(
        r#"
        UPDATE messages
        SET status = 'available',
            available_at = NOW(),
            delivery_attempts = 0,
            locked_by = NULL,
            locked_at = NULL
        WHERE subscription_id = $1
          AND status = 'dlq'
          AND id = ANY($2)
        "#,
    )
    .bind(subscription_id)
    .bind(message_ids)
    .execute(pool)
    .await?;

    let reprocessed = result.rows_affected();
    counter!("fastpubsub_messages_reprocessed_total").increment(reprocessed);
    tracing::debug!(subscription_id, reprocessed, "DLQ reprocessed");
    Ok(reprocessed)
}

/// Point-in-time message counts per status for one subscription.
///
/// One grouped aggregate; there is no cross-status consistency guarantee
/// and none is needed for monitoring.
pub async fn metrics(
    pool: &PgPool,
    subscription_id: &str,
) -> Result<SubscriptionMetrics, PostgresError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) FROM messages WHERE subscription_id = $1 GROUP BY status",
    )
    .bind(subscription_id)
    .fetch_all(pool)
    .await?;

    let mut metrics = SubscriptionMetrics::default();
    for (status, count) in rows {
        match status.as_str() {
            "available" => metrics.available = count,
            "delivered" => metrics.delivered = count,
            "acked" => metrics.acked = count,
            "dlq" => metrics.dlq = count,
            other => tracing::warn!(status = other, "Unknown message status in metrics"),
        }
    }
    Ok(metrics)
}

/// Outcome of one stuck-lease sweep batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StuckSweep {
    /// Leases released back to `available`
    pub recovered: u64,
    /// Exhausted messages promoted to the DLQ
    pub dead_lettered: u64,
}

impl StuckSweep {
    pub fn total(&self) -> u64 {
        self.recovered + self.dead_lettered
    }
}

/// Recover one batch of messages whose lease outlived `lock_timeout_secs`.
///
/// The attempt was already counted at lease time, so recovered messages
/// become available immediately (the consumer failed, not the work);
/// messages out of attempts go to the DLQ. Skips rows locked by concurrent
/// transactions, which makes overlapping sweeper runs safe.
pub async fn sweep_stuck(
    pool: &PgPool,
    lock_timeout_secs: u64,
    batch_size: u32,
) -> Result<StuckSweep, PostgresError> {
    let outcomes: Vec<(bool,)> = sqlx::query_as(
        r#"
        WITH expired AS (
            SELECT m.id, (m.delivery_attempts >= s.max_delivery_attempts) AS exhausted
            FROM messages m
            JOIN subscriptions s ON s.id = m.subscription_id
            WHERE m.status = 'delivered'
              AND m.locked_at < NOW() - make_interval(secs => $1)
            ORDER BY m.locked_at ASC
            LIMIT $2
            FOR UPDATE OF m SKIP LOCKED
        )
        UPDATE messages m
        SET status = CASE WHEN e.exhausted THEN 'dlq' ELSE 'available' END,
            available_at = CASE WHEN e.exhausted THEN m.available_at ELSE NOW() END,
            locked_by = NULL,
            locked_at = NULL
        FROM expired e
        WHERE m.id = e.id
        RETURNING e.exhausted
        "#,
    )
    .bind(lock_timeout_secs as f64)
    .bind(i64::from(batch_size))
    .fetch_all(pool)
    .await?;

    let mut sweep = StuckSweep::default();
    for (exhausted,) in outcomes {
        if exhausted {
            sweep.dead_lettered += 1;
        } else {
            sweep.recovered += 1;
        }
    }

    counter!("fastpubsub_messages_recovered_total").increment(sweep.recovered);
    counter!("fastpubsub_messages_dead_lettered_total").increment(sweep.dead_lettered);
    Ok(sweep)
}

/// Delete one batch of acked messages older than `older_than_secs`.
/// Returns the number of rows removed.
pub async fn sweep_acked(
    pool: &PgPool,
    older_than_secs: u64,
    batch_size: u32,
) -> Result<u64, PostgresError> {
    let result = sqlx::query(
        r#"
        DELETE FROM messages
        WHERE id IN (
            SELECT id
            FROM messages
            WHERE status = 'acked'
              AND acked_at < NOW() - make_interval(secs => $1)
            LIMIT $2
        )
        "#,
    )
    .bind(older_than_secs as f64)
    .bind(i64::from(batch_size))
    .execute(pool)
    .await?;

    let deleted = result.rows_affected();
    counter!("fastpubsub_messages_swept_total").increment(deleted);
    Ok(deleted)
}
