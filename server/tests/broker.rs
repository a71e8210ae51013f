//! End-to-end dispatch engine scenarios against a real PostgreSQL.
//!
//! These tests connect to `FASTPUBSUB_TEST_DATABASE_URL` and skip
//! themselves when it is unset. Time-dependent behavior (backoff, lease
//! expiry, retention) is exercised by rewinding row timestamps instead of
//! sleeping, so the suite stays fast.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use fastpubsub_server::core::config::PostgresConfig;
use fastpubsub_server::data::postgres::repositories::subscription::NewSubscription;
use fastpubsub_server::data::postgres::repositories::{message, subscription, topic};
use fastpubsub_server::data::postgres::{PostgresError, PostgresService};
use fastpubsub_server::workers::cleanup;

const TEST_DATABASE_URL: &str = "FASTPUBSUB_TEST_DATABASE_URL";

/// The sweepers scan the whole messages table, so tests that rely on sweep
/// outcomes serialize against each other; everything else isolates itself
/// with unique topic and subscription IDs.
static SWEEP_LOCK: std::sync::LazyLock<tokio::sync::Mutex<()>> =
    std::sync::LazyLock::new(|| tokio::sync::Mutex::new(()));

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var(TEST_DATABASE_URL).ok()?;
    let service = PostgresService::init(&PostgresConfig {
        url,
        echo: false,
        pool_size: 5,
        max_overflow: 5,
        pre_ping: true,
    })
    .await
    .expect("connect to test database");
    Some(service.pool().clone())
}

macro_rules! require_db {
    () => {
        match test_pool().await {
            Some(pool) => pool,
            None => {
                eprintln!("skipping: {} not set", TEST_DATABASE_URL);
                return;
            }
        }
    };
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

async fn make_topic(pool: &PgPool) -> String {
    let id = unique("topic");
    topic::create_topic(pool, &id).await.expect("create topic");
    id
}

async fn make_subscription(
    pool: &PgPool,
    topic_id: &str,
    filter: Option<serde_json::Value>,
    max_attempts: i32,
    backoff_min: i32,
    backoff_max: i32,
) -> String {
    let id = unique("sub");
    subscription::create_subscription(
        pool,
        NewSubscription {
            id: id.clone(),
            topic_id: topic_id.to_string(),
            filter,
            max_delivery_attempts: max_attempts,
            backoff_min_seconds: backoff_min,
            backoff_max_seconds: backoff_max,
        },
    )
    .await
    .expect("create subscription");
    id
}

/// Rewind every message timestamp of a subscription by `secs` so backoff
/// and retention windows elapse without sleeping.
async fn rewind_messages(pool: &PgPool, subscription_id: &str, secs: i64) {
    sqlx::query(
        r#"
        UPDATE messages
        SET available_at = available_at - make_interval(secs => $2),
            locked_at = locked_at - make_interval(secs => $2),
            acked_at = acked_at - make_interval(secs => $2)
        WHERE subscription_id = $1
        "#,
    )
    .bind(subscription_id)
    .bind(secs as f64)
    .execute(pool)
    .await
    .expect("rewind messages");
}

async fn message_state(
    pool: &PgPool,
    id: Uuid,
) -> (String, i32, DateTime<Utc>, Option<String>) {
    sqlx::query_as(
        "SELECT status, delivery_attempts, available_at, locked_by FROM messages WHERE id = $1",
    )
    .bind(id)
    .fetch_one(pool)
    .await
    .expect("fetch message state")
}

// =============================================================================
// Publish fan-out with filtering
// =============================================================================

#[tokio::test]
async fn fanout_respects_subscription_filters() {
    let pool = require_db!();
    let topic_id = make_topic(&pool).await;

    let sub_all = make_subscription(&pool, &topic_id, None, 5, 5, 300).await;
    let sub_br =
        make_subscription(&pool, &topic_id, Some(json!({"country": ["BR"]})), 5, 5, 300).await;
    let sub_us =
        make_subscription(&pool, &topic_id, Some(json!({"country": ["US"]})), 5, 5, 300).await;

    let inserted = message::publish(
        &pool,
        &topic_id,
        &[
            json!({"country": "BR", "x": 1}),
            json!({"country": "US", "x": 2}),
            json!({"country": "JP", "x": 3}),
        ],
    )
    .await
    .unwrap();
    assert_eq!(inserted, 5);

    assert_eq!(message::metrics(&pool, &sub_all).await.unwrap().available, 3);
    assert_eq!(message::metrics(&pool, &sub_br).await.unwrap().available, 1);
    assert_eq!(message::metrics(&pool, &sub_us).await.unwrap().available, 1);

    // The JP payload was dropped for the filtered subscriptions, not queued.
    let br_messages = message::consume(&pool, &sub_br, "w1", 10).await.unwrap();
    assert_eq!(br_messages.len(), 1);
    assert_eq!(br_messages[0].payload["country"], "BR");
}

#[tokio::test]
async fn publish_to_unknown_topic_is_not_found() {
    let pool = require_db!();
    let result = message::publish(&pool, "no-such-topic", &[json!({"x": 1})]).await;
    assert!(matches!(result, Err(PostgresError::NotFound(_))));
}

#[tokio::test]
async fn publish_to_topic_without_subscriptions_discards() {
    let pool = require_db!();
    let topic_id = make_topic(&pool).await;
    let inserted = message::publish(&pool, &topic_id, &[json!({"x": 1})]).await.unwrap();
    assert_eq!(inserted, 0);
}

#[tokio::test]
async fn filter_equality_is_typed() {
    let pool = require_db!();
    let topic_id = make_topic(&pool).await;
    let sub = make_subscription(
        &pool,
        &topic_id,
        Some(json!({"code": [1], "flag": [true]})),
        5,
        5,
        300,
    )
    .await;

    message::publish(
        &pool,
        &topic_id,
        &[
            json!({"code": 1, "flag": true}),
            json!({"code": "1", "flag": true}),
            json!({"code": 1, "flag": "true"}),
            json!({"flag": true}),
        ],
    )
    .await
    .unwrap();

    // Only the payload with the right types on both keys fans out.
    assert_eq!(message::metrics(&pool, &sub).await.unwrap().available, 1);
}

#[tokio::test]
async fn filter_keys_are_a_conjunction() {
    let pool = require_db!();
    let topic_id = make_topic(&pool).await;
    let sub = make_subscription(
        &pool,
        &topic_id,
        Some(json!({"country": ["BR", "US"], "tier": [1, 2]})),
        5,
        5,
        300,
    )
    .await;

    message::publish(
        &pool,
        &topic_id,
        &[
            json!({"country": "US", "tier": 2, "extra": true}),
            json!({"country": "US", "tier": 3}),
            json!({"country": "FR", "tier": 1}),
            // A missing filter key fails the match for that key.
            json!({"country": "BR"}),
        ],
    )
    .await
    .unwrap();

    assert_eq!(message::metrics(&pool, &sub).await.unwrap().available, 1);
}

#[tokio::test]
async fn filter_null_is_a_listable_value() {
    let pool = require_db!();
    let topic_id = make_topic(&pool).await;
    let sub =
        make_subscription(&pool, &topic_id, Some(json!({"parent": [null]})), 5, 5, 300).await;

    message::publish(
        &pool,
        &topic_id,
        &[
            json!({"parent": null}),
            json!({"parent": "root"}),
            // A missing key is not the same as an explicit null.
            json!({}),
        ],
    )
    .await
    .unwrap();

    assert_eq!(message::metrics(&pool, &sub).await.unwrap().available, 1);
}

// =============================================================================
// Single-consumer lease and consumer-scoped ack
// =============================================================================

#[tokio::test]
async fn lease_is_exclusive_and_ack_is_consumer_scoped() {
    let pool = require_db!();
    let topic_id = make_topic(&pool).await;
    let sub = make_subscription(&pool, &topic_id, None, 5, 5, 300).await;

    message::publish(&pool, &topic_id, &[json!({"n": 1})]).await.unwrap();

    let leased = message::consume(&pool, &sub, "w1", 10).await.unwrap();
    assert_eq!(leased.len(), 1);
    assert_eq!(leased[0].delivery_attempts, 1);
    let id = leased[0].id;

    // A second immediate consume sees nothing available.
    let again = message::consume(&pool, &sub, "w1", 10).await.unwrap();
    assert!(again.is_empty());

    // Ack from the wrong consumer is a silent no-op.
    let acked = message::ack(&pool, &sub, "w2", &[id]).await.unwrap();
    assert_eq!(acked, 0);
    let (status, _, _, locked_by) = message_state(&pool, id).await;
    assert_eq!(status, "delivered");
    assert_eq!(locked_by.as_deref(), Some("w1"));

    // Ack from the owner completes the lease.
    let acked = message::ack(&pool, &sub, "w1", &[id]).await.unwrap();
    assert_eq!(acked, 1);
    let metrics = message::metrics(&pool, &sub).await.unwrap();
    assert_eq!(metrics.acked, 1);
    assert_eq!(metrics.delivered, 0);

    // Acking twice changes nothing.
    let acked = message::ack(&pool, &sub, "w1", &[id]).await.unwrap();
    assert_eq!(acked, 0);
}

#[tokio::test]
async fn nack_is_consumer_scoped() {
    let pool = require_db!();
    let topic_id = make_topic(&pool).await;
    let sub = make_subscription(&pool, &topic_id, None, 5, 5, 300).await;

    message::publish(&pool, &topic_id, &[json!({"n": 1})]).await.unwrap();
    let leased = message::consume(&pool, &sub, "w1", 1).await.unwrap();
    let id = leased[0].id;

    let nacked = message::nack(&pool, &sub, "w2", &[id]).await.unwrap();
    assert_eq!(nacked, 0);
    let (status, attempts, _, _) = message_state(&pool, id).await;
    assert_eq!(status, "delivered");
    assert_eq!(attempts, 1);
}

// =============================================================================
// Retry with exponential backoff, then DLQ
// =============================================================================

#[tokio::test]
async fn nack_backs_off_exponentially_then_dead_letters() {
    let pool = require_db!();
    let topic_id = make_topic(&pool).await;
    let sub = make_subscription(&pool, &topic_id, None, 3, 5, 30).await;

    message::publish(&pool, &topic_id, &[json!({"n": 1})]).await.unwrap();

    // Attempt 1: nack reschedules ~5s out.
    let id = message::consume(&pool, &sub, "w1", 1).await.unwrap()[0].id;
    let before = Utc::now();
    message::nack(&pool, &sub, "w1", &[id]).await.unwrap();
    let (status, attempts, available_at, locked_by) = message_state(&pool, id).await;
    assert_eq!(status, "available");
    assert_eq!(attempts, 1);
    assert!(locked_by.is_none());
    assert!(available_at >= before + Duration::seconds(4));
    assert!(available_at <= Utc::now() + Duration::seconds(6));

    // Not yet available; the backoff gate holds.
    assert!(message::consume(&pool, &sub, "w1", 1).await.unwrap().is_empty());

    // Attempt 2: rewind past the backoff, nack again -> ~10s.
    rewind_messages(&pool, &sub, 6).await;
    let id = message::consume(&pool, &sub, "w1", 1).await.unwrap()[0].id;
    let before = Utc::now();
    message::nack(&pool, &sub, "w1", &[id]).await.unwrap();
    let (_, attempts, available_at, _) = message_state(&pool, id).await;
    assert_eq!(attempts, 2);
    assert!(available_at >= before + Duration::seconds(9));
    assert!(available_at <= Utc::now() + Duration::seconds(11));

    // Attempt 3 exhausts the budget -> DLQ.
    rewind_messages(&pool, &sub, 11).await;
    let id = message::consume(&pool, &sub, "w1", 1).await.unwrap()[0].id;
    message::nack(&pool, &sub, "w1", &[id]).await.unwrap();
    let (status, attempts, _, locked_by) = message_state(&pool, id).await;
    assert_eq!(status, "dlq");
    assert_eq!(attempts, 3);
    assert!(locked_by.is_none());

    let metrics = message::metrics(&pool, &sub).await.unwrap();
    assert_eq!(metrics.dlq, 1);
    assert_eq!(metrics.available, 0);
}

#[tokio::test]
async fn backoff_is_capped_at_max() {
    let pool = require_db!();
    let topic_id = make_topic(&pool).await;
    let sub = make_subscription(&pool, &topic_id, None, 10, 10, 25).await;

    message::publish(&pool, &topic_id, &[json!({"n": 1})]).await.unwrap();

    // Third failure would be 40s uncapped; the policy caps it at 25s.
    for _ in 0..2 {
        let id = message::consume(&pool, &sub, "w1", 1).await.unwrap()[0].id;
        message::nack(&pool, &sub, "w1", &[id]).await.unwrap();
        rewind_messages(&pool, &sub, 60).await;
    }
    let id = message::consume(&pool, &sub, "w1", 1).await.unwrap()[0].id;
    let before = Utc::now();
    message::nack(&pool, &sub, "w1", &[id]).await.unwrap();
    let (_, attempts, available_at, _) = message_state(&pool, id).await;
    assert_eq!(attempts, 3);
    assert!(available_at >= before + Duration::seconds(24));
    assert!(available_at <= Utc::now() + Duration::seconds(26));
}

// =============================================================================
// Stuck-lease recovery
// =============================================================================

#[tokio::test]
async fn stuck_sweeper_recovers_expired_leases() {
    let _guard = SWEEP_LOCK.lock().await;
    let pool = require_db!();
    let topic_id = make_topic(&pool).await;
    let sub = make_subscription(&pool, &topic_id, None, 3, 5, 300).await;

    message::publish(&pool, &topic_id, &[json!({"n": 1})]).await.unwrap();
    let id = message::consume(&pool, &sub, "w1", 1).await.unwrap()[0].id;

    // Fresh lease is untouched.
    message::sweep_stuck(&pool, 60, 100).await.unwrap();
    let (status, _, _, _) = message_state(&pool, id).await;
    assert_eq!(status, "delivered");

    // Expired lease is released immediately, attempt already counted.
    rewind_messages(&pool, &sub, 61).await;
    let sweep = message::sweep_stuck(&pool, 60, 100).await.unwrap();
    assert!(sweep.recovered >= 1);

    let (status, attempts, _, locked_by) = message_state(&pool, id).await;
    assert_eq!(status, "available");
    assert_eq!(attempts, 1);
    assert!(locked_by.is_none());

    // The next consume picks it up again.
    let leased = message::consume(&pool, &sub, "w2", 1).await.unwrap();
    assert_eq!(leased.len(), 1);
    assert_eq!(leased[0].id, id);
    assert_eq!(leased[0].delivery_attempts, 2);
}

#[tokio::test]
async fn stuck_sweeper_dead_letters_exhausted_messages() {
    let _guard = SWEEP_LOCK.lock().await;
    let pool = require_db!();
    let topic_id = make_topic(&pool).await;
    let sub = make_subscription(&pool, &topic_id, None, 1, 5, 300).await;

    message::publish(&pool, &topic_id, &[json!({"n": 1})]).await.unwrap();
    let id = message::consume(&pool, &sub, "w1", 1).await.unwrap()[0].id;

    rewind_messages(&pool, &sub, 120).await;
    let sweep = cleanup::run_stuck_cleanup(&pool, 60, 100).await.unwrap();
    assert!(sweep.dead_lettered >= 1);

    let (status, attempts, _, _) = message_state(&pool, id).await;
    assert_eq!(status, "dlq");
    assert_eq!(attempts, 1);
}

// =============================================================================
// DLQ listing and reprocess
// =============================================================================

#[tokio::test]
async fn dlq_reprocess_resets_the_attempt_budget() {
    let pool = require_db!();
    let topic_id = make_topic(&pool).await;
    let sub = make_subscription(&pool, &topic_id, None, 1, 5, 300).await;

    message::publish(&pool, &topic_id, &[json!({"n": 1})]).await.unwrap();
    let id = message::consume(&pool, &sub, "w1", 1).await.unwrap()[0].id;
    message::nack(&pool, &sub, "w1", &[id]).await.unwrap();

    let (dlq, total) = message::list_dlq(&pool, &sub, 0, 50).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(dlq[0].id, id);

    let reprocessed = message::reprocess_dlq(&pool, &sub, &[id]).await.unwrap();
    assert_eq!(reprocessed, 1);

    let (status, attempts, _, _) = message_state(&pool, id).await;
    assert_eq!(status, "available");
    assert_eq!(attempts, 0);

    let leased = message::consume(&pool, &sub, "w1", 1).await.unwrap();
    assert_eq!(leased.len(), 1);
    assert_eq!(leased[0].id, id);

    // Reprocessing a non-DLQ message is a no-op.
    let reprocessed = message::reprocess_dlq(&pool, &sub, &[id]).await.unwrap();
    assert_eq!(reprocessed, 0);
}

// =============================================================================
// Skip-locked concurrency
// =============================================================================

#[tokio::test]
async fn concurrent_consumers_partition_the_backlog() {
    let pool = require_db!();
    let topic_id = make_topic(&pool).await;
    let sub = make_subscription(&pool, &topic_id, None, 5, 5, 300).await;

    let payloads: Vec<serde_json::Value> = (0..80).map(|i| json!({"n": i})).collect();
    message::publish(&pool, &topic_id, &payloads).await.unwrap();

    let (a, b) = tokio::join!(
        message::consume(&pool, &sub, "w1", 50),
        message::consume(&pool, &sub, "w2", 50),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert!(!a.is_empty() && a.len() <= 50);
    assert!(!b.is_empty() && b.len() <= 50);
    assert_eq!(a.len() + b.len(), 80);

    let mut ids: Vec<Uuid> = a.iter().chain(b.iter()).map(|m| m.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 80);
}

#[tokio::test]
async fn consume_returns_oldest_first() {
    let pool = require_db!();
    let topic_id = make_topic(&pool).await;
    let sub = make_subscription(&pool, &topic_id, None, 5, 5, 300).await;

    for i in 0..3 {
        message::publish(&pool, &topic_id, &[json!({"n": i})]).await.unwrap();
    }

    let leased = message::consume(&pool, &sub, "w1", 10).await.unwrap();
    let order: Vec<i64> = leased
        .iter()
        .map(|m| m.payload["n"].as_i64().unwrap())
        .collect();
    assert_eq!(order, vec![0, 1, 2]);
}

// =============================================================================
// Acked retention sweeper
// =============================================================================

#[tokio::test]
async fn acked_sweeper_deletes_only_old_acked_rows() {
    let pool = require_db!();
    let topic_id = make_topic(&pool).await;
    let sub = make_subscription(&pool, &topic_id, None, 5, 5, 300).await;

    message::publish(&pool, &topic_id, &[json!({"n": 1}), json!({"n": 2})]).await.unwrap();
    let leased = message::consume(&pool, &sub, "w1", 10).await.unwrap();
    let ids: Vec<Uuid> = leased.iter().map(|m| m.id).collect();
    message::ack(&pool, &sub, "w1", &ids).await.unwrap();

    // Fresh acked rows survive the sweep.
    cleanup::run_acked_cleanup(&pool, 3600, 100).await.unwrap();
    assert_eq!(message::metrics(&pool, &sub).await.unwrap().acked, 2);

    // Past the retention window they are gone for good.
    rewind_messages(&pool, &sub, 3601).await;
    let deleted = cleanup::run_acked_cleanup(&pool, 3600, 100).await.unwrap();
    assert!(deleted >= 2);
    assert_eq!(message::metrics(&pool, &sub).await.unwrap().acked, 0);
}

// =============================================================================
// Cascade delete
// =============================================================================

#[tokio::test]
async fn deleting_a_topic_cascades_to_subscriptions_and_messages() {
    let pool = require_db!();
    let topic_id = make_topic(&pool).await;
    let sub = make_subscription(&pool, &topic_id, None, 5, 5, 300).await;
    message::publish(&pool, &topic_id, &[json!({"n": 1})]).await.unwrap();

    assert!(topic::delete_topic(&pool, &topic_id).await.unwrap());

    assert!(subscription::get_subscription(&pool, &sub)
        .await
        .unwrap()
        .is_none());
    let remaining: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE subscription_id = $1")
            .bind(&sub)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn duplicate_ids_conflict() {
    let pool = require_db!();
    let topic_id = make_topic(&pool).await;
    let result = topic::create_topic(&pool, &topic_id).await;
    assert!(matches!(result, Err(PostgresError::Conflict(_))));

    let sub = make_subscription(&pool, &topic_id, None, 5, 5, 300).await;
    let result = subscription::create_subscription(
        &pool,
        NewSubscription {
            id: sub,
            topic_id: topic_id.clone(),
            filter: None,
            max_delivery_attempts: 5,
            backoff_min_seconds: 5,
            backoff_max_seconds: 300,
        },
    )
    .await;
    assert!(matches!(result, Err(PostgresError::Conflict(_))));
}

#[tokio::test]
async fn subscription_on_unknown_topic_is_not_found() {
    let pool = require_db!();
    let result = subscription::create_subscription(
        &pool,
        NewSubscription {
            id: unique("sub"),
            topic_id: "no-such-topic".into(),
            filter: None,
            max_delivery_attempts: 5,
            backoff_min_seconds: 5,
            backoff_max_seconds: 300,
        },
    )
    .await;
    assert!(matches!(result, Err(PostgresError::NotFound(_))));
}
