//! Subscription API endpoints: CRUD, consume/ack/nack, DLQ, metrics

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::api::auth::{Action, AuthContext, Resource};
use crate::api::extractors::{ValidatedJson, ValidatedQuery};
use crate::api::types::{ApiError, PageQuery, PaginatedResponse};
use crate::core::config::SubscriptionDefaults;
use crate::core::constants::{CONSUME_MAX_BATCH_SIZE, CONSUME_MIN_BATCH_SIZE};
use crate::data::postgres::repositories::subscription::NewSubscription;
use crate::data::postgres::repositories::{message, subscription};
use crate::data::postgres::PostgresService;
use crate::data::types::{LeasedMessage, MessageRow, SubscriptionMetrics, SubscriptionRow};
use crate::domain::filter;

/// Shared state for subscription endpoints
#[derive(Clone)]
pub struct SubscriptionsApiState {
    pub database: Arc<PostgresService>,
    pub defaults: SubscriptionDefaults,
}

/// Build subscription routes
pub fn routes(database: Arc<PostgresService>, defaults: SubscriptionDefaults) -> Router<()> {
    let state = SubscriptionsApiState { database, defaults };

    Router::new()
        .route("/", get(list_subscriptions).post(create_subscription))
        .route(
            "/{subscription_id}",
            get(get_subscription).delete(delete_subscription),
        )
        .route("/{subscription_id}/messages", get(consume_messages))
        .route("/{subscription_id}/acks", post(ack_messages))
        .route("/{subscription_id}/nacks", post(nack_messages))
        .route("/{subscription_id}/dlq", get(list_dlq))
        .route("/{subscription_id}/dlq/reprocess", post(reprocess_dlq))
        .route("/{subscription_id}/metrics", get(subscription_metrics))
        .with_state(state)
}

async fn require_subscription(
    state: &SubscriptionsApiState,
    id: &str,
) -> Result<SubscriptionRow, ApiError> {
    subscription::get_subscription(state.database.pool(), id)
        .await
        .map_err(ApiError::from_postgres)?
        .ok_or_else(|| {
            ApiError::not_found(
                "SUBSCRIPTION_NOT_FOUND",
                format!("Subscription not found: {}", id),
            )
        })
}

// =============================================================================
// CRUD
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubscriptionRequest {
    #[validate(length(min = 1, max = 128, message = "id must be 1-128 characters"))]
    pub id: String,
    #[validate(length(min = 1, max = 128, message = "topic_id must be 1-128 characters"))]
    pub topic_id: String,
    /// Equality-in-set filter; null or absent matches everything
    pub filter: Option<serde_json::Value>,
    pub max_delivery_attempts: Option<i32>,
    pub backoff_min_seconds: Option<i32>,
    pub backoff_max_seconds: Option<i32>,
}

/// Create a subscription on an existing topic.
///
/// Missing policy fields fall back to the configured defaults; the merged
/// policy and the filter document are validated before anything is written.
pub async fn create_subscription(
    State(state): State<SubscriptionsApiState>,
    Extension(auth): Extension<AuthContext>,
    ValidatedJson(body): ValidatedJson<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<SubscriptionRow>), ApiError> {
    auth.require(Resource::Subscriptions, Action::Create, Some(&body.id))?;

    let max_delivery_attempts = body
        .max_delivery_attempts
        .unwrap_or(state.defaults.max_delivery_attempts);
    let backoff_min_seconds = body
        .backoff_min_seconds
        .unwrap_or(state.defaults.backoff_min_seconds);
    let backoff_max_seconds = body
        .backoff_max_seconds
        .unwrap_or(state.defaults.backoff_max_seconds);

    if max_delivery_attempts < 1 {
        return Err(ApiError::invalid_argument(
            "INVALID_POLICY",
            "max_delivery_attempts must be >= 1",
        ));
    }
    if backoff_min_seconds < 0 {
        return Err(ApiError::invalid_argument(
            "INVALID_POLICY",
            "backoff_min_seconds must be >= 0",
        ));
    }
    if backoff_max_seconds < backoff_min_seconds {
        return Err(ApiError::invalid_argument(
            "INVALID_POLICY",
            "backoff_max_seconds must be >= backoff_min_seconds",
        ));
    }

    filter::validate(body.filter.as_ref())
        .map_err(|e| ApiError::invalid_argument("INVALID_FILTER", e.to_string()))?;

    // Normalize JSON null to SQL NULL so the fan-out statement only has
    // one match-all representation to consider.
    let normalized_filter = body.filter.filter(|f| !f.is_null());

    let row = subscription::create_subscription(
        state.database.pool(),
        NewSubscription {
            id: body.id,
            topic_id: body.topic_id,
            filter: normalized_filter,
            max_delivery_attempts,
            backoff_min_seconds,
            backoff_max_seconds,
        },
    )
    .await
    .map_err(ApiError::from_postgres)?;

    Ok((StatusCode::CREATED, Json(row)))
}

/// Get a single subscription by ID
pub async fn get_subscription(
    State(state): State<SubscriptionsApiState>,
    Extension(auth): Extension<AuthContext>,
    Path(subscription_id): Path<String>,
) -> Result<Json<SubscriptionRow>, ApiError> {
    auth.require(Resource::Subscriptions, Action::Read, Some(&subscription_id))?;
    let row = require_subscription(&state, &subscription_id).await?;
    Ok(Json(row))
}

/// List subscriptions with offset/limit pagination
pub async fn list_subscriptions(
    State(state): State<SubscriptionsApiState>,
    Extension(auth): Extension<AuthContext>,
    ValidatedQuery(query): ValidatedQuery<PageQuery>,
) -> Result<Json<PaginatedResponse<SubscriptionRow>>, ApiError> {
    auth.require(Resource::Subscriptions, Action::Read, None)?;

    let (subscriptions, total) =
        subscription::list_subscriptions(state.database.pool(), query.offset, query.limit)
            .await
            .map_err(ApiError::from_postgres)?;

    Ok(Json(PaginatedResponse::new(
        subscriptions,
        query.offset,
        query.limit,
        total,
    )))
}

/// Delete a subscription, cascading to its messages
pub async fn delete_subscription(
    State(state): State<SubscriptionsApiState>,
    Extension(auth): Extension<AuthContext>,
    Path(subscription_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    auth.require(
        Resource::Subscriptions,
        Action::Delete,
        Some(&subscription_id),
    )?;

    let deleted = subscription::delete_subscription(state.database.pool(), &subscription_id)
        .await
        .map_err(ApiError::from_postgres)?;

    if !deleted {
        return Err(ApiError::not_found(
            "SUBSCRIPTION_NOT_FOUND",
            format!("Subscription not found: {}", subscription_id),
        ));
    }
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Consume / ack / nack
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct ConsumeQuery {
    #[validate(length(min = 1, max = 256, message = "consumer_id must be 1-256 characters"))]
    pub consumer_id: String,
    pub batch_size: u32,
}

#[derive(Debug, Serialize)]
pub struct ConsumeResponse {
    pub data: Vec<LeasedMessage>,
}

/// Lease a batch of messages for a consumer.
///
/// Concurrent consumers never receive the same message; rows locked by
/// other transactions are skipped rather than waited on.
pub async fn consume_messages(
    State(state): State<SubscriptionsApiState>,
    Extension(auth): Extension<AuthContext>,
    Path(subscription_id): Path<String>,
    ValidatedQuery(query): ValidatedQuery<ConsumeQuery>,
) -> Result<Json<ConsumeResponse>, ApiError> {
    auth.require(
        Resource::Subscriptions,
        Action::Consume,
        Some(&subscription_id),
    )?;

    if !(CONSUME_MIN_BATCH_SIZE..=CONSUME_MAX_BATCH_SIZE).contains(&query.batch_size) {
        return Err(ApiError::invalid_argument(
            "INVALID_BATCH_SIZE",
            format!(
                "batch_size must be between {} and {}",
                CONSUME_MIN_BATCH_SIZE, CONSUME_MAX_BATCH_SIZE
            ),
        ));
    }

    require_subscription(&state, &subscription_id).await?;

    let data = message::consume(
        state.database.pool(),
        &subscription_id,
        &query.consumer_id,
        query.batch_size,
    )
    .await
    .map_err(ApiError::from_postgres)?;

    Ok(Json(ConsumeResponse { data }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConsumerQuery {
    #[validate(length(min = 1, max = 256, message = "consumer_id must be 1-256 characters"))]
    pub consumer_id: String,
}

fn message_ids(body: Result<Json<Vec<Uuid>>, JsonRejection>) -> Result<Vec<Uuid>, ApiError> {
    let Json(ids) = body.map_err(|e| ApiError::invalid_argument("JSON_PARSE_ERROR", e.body_text()))?;
    if ids.is_empty() {
        return Err(ApiError::invalid_argument(
            "EMPTY_BATCH",
            "Message ID batch must not be empty",
        ));
    }
    Ok(ids)
}

/// Acknowledge messages leased by this consumer.
///
/// Messages not owned by the caller, or no longer delivered, are skipped
/// silently: retries and lease recovery race with acks by design.
pub async fn ack_messages(
    State(state): State<SubscriptionsApiState>,
    Extension(auth): Extension<AuthContext>,
    Path(subscription_id): Path<String>,
    ValidatedQuery(query): ValidatedQuery<ConsumerQuery>,
    body: Result<Json<Vec<Uuid>>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    auth.require(
        Resource::Subscriptions,
        Action::Consume,
        Some(&subscription_id),
    )?;

    let ids = message_ids(body)?;
    require_subscription(&state, &subscription_id).await?;

    message::ack(
        state.database.pool(),
        &subscription_id,
        &query.consumer_id,
        &ids,
    )
    .await
    .map_err(ApiError::from_postgres)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Negatively acknowledge messages leased by this consumer.
///
/// Exhausted messages move to the DLQ; the rest retry after exponential
/// backoff. Ownership rules match ack.
pub async fn nack_messages(
    State(state): State<SubscriptionsApiState>,
    Extension(auth): Extension<AuthContext>,
    Path(subscription_id): Path<String>,
    ValidatedQuery(query): ValidatedQuery<ConsumerQuery>,
    body: Result<Json<Vec<Uuid>>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    auth.require(
        Resource::Subscriptions,
        Action::Consume,
        Some(&subscription_id),
    )?;

    let ids = message_ids(body)?;
    require_subscription(&state, &subscription_id).await?;

    message::nack(
        state.database.pool(),
        &subscription_id,
        &query.consumer_id,
        &ids,
    )
    .await
    .map_err(ApiError::from_postgres)?;

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// DLQ and metrics
// =============================================================================

/// List dead-lettered messages, oldest first
pub async fn list_dlq(
    State(state): State<SubscriptionsApiState>,
    Extension(auth): Extension<AuthContext>,
    Path(subscription_id): Path<String>,
    ValidatedQuery(query): ValidatedQuery<PageQuery>,
) -> Result<Json<PaginatedResponse<MessageRow>>, ApiError> {
    auth.require(Resource::Subscriptions, Action::Read, Some(&subscription_id))?;
    require_subscription(&state, &subscription_id).await?;

    let (messages, total) = message::list_dlq(
        state.database.pool(),
        &subscription_id,
        query.offset,
        query.limit,
    )
    .await
    .map_err(ApiError::from_postgres)?;

    Ok(Json(PaginatedResponse::new(
        messages,
        query.offset,
        query.limit,
        total,
    )))
}

/// Return dead-lettered messages to the available pool with a fresh
/// attempt budget. IDs not currently in the DLQ are ignored.
pub async fn reprocess_dlq(
    State(state): State<SubscriptionsApiState>,
    Extension(auth): Extension<AuthContext>,
    Path(subscription_id): Path<String>,
    body: Result<Json<Vec<Uuid>>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    auth.require(
        Resource::Subscriptions,
        Action::Update,
        Some(&subscription_id),
    )?;

    let ids = message_ids(body)?;
    require_subscription(&state, &subscription_id).await?;

    message::reprocess_dlq(state.database.pool(), &subscription_id, &ids)
        .await
        .map_err(ApiError::from_postgres)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Point-in-time message counts per status
pub async fn subscription_metrics(
    State(state): State<SubscriptionsApiState>,
    Extension(auth): Extension<AuthContext>,
    Path(subscription_id): Path<String>,
) -> Result<Json<SubscriptionMetrics>, ApiError> {
    auth.require(Resource::Subscriptions, Action::Read, Some(&subscription_id))?;
    require_subscription(&state, &subscription_id).await?;

    let metrics = message::metrics(state.database.pool(), &subscription_id)
        .await
        .map_err(ApiError::from_postgres)?;

    Ok(Json(metrics))
}
