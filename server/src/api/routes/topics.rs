//! Topic API endpoints

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use validator::Validate;

use crate::api::auth::{Action, AuthContext, Resource};
use crate::api::extractors::{ValidatedJson, ValidatedQuery};
use crate::api::types::{ApiError, PageQuery, PaginatedResponse};
use crate::data::postgres::repositories::{message, topic};
use crate::data::postgres::PostgresService;
use crate::data::types::TopicRow;

/// Shared state for topic endpoints
#[derive(Clone)]
pub struct TopicsApiState {
    pub database: Arc<PostgresService>,
}

/// Build topic routes
pub fn routes(database: Arc<PostgresService>) -> Router<()> {
    let state = TopicsApiState { database };

    Router::new()
        .route("/", get(list_topics).post(create_topic))
        .route("/{topic_id}", get(get_topic).delete(delete_topic))
        .route("/{topic_id}/messages", post(publish_messages))
        .with_state(state)
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTopicRequest {
    #[validate(length(min = 1, max = 128, message = "id must be 1-128 characters"))]
    pub id: String,
}

/// Create a topic with a caller-supplied ID
pub async fn create_topic(
    State(state): State<TopicsApiState>,
    Extension(auth): Extension<AuthContext>,
    ValidatedJson(body): ValidatedJson<CreateTopicRequest>,
) -> Result<(StatusCode, Json<TopicRow>), ApiError> {
    auth.require(Resource::Topics, Action::Create, Some(&body.id))?;

    let row = topic::create_topic(state.database.pool(), &body.id)
        .await
        .map_err(ApiError::from_postgres)?;

    Ok((StatusCode::CREATED, Json(row)))
}

/// Get a single topic by ID
pub async fn get_topic(
    State(state): State<TopicsApiState>,
    Extension(auth): Extension<AuthContext>,
    Path(topic_id): Path<String>,
) -> Result<Json<TopicRow>, ApiError> {
    auth.require(Resource::Topics, Action::Read, Some(&topic_id))?;

    let row = topic::get_topic(state.database.pool(), &topic_id)
        .await
        .map_err(ApiError::from_postgres)?
        .ok_or_else(|| {
            ApiError::not_found("TOPIC_NOT_FOUND", format!("Topic not found: {}", topic_id))
        })?;

    Ok(Json(row))
}

/// List topics with offset/limit pagination
pub async fn list_topics(
    State(state): State<TopicsApiState>,
    Extension(auth): Extension<AuthContext>,
    ValidatedQuery(query): ValidatedQuery<PageQuery>,
) -> Result<Json<PaginatedResponse<TopicRow>>, ApiError> {
    auth.require(Resource::Topics, Action::Read, None)?;

    let (topics, total) = topic::list_topics(state.database.pool(), query.offset, query.limit)
        .await
        .map_err(ApiError::from_postgres)?;

    Ok(Json(PaginatedResponse::new(
        topics,
        query.offset,
        query.limit,
        total,
    )))
}

/// Delete a topic, cascading to its subscriptions and their messages
pub async fn delete_topic(
    State(state): State<TopicsApiState>,
    Extension(auth): Extension<AuthContext>,
    Path(topic_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    auth.require(Resource::Topics, Action::Delete, Some(&topic_id))?;

    let deleted = topic::delete_topic(state.database.pool(), &topic_id)
        .await
        .map_err(ApiError::from_postgres)?;

    if !deleted {
        return Err(ApiError::not_found(
            "TOPIC_NOT_FOUND",
            format!("Topic not found: {}", topic_id),
        ));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Publish a batch of JSON payloads to a topic.
///
/// The fan-out to matching subscriptions is atomic per call; a topic with
/// zero subscriptions accepts the publish and discards it.
pub async fn publish_messages(
    State(state): State<TopicsApiState>,
    Extension(auth): Extension<AuthContext>,
    Path(topic_id): Path<String>,
    body: Result<Json<Vec<serde_json::Value>>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    auth.require(Resource::Topics, Action::Publish, Some(&topic_id))?;

    let Json(payloads) = body.map_err(|e| {
        ApiError::invalid_argument("JSON_PARSE_ERROR", e.body_text())
    })?;

    if payloads.is_empty() {
        return Err(ApiError::invalid_argument(
            "EMPTY_BATCH",
            "Publish batch must contain at least one payload",
        ));
    }
    if payloads.iter().any(|p| !p.is_object()) {
        return Err(ApiError::invalid_argument(
            "INVALID_PAYLOAD",
            "Every payload must be a JSON object",
        ));
    }

    message::publish(state.database.pool(), &topic_id, &payloads)
        .await
        .map_err(ApiError::from_postgres)?;

    Ok(StatusCode::NO_CONTENT)
}
