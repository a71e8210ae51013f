//! OAuth2 client-credentials token endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::auth::{AuthService, IssuedToken};
use crate::api::extractors::ValidatedJson;
use crate::api::types::ApiError;
use crate::data::postgres::repositories::client;
use crate::data::postgres::PostgresService;
use crate::utils::crypto;

/// Shared state for the token endpoint
#[derive(Clone)]
pub struct OauthApiState {
    pub database: Arc<PostgresService>,
    pub auth: Arc<AuthService>,
}

/// Build oauth routes
pub fn routes(database: Arc<PostgresService>, auth: Arc<AuthService>) -> Router<()> {
    let state = OauthApiState { database, auth };

    Router::new()
        .route("/token", post(issue_token))
        .with_state(state)
}

#[derive(Debug, Deserialize, Validate)]
pub struct TokenRequest {
    #[validate(length(min = 1, message = "client_id is required"))]
    pub client_id: String,
    #[validate(length(min = 1, message = "client_secret is required"))]
    pub client_secret: String,
}

fn invalid_credentials() -> ApiError {
    ApiError::unauthorized("INVALID_CREDENTIALS", "Invalid client credentials")
}

/// Exchange client credentials for a bearer token.
///
/// Every failure mode (unknown client, bad secret, inactive client)
/// answers the same 401 so the endpoint does not leak which part failed.
pub async fn issue_token(
    State(state): State<OauthApiState>,
    ValidatedJson(body): ValidatedJson<TokenRequest>,
) -> Result<(StatusCode, Json<IssuedToken>), ApiError> {
    let client_id: Uuid = body.client_id.parse().map_err(|_| invalid_credentials())?;

    let client = client::get_client(state.database.pool(), client_id)
        .await
        .map_err(ApiError::from_postgres)?
        .ok_or_else(invalid_credentials)?;

    let secret_ok = crypto::verify_secret(&body.client_secret, &client.secret_hash)
        .map_err(|e| {
            tracing::error!(client_id = %client.id, error = %e, "Malformed stored secret hash");
            ApiError::internal("Credential verification failed")
        })?;

    if !secret_ok || !client.is_active {
        return Err(invalid_credentials());
    }

    let token = state.auth.issue_token(&client).map_err(|e| {
        tracing::error!(client_id = %client.id, error = %e, "Token issuance failed");
        ApiError::internal("Token issuance failed")
    })?;

    Ok((StatusCode::CREATED, Json(token)))
}
