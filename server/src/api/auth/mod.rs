//! Bearer-token authentication and scope gating
//!
//! OAuth2 client-credentials: clients exchange `(client_id, client_secret)`
//! for a signed HS256 access token at `/oauth/token`. Every protected
//! request verifies the signature and expiry, re-reads the client row to
//! check `is_active` and that the token's `ver` still equals the client's
//! `token_version` (bumping the version is the revocation mechanism - there
//! is no blacklist), then evaluates the required scope in the handler.

pub mod jwt;
pub mod scopes;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use serde::Serialize;
use uuid::Uuid;

use crate::api::types::ApiError;
use crate::core::config::AuthConfig;
use crate::data::postgres::repositories::client;
use crate::data::postgres::PostgresService;
use crate::data::types::ClientRow;

pub use scopes::{Action, Resource, ScopeSet};

/// Token issuance and verification
pub struct AuthService {
    enabled: bool,
    signing_key: Vec<u8>,
    access_token_expire_minutes: u64,
}

/// Response body of the token endpoint
#[derive(Debug, Serialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

impl AuthService {
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let signing_key = match (&config.secret_key, config.enabled) {
            (Some(key), _) => hex::decode(key).context("AUTH_SECRET_KEY must be hex encoded")?,
            (None, false) => Vec::new(),
            (None, true) => anyhow::bail!("AUTH_SECRET_KEY is required when auth is enabled"),
        };

        Ok(Self {
            enabled: config.enabled,
            signing_key,
            access_token_expire_minutes: config.access_token_expire_minutes,
        })
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Issue an access token for a verified, active client
    pub fn issue_token(&self, client: &ClientRow) -> Result<IssuedToken> {
        let access_token = jwt::create_access_token(
            &self.signing_key,
            client.id,
            &client.scopes,
            client.token_version,
            self.access_token_expire_minutes,
        )?;
        Ok(IssuedToken {
            access_token,
            token_type: "bearer",
            expires_in: self.access_token_expire_minutes * 60,
        })
    }
}

/// Per-request authorization context, injected by `require_auth`
#[derive(Clone)]
pub struct AuthContext {
    scopes: Arc<ScopeSet>,
}

impl AuthContext {
    fn new(scopes: ScopeSet) -> Self {
        Self {
            scopes: Arc::new(scopes),
        }
    }

    /// Check that the context allows `action` on `resource` (optionally on
    /// one object); `PermissionDenied` otherwise.
    pub fn require(
        &self,
        resource: Resource,
        action: Action,
        object_id: Option<&str>,
    ) -> Result<(), ApiError> {
        if self.scopes.allows(resource, action, object_id) {
            return Ok(());
        }
        Err(ApiError::forbidden(
            "INSUFFICIENT_SCOPE",
            format!("Scope {}:{} required", resource, action),
        ))
    }
}

/// State for the auth middleware
#[derive(Clone)]
pub struct AuthState {
    pub auth: Arc<AuthService>,
    pub database: Arc<PostgresService>,
}

/// Authentication middleware
///
/// Always layered; when auth is disabled it injects a superuser context so
/// handler scope checks become no-ops.
pub async fn require_auth(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.auth.enabled {
        request.extensions_mut().insert(AuthContext::new(ScopeSet::superuser()));
        return Ok(next.run(request).await);
    }

    let token = bearer_token(&request).ok_or_else(|| {
        ApiError::unauthorized("MISSING_TOKEN", "Missing bearer token")
    })?;

    let claims = jwt::validate_access_token(token, &state.auth.signing_key)
        .map_err(|e| ApiError::unauthorized("INVALID_TOKEN", e.to_string()))?;

    let client_id: Uuid = claims
        .sub
        .parse()
        .map_err(|_| ApiError::unauthorized("INVALID_TOKEN", "Malformed subject claim"))?;

    // Re-read the client so deactivation and token_version bumps take
    // effect immediately, not at token expiry.
    let client = client::get_client(state.database.pool(), client_id)
        .await
        .map_err(ApiError::from_postgres)?
        .ok_or_else(|| ApiError::unauthorized("UNKNOWN_CLIENT", "Unknown client"))?;

    if !client.is_active {
        return Err(ApiError::unauthorized("CLIENT_INACTIVE", "Client is inactive"));
    }
    if client.token_version != claims.ver {
        return Err(ApiError::unauthorized("TOKEN_REVOKED", "Token has been revoked"));
    }

    let scopes = ScopeSet::parse(&claims.scopes)
        .map_err(|_| ApiError::unauthorized("INVALID_TOKEN", "Malformed scopes claim"))?;

    request.extensions_mut().insert(AuthContext::new(scopes));
    Ok(next.run(request).await)
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_service() -> AuthService {
        AuthService::from_config(&AuthConfig {
            enabled: true,
            secret_key: Some(hex::encode([7u8; 32])),
            access_token_expire_minutes: 30,
        })
        .unwrap()
    }

    fn sample_client(scopes: &str) -> ClientRow {
        let now = chrono::Utc::now();
        ClientRow {
            id: Uuid::new_v4(),
            name: "worker".into(),
            scopes: scopes.into(),
            is_active: true,
            token_version: 1,
            secret_hash: "salt$digest".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_service_requires_key_when_enabled() {
        let result = AuthService::from_config(&AuthConfig {
            enabled: true,
            secret_key: None,
            access_token_expire_minutes: 30,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_disabled_service_without_key() {
        let service = AuthService::from_config(&AuthConfig {
            enabled: false,
            secret_key: None,
            access_token_expire_minutes: 30,
        })
        .unwrap();
        assert!(!service.enabled());
    }

    #[test]
    fn test_issue_token_round_trip() {
        let service = enabled_service();
        let client = sample_client("topics:publish");
        let issued = service.issue_token(&client).unwrap();
        assert_eq!(issued.token_type, "bearer");
        assert_eq!(issued.expires_in, 30 * 60);

        let claims = jwt::validate_access_token(&issued.access_token, &service.signing_key).unwrap();
        assert_eq!(claims.sub, client.id.to_string());
        assert_eq!(claims.scopes, "topics:publish");
        assert_eq!(claims.ver, 1);
    }

    #[test]
    fn test_context_scope_gating() {
        let ctx = AuthContext::new(ScopeSet::parse("topics:publish:orders").unwrap());
        assert!(ctx
            .require(Resource::Topics, Action::Publish, Some("orders"))
            .is_ok());
        assert!(ctx
            .require(Resource::Topics, Action::Publish, Some("billing"))
            .is_err());
        assert!(ctx.require(Resource::Topics, Action::Read, None).is_err());

        let superuser = AuthContext::new(ScopeSet::superuser());
        assert!(superuser
            .require(Resource::Clients, Action::Delete, Some("x"))
            .is_ok());
    }
}
