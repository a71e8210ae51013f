//! JWT access token handling

use std::fmt;

use anyhow::{Result, anyhow};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT validation error
#[derive(Debug)]
pub enum JwtError {
    /// Token has expired
    Expired,
    /// Token signature is invalid
    InvalidSignature,
    /// Other validation error
    Invalid(String),
}

impl fmt::Display for JwtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => write!(f, "Access token has expired"),
            Self::InvalidSignature => write!(f, "Invalid access token signature"),
            Self::Invalid(msg) => write!(f, "Invalid access token: {}", msg),
        }
    }
}

impl std::error::Error for JwtError {}

/// JWT claims for client-credentials access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Client ID
    pub sub: String,
    /// Space-separated scope list granted at issue time
    pub scopes: String,
    /// Client token_version at issue time; a mismatch on verification
    /// means the client was updated and the token is revoked
    pub ver: i32,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl AccessClaims {
    pub fn new(client_id: Uuid, scopes: &str, token_version: i32, expire_minutes: u64) -> Self {
        let now = Utc::now();
        let exp = now + Duration::minutes(expire_minutes as i64);

        Self {
            sub: client_id.to_string(),
            scopes: scopes.to_string(),
            ver: token_version,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }
}

/// Create a signed access token
pub fn create_access_token(
    signing_key: &[u8],
    client_id: Uuid,
    scopes: &str,
    token_version: i32,
    expire_minutes: u64,
) -> Result<String> {
    let claims = AccessClaims::new(client_id, scopes, token_version, expire_minutes);
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )
    .map_err(|e| anyhow!("Failed to create JWT: {}", e))
}

/// Validate and decode an access token
pub fn validate_access_token(token: &str, signing_key: &[u8]) -> Result<AccessClaims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.required_spec_claims.insert("exp".to_string());

    let token_data =
        decode::<AccessClaims>(token, &DecodingKey::from_secret(signing_key), &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                _ => JwtError::Invalid(e.to_string()),
            })?;

    Ok(token_data.claims)
}
