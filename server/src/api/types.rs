//! Shared API types
//!
//! Error responses and pagination used across all endpoints. Engine error
//! kinds map to statuses here: NotFound 404, AlreadyExists 409,
//! InvalidArgument 422, Unauthenticated 401, PermissionDenied 403,
//! Unavailable 503, Internal 500.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::constants::DEFAULT_PAGE_LIMIT;
use crate::data::postgres::PostgresError;

/// Standard API error response
#[derive(Debug)]
pub enum ApiError {
    InvalidArgument { code: String, message: String },
    NotFound { code: String, message: String },
    Unauthorized { code: String, message: String },
    Forbidden { code: String, message: String },
    Conflict { code: String, message: String },
    ServiceUnavailable { message: String },
    Internal { message: String },
}

impl ApiError {
    pub fn invalid_argument(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn unauthorized(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unauthorized {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn forbidden(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Forbidden {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Map a storage error to its HTTP shape. Unexpected database errors
    /// are logged here and surfaced as an opaque 500; pool/connection
    /// failures report 503 so readiness and request paths agree.
    pub fn from_postgres(e: PostgresError) -> Self {
        match e {
            PostgresError::NotFound(what) => {
                Self::not_found("NOT_FOUND", format!("Not found: {}", what))
            }
            PostgresError::Conflict(_) => {
                Self::conflict("ALREADY_EXISTS", "Resource already exists")
            }
            PostgresError::Database(err) if is_unavailable(&err) => {
                tracing::error!(error = %err, "Database unavailable");
                Self::service_unavailable("Database unavailable")
            }
            other => {
                tracing::error!(error = %other, "Database error");
                Self::internal("Database operation failed")
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidArgument { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn is_unavailable(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_type, code, message) = match self {
            Self::InvalidArgument { code, message } => ("invalid_argument", code, message),
            Self::NotFound { code, message } => ("not_found", code, message),
            Self::Unauthorized { code, message } => ("unauthorized", code, message),
            Self::Forbidden { code, message } => ("forbidden", code, message),
            Self::Conflict { code, message } => ("conflict", code, message),
            Self::ServiceUnavailable { message } => (
                "service_unavailable",
                "SERVICE_UNAVAILABLE".to_string(),
                message,
            ),
            Self::Internal { message } => ("internal_error", "INTERNAL".to_string(), message),
        };
        (
            status,
            Json(serde_json::json!({
                "error": error_type,
                "code": code,
                "message": message
            })),
        )
            .into_response()
    }
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

/// Offset/limit pagination query parameters
#[derive(Debug, Deserialize, Validate)]
pub struct PageQuery {
    #[serde(default)]
    pub offset: u32,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 500, message = "limit must be between 1 and 500"))]
    pub limit: u32,
}

/// Pagination metadata in list responses
#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    pub offset: u32,
    pub limit: u32,
    pub total: u64,
}

/// Generic paginated response wrapper
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, offset: u32, limit: u32, total: u64) -> Self {
        Self {
            data,
            meta: PaginationMeta {
                offset,
                limit,
                total,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::invalid_argument("X", "y").status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::not_found("X", "y").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::unauthorized("X", "y").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::forbidden("X", "y").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::conflict("X", "y").status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::service_unavailable("y").status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::internal("y").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_postgres_error_mapping() {
        let e = ApiError::from_postgres(PostgresError::NotFound("topic t".into()));
        assert_eq!(e.status(), StatusCode::NOT_FOUND);

        let e = ApiError::from_postgres(PostgresError::Conflict("dup".into()));
        assert_eq!(e.status(), StatusCode::CONFLICT);

        let e = ApiError::from_postgres(PostgresError::Database(sqlx::Error::PoolTimedOut));
        assert_eq!(e.status(), StatusCode::SERVICE_UNAVAILABLE);

        let e = ApiError::from_postgres(PostgresError::Config("bad".into()));
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
