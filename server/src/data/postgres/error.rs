//! PostgreSQL error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostgresError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration {version} ({name}) failed: {error}")]
    MigrationFailed {
        version: i32,
        name: String,
        error: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for PostgresError {
    fn from(e: sqlx::Error) -> Self {
        // Unique violations surface as conflicts so callers can answer 409
        // instead of 500 when an ID collides.
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return PostgresError::Conflict(db.message().to_string());
            }
        }
        PostgresError::Database(e)
    }
}
