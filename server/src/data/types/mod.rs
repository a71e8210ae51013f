//! Row types shared between the repositories and the API layer

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message lifecycle state, stored as TEXT with a CHECK constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Available,
    Delivered,
    Acked,
    Dlq,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Available => "available",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Acked => "acked",
            MessageStatus::Dlq => "dlq",
        }
    }
}

impl TryFrom<String> for MessageStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "available" => Ok(MessageStatus::Available),
            "delivered" => Ok(MessageStatus::Delivered),
            "acked" => Ok(MessageStatus::Acked),
            "dlq" => Ok(MessageStatus::Dlq),
            other => Err(format!("Unknown message status: {}", other)),
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A topic row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TopicRow {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// A subscription row, including its retry policy
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SubscriptionRow {
    pub id: String,
    pub topic_id: String,
    pub filter: Option<serde_json::Value>,
    pub max_delivery_attempts: i32,
    pub backoff_min_seconds: i32,
    pub backoff_max_seconds: i32,
    pub created_at: DateTime<Utc>,
}

/// A full message row (DLQ listing, diagnostics)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MessageRow {
    pub id: Uuid,
    pub subscription_id: String,
    pub payload: serde_json::Value,
    #[sqlx(try_from = "String")]
    pub status: MessageStatus,
    pub delivery_attempts: i32,
    pub available_at: DateTime<Utc>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub acked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// The consumer-facing view of a leased message
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LeasedMessage {
    pub id: Uuid,
    pub payload: serde_json::Value,
    pub delivery_attempts: i32,
    pub created_at: DateTime<Utc>,
}

/// Point-in-time per-status counts for one subscription
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionMetrics {
    pub available: i64,
    pub delivered: i64,
    pub acked: i64,
    pub dlq: i64,
}

/// An auth client row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClientRow {
    pub id: Uuid,
    pub name: String,
    pub scopes: String,
    pub is_active: bool,
    pub token_version: i32,
    pub secret_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
