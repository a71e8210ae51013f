//! PostgreSQL schema definitions

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema SQL
///
/// The three message indices back the hot paths: consume scans
/// `(subscription_id, status, available_at)`, the acked sweeper scans
/// `(subscription_id, status, acked_at)`, and the stuck sweeper uses the
/// partial `(status, locked_at)` index restricted to delivered rows.
pub const SCHEMA: &str = r#"
-- =============================================================================
-- Infrastructure: Schema version tracking
-- =============================================================================
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL,
    execution_time_ms BIGINT,
    success BOOLEAN NOT NULL DEFAULT TRUE
);

-- =============================================================================
-- 1. Topics
-- =============================================================================
CREATE TABLE IF NOT EXISTS topics (
    id TEXT PRIMARY KEY CHECK(length(id) >= 1 AND length(id) <= 128),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- =============================================================================
-- 2. Subscriptions (references topics)
-- =============================================================================
CREATE TABLE IF NOT EXISTS subscriptions (
    id TEXT PRIMARY KEY CHECK(length(id) >= 1 AND length(id) <= 128),
    topic_id TEXT NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    filter JSONB,
    max_delivery_attempts INTEGER NOT NULL CHECK(max_delivery_attempts >= 1),
    backoff_min_seconds INTEGER NOT NULL CHECK(backoff_min_seconds >= 0),
    backoff_max_seconds INTEGER NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CHECK(backoff_max_seconds >= backoff_min_seconds)
);

CREATE INDEX IF NOT EXISTS idx_subscriptions_topic ON subscriptions(topic_id);

-- =============================================================================
-- 3. Messages (references subscriptions)
-- =============================================================================
CREATE TABLE IF NOT EXISTS messages (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    subscription_id TEXT NOT NULL REFERENCES subscriptions(id) ON DELETE CASCADE,
    payload JSONB NOT NULL,
    status TEXT NOT NULL DEFAULT 'available'
        CHECK(status IN ('available', 'delivered', 'acked', 'dlq')),
    delivery_attempts INTEGER NOT NULL DEFAULT 0 CHECK(delivery_attempts >= 0),
    available_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    locked_by TEXT,
    locked_at TIMESTAMPTZ,
    acked_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Consume: next-batch selection
CREATE INDEX IF NOT EXISTS idx_messages_consume
    ON messages(subscription_id, status, available_at);
-- Acked sweeper: retention scan
CREATE INDEX IF NOT EXISTS idx_messages_acked
    ON messages(subscription_id, status, acked_at);
-- Stuck sweeper: expired leases only
CREATE INDEX IF NOT EXISTS idx_messages_stuck
    ON messages(status, locked_at)
    WHERE status = 'delivered';

-- =============================================================================
-- 4. Auth clients
-- =============================================================================
CREATE TABLE IF NOT EXISTS clients (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name TEXT NOT NULL CHECK(length(name) >= 1 AND length(name) <= 128),
    scopes TEXT NOT NULL DEFAULT '',
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    token_version INTEGER NOT NULL DEFAULT 1,
    secret_hash TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;
