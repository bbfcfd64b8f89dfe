//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Events table schema.
#[derive(Iden, Clone, Copy)]
pub enum Events {
    Table,
    #[iden = "global_position"]
    GlobalPosition,
    #[iden = "stream_id"]
    StreamId,
    #[iden = "revision"]
    Revision,
    #[iden = "event_type"]
    EventType,
    #[iden = "data"]
    Data,
    #[iden = "metadata"]
    Metadata,
    #[iden = "created_at"]
    CreatedAt,
}

/// Stream metadata table schema.
#[derive(Iden, Clone, Copy)]
pub enum StreamMetadata {
    Table,
    #[iden = "stream_id"]
    StreamId,
    #[iden = "revision"]
    Revision,
    #[iden = "data"]
    Data,
}

/// Checkpoints table schema.
#[derive(Iden, Clone, Copy)]
pub enum SubscriptionCheckpoints {
    Table,
    #[iden = "subscription_id"]
    SubscriptionId,
    #[iden = "position"]
    Position,
    #[iden = "checkpointed_at"]
    CheckpointedAt,
}

/// Subscription locks table schema (SQLite only; PostgreSQL uses advisory
/// locks).
#[derive(Iden, Clone, Copy)]
pub enum SubscriptionLocks {
    Table,
    #[iden = "subscription_id"]
    SubscriptionId,
    #[iden = "lock_id"]
    LockId,
    #[iden = "owner"]
    Owner,
    #[iden = "acquired_at"]
    AcquiredAt,
}

/// SQL for creating the events and stream metadata tables (SQLite).
pub const SQLITE_CREATE_EVENT_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    global_position INTEGER NOT NULL PRIMARY KEY,
    stream_id TEXT NOT NULL,
    revision INTEGER NOT NULL,
    event_type TEXT NOT NULL,
    data BLOB NOT NULL,
    metadata BLOB NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (stream_id, revision)
);

CREATE TABLE IF NOT EXISTS stream_metadata (
    stream_id TEXT NOT NULL PRIMARY KEY,
    revision INTEGER NOT NULL,
    data TEXT NOT NULL
);
"#;

/// SQL for creating the checkpoint and lock tables (SQLite).
pub const SQLITE_CREATE_CHECKPOINT_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS subscription_checkpoints (
    subscription_id TEXT NOT NULL PRIMARY KEY,
    position INTEGER,
    checkpointed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subscription_locks (
    subscription_id TEXT NOT NULL PRIMARY KEY,
    lock_id INTEGER NOT NULL,
    owner TEXT NOT NULL,
    acquired_at TEXT NOT NULL
);
"#;

/// SQL for creating the checkpoint table (PostgreSQL).
pub const POSTGRES_CREATE_CHECKPOINT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS subscription_checkpoints (
    subscription_id TEXT NOT NULL PRIMARY KEY,
    position BIGINT,
    checkpointed_at TEXT NOT NULL
)
"#;
