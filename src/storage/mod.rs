//! Storage interfaces and implementations.
//!
//! Three seams live here: the event store the engine reads from, the
//! checkpoint store it advances, and the subscription lock it holds.

pub mod checkpoint_store;
pub mod event_store;
pub mod lock;
pub mod mock;
pub mod native;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod schema;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sql;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use checkpoint_store::CheckpointStore;
pub use event_store::{AppendResult, EventStore, ExpectedRevision, StreamMetadata};
pub use lock::{lock_id_for, LockGuard, SubscriptionLock};
pub use mock::{MockCheckpointStore, MockEventStore, MockSubscriptionLock};
pub use native::EventStoreCheckpointStore;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub use sql::{RelationalBackend, SqlCheckpointStore};

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteBackend, SqliteCheckpointStore, SqliteEventStore, SqliteSubscriptionLock};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresAdvisoryLock, PostgresBackend, PostgresCheckpointStore};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Wrong expected revision on {stream_id}: expected {expected}, actual {actual:?}")]
    WrongExpectedRevision {
        stream_id: String,
        expected: ExpectedRevision,
        actual: Option<u64>,
    },

    #[error("Invalid position value: {0}")]
    InvalidPosition(i64),

    #[error("Position out of storable range: {0}")]
    PositionOutOfRange(u64),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Convert a stored signed integer back into a position.
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub(crate) fn position_from_db(value: i64) -> Result<crate::model::Position> {
    u64::try_from(value)
        .map(crate::model::Position)
        .map_err(|_| StorageError::InvalidPosition(value))
}

/// Convert a position into the signed integer column type.
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub(crate) fn position_to_db(position: crate::model::Position) -> Result<i64> {
    i64::try_from(position.0).map_err(|_| StorageError::PositionOutOfRange(position.0))
}

/// Parse a stored RFC 3339 timestamp.
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub(crate) fn timestamp_from_db(value: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|_| StorageError::InvalidTimestamp(value.to_string()))
}
