//! PostgreSQL implementations of storage interfaces.
//!
//! Only the checkpoint side lives here; the engine reads events from
//! whichever [`EventStore`](crate::storage::EventStore) the host provides.

mod lock;

pub use lock::PostgresAdvisoryLock;

pub use super::sql::PostgresBackend;

/// PostgreSQL checkpoint store.
pub type PostgresCheckpointStore = super::sql::SqlCheckpointStore<PostgresBackend>;
