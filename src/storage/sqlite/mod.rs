//! SQLite implementations of storage interfaces.

mod event_store;
mod lock;

pub use event_store::SqliteEventStore;
pub use lock::SqliteSubscriptionLock;

pub use super::sql::SqliteBackend;

/// SQLite checkpoint store.
pub type SqliteCheckpointStore = super::sql::SqlCheckpointStore<SqliteBackend>;
