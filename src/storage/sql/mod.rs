//! Relational checkpoint storage shared by the SQLite and PostgreSQL backends.
//!
//! Each backend is a marker type implementing [`RelationalBackend`]. The
//! operations take a bare connection so the same code runs against a pooled
//! connection or inside an open transaction.

mod backend;
mod checkpoint_store;

use async_trait::async_trait;

pub use checkpoint_store::SqlCheckpointStore;

#[cfg(feature = "postgres")]
pub use backend::PostgresBackend;
#[cfg(feature = "sqlite")]
pub use backend::SqliteBackend;

use super::Result;
use crate::model::{Checkpoint, Position};
use crate::outcome::StoreResult;
use crate::processing::PendingWrite;

/// Connection type of a backend's database.
pub type Connection<B> = <<B as RelationalBackend>::Db as sqlx::Database>::Connection;

/// Trait for relational backends.
///
/// Abstracts over the SQL dialect and connection type. Every operation works
/// on whatever connection it is handed; the caller decides whether that
/// connection is inside a transaction.
#[async_trait]
pub trait RelationalBackend: Send + Sync + 'static {
    type Db: sqlx::Database;

    /// Short name for logs.
    fn name() -> &'static str;

    /// Create the checkpoint tables if missing.
    async fn create_schema(conn: &mut Connection<Self>) -> Result<()>;

    async fn load_checkpoint(conn: &mut Connection<Self>, subscription_id: &str)
        -> Result<Checkpoint>;

    /// Conditional checkpoint write. Zero affected rows means the persisted
    /// position no longer matches `expected_previous`.
    async fn store_checkpoint(
        conn: &mut Connection<Self>,
        subscription_id: &str,
        position: Position,
        expected_previous: Option<Position>,
    ) -> StoreResult;

    async fn reset_checkpoint(conn: &mut Connection<Self>, subscription_id: &str) -> Result<()>;

    /// Run queued projection statements in order.
    async fn execute(conn: &mut Connection<Self>, writes: &[PendingWrite]) -> Result<()>;
}
