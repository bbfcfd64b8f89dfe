//! Pool-backed relational CheckpointStore.

use std::marker::PhantomData;

use async_trait::async_trait;
use sqlx::Pool;
use tracing::debug;

use super::RelationalBackend;
use crate::model::{Checkpoint, Position};
use crate::outcome::StoreResult;
use crate::storage::{CheckpointStore, Result};

/// Checkpoint store that takes a fresh pooled connection per call.
///
/// Use this when projection writes do not live in the same database. For
/// co-committed projections, the transactional checkpointer binds the same
/// backend operations to a transaction instead.
pub struct SqlCheckpointStore<B: RelationalBackend> {
    pool: Pool<B::Db>,
    _marker: PhantomData<B>,
}

impl<B: RelationalBackend> SqlCheckpointStore<B> {
    pub fn new(pool: Pool<B::Db>) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }

    pub fn pool(&self) -> &Pool<B::Db> {
        &self.pool
    }

    /// Create the checkpoint schema if missing.
    pub async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        B::create_schema(&mut *conn).await?;
        debug!(backend = B::name(), "Checkpoint schema ready");
        Ok(())
    }
}

#[async_trait]
impl<B: RelationalBackend> CheckpointStore for SqlCheckpointStore<B> {
    async fn load(&self, subscription_id: &str) -> Result<Checkpoint> {
        let mut conn = self.pool.acquire().await?;
        B::load_checkpoint(&mut *conn, subscription_id).await
    }

    async fn store(
        &self,
        subscription_id: &str,
        position: Position,
        expected_previous: Option<Position>,
    ) -> StoreResult {
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => return StoreResult::transient(e.to_string()),
        };
        B::store_checkpoint(&mut *conn, subscription_id, position, expected_previous).await
    }

    async fn reset(&self, subscription_id: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        B::reset_checkpoint(&mut *conn, subscription_id).await
    }
}
