//! Atomic checkpoint + projection commits for relational projections.
//!
//! The checkpoint advances if and only if the projection writes queued by the
//! batch's handlers are durably committed. Both go through one transaction:
//!
//! 1. the inner [`BatchCheckpointer`] runs with a checkpoint store bound to
//!    the transaction,
//! 2. on success the [`UnitOfWork`] is flushed into the same transaction,
//! 3. the transaction commits.
//!
//! Any failure rolls back and clears the unit of work, so a retried batch
//! starts from a clean slate.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Pool, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::checkpointer::{BatchCheckpointer, Checkpointer};
use super::processor::BatchProcessor;
use super::unit_of_work::UnitOfWork;
use crate::model::{BatchProcessingOptions, Checkpoint, Position, ResolvedEvent};
use crate::outcome::StoreResult;
use crate::storage::sql::Connection;
use crate::storage::{self, CheckpointStore, RelationalBackend};

/// Checkpoint store bound to one open connection, usually a transaction.
///
/// Lives only for the duration of a batch.
pub struct TransactionCheckpointStore<'t, B: RelationalBackend> {
    conn: Mutex<&'t mut Connection<B>>,
    _marker: PhantomData<B>,
}

impl<'t, B: RelationalBackend> TransactionCheckpointStore<'t, B> {
    pub fn new(conn: &'t mut Connection<B>) -> Self {
        Self {
            conn: Mutex::new(conn),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<B: RelationalBackend> CheckpointStore for TransactionCheckpointStore<'_, B> {
    async fn load(&self, subscription_id: &str) -> storage::Result<Checkpoint> {
        let mut conn = self.conn.lock().await;
        B::load_checkpoint(&mut **conn, subscription_id).await
    }

    async fn store(
        &self,
        subscription_id: &str,
        position: Position,
        expected_previous: Option<Position>,
    ) -> StoreResult {
        let mut conn = self.conn.lock().await;
        B::store_checkpoint(&mut **conn, subscription_id, position, expected_previous).await
    }

    async fn reset(&self, subscription_id: &str) -> storage::Result<()> {
        let mut conn = self.conn.lock().await;
        B::reset_checkpoint(&mut **conn, subscription_id).await
    }
}

/// Runs one batch inside a caller-supplied transaction.
pub struct TransactionalBatchCheckpointer<B: RelationalBackend> {
    subscription_id: String,
    processor: Arc<BatchProcessor>,
    unit_of_work: Arc<UnitOfWork>,
    _marker: PhantomData<B>,
}

impl<B: RelationalBackend> TransactionalBatchCheckpointer<B> {
    pub fn new(
        subscription_id: impl Into<String>,
        processor: Arc<BatchProcessor>,
        unit_of_work: Arc<UnitOfWork>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            processor,
            unit_of_work,
            _marker: PhantomData,
        }
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn unit_of_work(&self) -> &Arc<UnitOfWork> {
        &self.unit_of_work
    }

    /// Process `events` inside `tx`, consuming it.
    ///
    /// The transaction is always finished here: committed on success, rolled
    /// back otherwise. A commit failure is reported as transient.
    pub async fn process(
        &self,
        mut tx: Transaction<'static, B::Db>,
        events: &[ResolvedEvent],
        last_checkpoint: &Checkpoint,
        options: &BatchProcessingOptions,
    ) -> StoreResult {
        if events.is_empty() {
            self.rollback(tx).await;
            return StoreResult::Success;
        }

        // Anything queued outside a batch must not leak into this one.
        self.unit_of_work.clear();

        let result = {
            let inner = BatchCheckpointer::new(
                self.subscription_id.clone(),
                self.processor.clone(),
                TransactionCheckpointStore::<B>::new(&mut *tx),
            );
            inner.process(events, last_checkpoint, options).await
        };

        if !result.is_success() {
            self.unit_of_work.clear();
            self.rollback(tx).await;
            return result;
        }

        let writes = self.unit_of_work.take();
        if let Err(e) = B::execute(&mut *tx, &writes).await {
            warn!(subscription = %self.subscription_id, error = %e, "Projection flush failed, rolling back");
            self.rollback(tx).await;
            return StoreResult::transient(e.to_string());
        }

        match tx.commit().await {
            Ok(()) => {
                debug!(
                    subscription = %self.subscription_id,
                    backend = B::name(),
                    writes = writes.len(),
                    "Batch committed"
                );
                StoreResult::Success
            }
            Err(e) => {
                warn!(subscription = %self.subscription_id, error = %e, "Commit failed");
                StoreResult::transient(format!("commit failed: {e}"))
            }
        }
    }

    async fn rollback(&self, tx: Transaction<'static, B::Db>) {
        if let Err(e) = tx.rollback().await {
            warn!(subscription = %self.subscription_id, error = %e, "Rollback failed");
        }
    }
}

/// Transactional checkpointer that opens its own transaction per batch.
///
/// Empty batches never touch the pool.
pub struct PooledTransactionalCheckpointer<B: RelationalBackend> {
    pool: Pool<B::Db>,
    inner: TransactionalBatchCheckpointer<B>,
}

impl<B: RelationalBackend> PooledTransactionalCheckpointer<B> {
    pub fn new(pool: Pool<B::Db>, inner: TransactionalBatchCheckpointer<B>) -> Self {
        Self { pool, inner }
    }

    pub fn pool(&self) -> &Pool<B::Db> {
        &self.pool
    }
}

#[async_trait]
impl<B: RelationalBackend> Checkpointer for PooledTransactionalCheckpointer<B> {
    fn subscription_id(&self) -> &str {
        self.inner.subscription_id()
    }

    async fn load(&self) -> storage::Result<Checkpoint> {
        let mut conn = self.pool.acquire().await?;
        B::load_checkpoint(&mut *conn, self.inner.subscription_id()).await
    }

    async fn process(
        &self,
        events: &[ResolvedEvent],
        last_checkpoint: &Checkpoint,
        options: &BatchProcessingOptions,
    ) -> StoreResult {
        if events.is_empty() {
            return StoreResult::Success;
        }

        let tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => return StoreResult::transient(format!("begin failed: {e}")),
        };
        self.inner.process(tx, events, last_checkpoint, options).await
    }
}
