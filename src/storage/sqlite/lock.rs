//! SQLite SubscriptionLock implementation.
//!
//! SQLite has no advisory locks, so ownership is a row in
//! `subscription_locks`. The row outlives a crashed holder; operators clear
//! it with [`SqliteSubscriptionLock::force_release`].

use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use crate::storage::schema::SubscriptionLocks;
use crate::storage::sql::{RelationalBackend, SqliteBackend};
use crate::storage::{lock_id_for, LockGuard, Result, SubscriptionLock};

/// Row-based subscription lock.
pub struct SqliteSubscriptionLock {
    pool: SqlitePool,
}

impl SqliteSubscriptionLock {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the lock table if missing. Shares the checkpoint schema.
    pub async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        SqliteBackend::create_schema(&mut *conn).await
    }

    /// Drop a lock regardless of owner.
    pub async fn force_release(&self, subscription_id: &str) -> Result<bool> {
        let query = Query::delete()
            .from_table(SubscriptionLocks::Table)
            .and_where(Expr::col(SubscriptionLocks::SubscriptionId).eq(subscription_id))
            .to_string(SqliteQueryBuilder);

        let done = sqlx::query(&query).execute(&self.pool).await?;
        if done.rows_affected() > 0 {
            warn!(subscription = %subscription_id, "Subscription lock forcibly released");
        }
        Ok(done.rows_affected() > 0)
    }
}

#[async_trait]
impl SubscriptionLock for SqliteSubscriptionLock {
    async fn try_acquire(&self, subscription_id: &str) -> Result<Option<LockGuard>> {
        let lock_id = lock_id_for(subscription_id);
        let owner = Uuid::new_v4().to_string();

        let query = Query::insert()
            .into_table(SubscriptionLocks::Table)
            .columns([
                SubscriptionLocks::SubscriptionId,
                SubscriptionLocks::LockId,
                SubscriptionLocks::Owner,
                SubscriptionLocks::AcquiredAt,
            ])
            .values_panic([
                subscription_id.into(),
                lock_id.into(),
                owner.clone().into(),
                chrono::Utc::now().to_rfc3339().into(),
            ])
            .on_conflict(
                OnConflict::column(SubscriptionLocks::SubscriptionId)
                    .do_nothing()
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        let done = sqlx::query(&query).execute(&self.pool).await?;
        if done.rows_affected() == 0 {
            return Ok(None);
        }

        Ok(Some(LockGuard {
            subscription_id: subscription_id.to_string(),
            lock_id,
            owner,
        }))
    }

    async fn release(&self, guard: LockGuard) -> Result<()> {
        let query = Query::delete()
            .from_table(SubscriptionLocks::Table)
            .and_where(Expr::col(SubscriptionLocks::SubscriptionId).eq(guard.subscription_id.as_str()))
            .and_where(Expr::col(SubscriptionLocks::Owner).eq(guard.owner.as_str()))
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }
}
