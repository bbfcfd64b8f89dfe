//! PostgreSQL SubscriptionLock using session-level advisory locks.
//!
//! `pg_try_advisory_lock` belongs to the session that took it, so each held
//! lock pins one pooled connection until released. If the process dies, the
//! server drops the session and with it the lock.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres, Row};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::{lock_id_for, LockGuard, Result, SubscriptionLock};

/// Advisory-lock based subscription lock.
pub struct PostgresAdvisoryLock {
    pool: PgPool,
    sessions: Mutex<HashMap<String, PoolConnection<Postgres>>>,
}

impl PostgresAdvisoryLock {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Number of locks currently held through this instance.
    pub async fn held(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

impl Drop for PostgresAdvisoryLock {
    fn drop(&mut self) {
        // Detached connections close with their session, so the server drops
        // the advisory locks instead of the pool recycling them.
        for (owner, conn) in self.sessions.get_mut().drain() {
            warn!(owner = %owner, "Advisory lock dropped while held, closing session");
            drop(conn.detach());
        }
    }
}

#[async_trait]
impl SubscriptionLock for PostgresAdvisoryLock {
    async fn try_acquire(&self, subscription_id: &str) -> Result<Option<LockGuard>> {
        let lock_id = lock_id_for(subscription_id);
        let mut conn = self.pool.acquire().await?;

        let row = sqlx::query("SELECT pg_try_advisory_lock($1) AS acquired")
            .bind(lock_id)
            .fetch_one(&mut *conn)
            .await?;
        let acquired: bool = row.try_get("acquired")?;
        if !acquired {
            debug!(subscription = %subscription_id, lock_id, "Advisory lock held elsewhere");
            return Ok(None);
        }

        let owner = Uuid::new_v4().to_string();
        self.sessions.lock().await.insert(owner.clone(), conn);

        Ok(Some(LockGuard {
            subscription_id: subscription_id.to_string(),
            lock_id,
            owner,
        }))
    }

    async fn release(&self, guard: LockGuard) -> Result<()> {
        let Some(mut conn) = self.sessions.lock().await.remove(&guard.owner) else {
            return Ok(());
        };

        let unlocked = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(guard.lock_id)
            .execute(&mut *conn)
            .await;

        if let Err(e) = unlocked {
            // Never hand a session that may still hold the lock back to the pool.
            warn!(subscription = %guard.subscription_id, error = %e, "Advisory unlock failed, closing session");
            let _ = conn.close().await;
            return Err(e.into());
        }
        Ok(())
    }
}
