//! Mock SubscriptionLock implementation for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::storage::{lock_id_for, LockGuard, Result, SubscriptionLock};

/// In-process lock table. Shared between runners through an `Arc`.
#[derive(Default)]
pub struct MockSubscriptionLock {
    held: Mutex<HashMap<String, String>>,
}

impl MockSubscriptionLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_held(&self, subscription_id: &str) -> bool {
        self.held.lock().await.contains_key(subscription_id)
    }
}

#[async_trait]
impl SubscriptionLock for MockSubscriptionLock {
    async fn try_acquire(&self, subscription_id: &str) -> Result<Option<LockGuard>> {
        let mut held = self.held.lock().await;
        if held.contains_key(subscription_id) {
            return Ok(None);
        }
        let owner = Uuid::new_v4().to_string();
        held.insert(subscription_id.to_string(), owner.clone());
        Ok(Some(LockGuard {
            subscription_id: subscription_id.to_string(),
            lock_id: lock_id_for(subscription_id),
            owner,
        }))
    }

    async fn release(&self, guard: LockGuard) -> Result<()> {
        let mut held = self.held.lock().await;
        if held.get(&guard.subscription_id) == Some(&guard.owner) {
            held.remove(&guard.subscription_id);
        }
        Ok(())
    }
}
