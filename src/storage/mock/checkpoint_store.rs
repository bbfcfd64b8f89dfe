//! Mock CheckpointStore implementation for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::{Checkpoint, Position};
use crate::outcome::StoreResult;
use crate::storage::checkpoint_store::check_forward;
use crate::storage::{CheckpointStore, Result, StorageError};

/// Mock checkpoint store that keeps checkpoints in memory.
#[derive(Default)]
pub struct MockCheckpointStore {
    checkpoints: RwLock<HashMap<String, Checkpoint>>,
    fail_on_load: RwLock<bool>,
    fail_on_store: RwLock<bool>,
    store_calls: RwLock<usize>,
}

impl MockCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_load(&self, fail: bool) {
        *self.fail_on_load.write().await = fail;
    }

    pub async fn set_fail_on_store(&self, fail: bool) {
        *self.fail_on_store.write().await = fail;
    }

    /// Seed a checkpoint directly, bypassing the optimistic check.
    pub async fn seed(&self, subscription_id: &str, position: Position) {
        self.checkpoints.write().await.insert(
            subscription_id.to_string(),
            Checkpoint::at(subscription_id, position),
        );
    }

    /// Number of `store` calls received, successful or not.
    pub async fn store_calls(&self) -> usize {
        *self.store_calls.read().await
    }
}

#[async_trait]
impl CheckpointStore for MockCheckpointStore {
    async fn load(&self, subscription_id: &str) -> Result<Checkpoint> {
        if *self.fail_on_load.read().await {
            return Err(StorageError::Unavailable(
                "mock checkpoint load failure".to_string(),
            ));
        }
        Ok(self
            .checkpoints
            .read()
            .await
            .get(subscription_id)
            .cloned()
            .unwrap_or_else(|| Checkpoint::initial(subscription_id)))
    }

    async fn store(
        &self,
        subscription_id: &str,
        position: Position,
        expected_previous: Option<Position>,
    ) -> StoreResult {
        *self.store_calls.write().await += 1;
        if let Some(rejected) = check_forward(position, expected_previous) {
            return rejected;
        }
        if *self.fail_on_store.read().await {
            return StoreResult::transient("mock checkpoint store failure");
        }

        let mut checkpoints = self.checkpoints.write().await;
        let actual = checkpoints.get(subscription_id).and_then(|c| c.position);
        if actual != expected_previous {
            return StoreResult::conflict(expected_previous, actual);
        }
        checkpoints.insert(
            subscription_id.to_string(),
            Checkpoint::at(subscription_id, position),
        );
        StoreResult::Success
    }

    async fn reset(&self, subscription_id: &str) -> Result<()> {
        self.checkpoints.write().await.remove(subscription_id);
        Ok(())
    }
}
