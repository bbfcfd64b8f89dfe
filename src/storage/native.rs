//! Checkpoint store backed by the event store's own stream metadata.
//!
//! Each subscription owns the metadata of `$checkpoint-<subscription_id>`.
//! The metadata revision doubles as the concurrency token, so a runner that
//! read a stale checkpoint cannot overwrite a newer one even if the
//! positions happen to match.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::checkpoint_store::check_forward;
use super::{CheckpointStore, EventStore, ExpectedRevision, Result, StorageError};
use crate::model::{Checkpoint, Position};
use crate::outcome::StoreResult;

/// Prefix of the well-known checkpoint streams.
pub const CHECKPOINT_STREAM_PREFIX: &str = "$checkpoint-";

/// Metadata document persisted per subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointDocument {
    position: Option<Position>,
    checkpointed_at: DateTime<Utc>,
}

/// Stream holding a subscription's checkpoint.
pub fn checkpoint_stream(subscription_id: &str) -> String {
    format!("{CHECKPOINT_STREAM_PREFIX}{subscription_id}")
}

/// Checkpoint store persisting into event store stream metadata.
pub struct EventStoreCheckpointStore {
    store: Arc<dyn EventStore>,
}

impl EventStoreCheckpointStore {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    async fn read(&self, subscription_id: &str) -> Result<Option<(u64, CheckpointDocument)>> {
        let stream = checkpoint_stream(subscription_id);
        match self.store.get_stream_metadata(&stream).await? {
            Some(metadata) => {
                let document: CheckpointDocument = serde_json::from_value(metadata.data)?;
                Ok(Some((metadata.revision, document)))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CheckpointStore for EventStoreCheckpointStore {
    async fn load(&self, subscription_id: &str) -> Result<Checkpoint> {
        Ok(match self.read(subscription_id).await? {
            Some((_, document)) => Checkpoint {
                subscription_id: subscription_id.to_string(),
                position: document.position,
                checkpointed_at: document.checkpointed_at,
            },
            None => Checkpoint::initial(subscription_id),
        })
    }

    async fn store(
        &self,
        subscription_id: &str,
        position: Position,
        expected_previous: Option<Position>,
    ) -> StoreResult {
        if let Some(rejected) = check_forward(position, expected_previous) {
            return rejected;
        }
        let current = match self.read(subscription_id).await {
            Ok(current) => current,
            Err(e) => return StoreResult::transient(e.to_string()),
        };

        let (expected_revision, actual) = match &current {
            Some((revision, document)) => (ExpectedRevision::Exact(*revision), document.position),
            None => (ExpectedRevision::NoStream, None),
        };
        if actual != expected_previous {
            return StoreResult::conflict(expected_previous, actual);
        }

        let document = CheckpointDocument {
            position: Some(position),
            checkpointed_at: Utc::now(),
        };
        let data = match serde_json::to_value(&document) {
            Ok(data) => data,
            Err(e) => return StoreResult::transient(e.to_string()),
        };

        let stream = checkpoint_stream(subscription_id);
        match self
            .store
            .set_stream_metadata(&stream, expected_revision, data)
            .await
        {
            Ok(revision) => {
                debug!(subscription = %subscription_id, %position, revision, "Checkpoint stored");
                StoreResult::Success
            }
            Err(StorageError::WrongExpectedRevision { .. }) => {
                // Lost the race between our read and write; report what won.
                let actual = match self.read(subscription_id).await {
                    Ok(current) => current.and_then(|(_, document)| document.position),
                    Err(e) => {
                        warn!(subscription = %subscription_id, error = %e, "Failed to re-read checkpoint after conflict");
                        None
                    }
                };
                StoreResult::conflict(expected_previous, actual)
            }
            Err(e) => StoreResult::transient(e.to_string()),
        }
    }

    async fn reset(&self, subscription_id: &str) -> Result<()> {
        self.store
            .delete_stream_metadata(&checkpoint_stream(subscription_id))
            .await
    }
}
