//! CheckpointStore trait definition.

use async_trait::async_trait;

use super::Result;
use crate::model::{Checkpoint, Position};
use crate::outcome::{FailureReason, StoreResult};

/// Durable "last processed position" per subscription.
///
/// # Optimistic writes
///
/// `store` only succeeds when the persisted position still equals
/// `expected_previous`. Two runners holding the same stale checkpoint can
/// both finish a batch, but exactly one of them advances the checkpoint; the
/// other receives `FailureReason::Conflict` and must reload.
///
/// Infrastructure errors during `store` are folded into
/// `FailureReason::Transient` rather than returned as `Err`, so the caller
/// has a single outcome to branch on.
///
/// # Implementations
///
/// - `EventStoreCheckpointStore`: stream metadata inside the event store
/// - `SqliteCheckpointStore`: SQLite row
/// - `PostgresCheckpointStore`: PostgreSQL row
/// - `MockCheckpointStore`: In-memory mock for testing
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint for a subscription.
    ///
    /// A subscription with no stored checkpoint yields
    /// `Checkpoint { position: None, .. }`, never an error.
    async fn load(&self, subscription_id: &str) -> Result<Checkpoint>;

    /// Advance the checkpoint from `expected_previous` to `position`.
    async fn store(
        &self,
        subscription_id: &str,
        position: Position,
        expected_previous: Option<Position>,
    ) -> StoreResult;

    /// Forget the checkpoint so the subscription replays from the start.
    async fn reset(&self, subscription_id: &str) -> Result<()>;
}

/// Reject a write that would move a checkpoint behind `expected_previous`.
pub(crate) fn check_forward(position: Position, expected_previous: Option<Position>) -> Option<StoreResult> {
    match expected_previous {
        Some(previous) if position < previous => Some(StoreResult::Failure(
            FailureReason::ContractViolation(format!(
                "checkpoint cannot move back from {previous} to {position}"
            )),
        )),
        _ => None,
    }
}

#[async_trait]
impl<S: CheckpointStore + ?Sized> CheckpointStore for std::sync::Arc<S> {
    async fn load(&self, subscription_id: &str) -> Result<Checkpoint> {
        (**self).load(subscription_id).await
    }

    async fn store(
        &self,
        subscription_id: &str,
        position: Position,
        expected_previous: Option<Position>,
    ) -> StoreResult {
        (**self)
            .store(subscription_id, position, expected_previous)
            .await
    }

    async fn reset(&self, subscription_id: &str) -> Result<()> {
        (**self).reset(subscription_id).await
    }
}
