//! One batch iteration: apply, then advance the checkpoint.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info_span, warn, Instrument};

use super::processor::BatchProcessor;
use crate::model::{BatchProcessingOptions, Checkpoint, ResolvedEvent};
use crate::outcome::{FailureReason, StoreResult};
use crate::storage::{self, CheckpointStore};

/// What the runner drives each iteration.
///
/// Implemented by [`BatchCheckpointer`] and by the pooled transactional
/// checkpointer, so the runner does not care whether projection writes are
/// co-committed with the checkpoint.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    fn subscription_id(&self) -> &str;

    /// Current checkpoint for this subscription.
    async fn load(&self) -> storage::Result<Checkpoint>;

    /// Apply `events` and advance from `last_checkpoint` to the last event.
    async fn process(
        &self,
        events: &[ResolvedEvent],
        last_checkpoint: &Checkpoint,
        options: &BatchProcessingOptions,
    ) -> StoreResult;
}

/// Non-transactional checkpointer.
///
/// Handlers run first; only when every handler succeeded is the checkpoint
/// moved, using the checkpoint the batch was read from as the optimistic
/// expectation. A `Conflict` result means another writer got there first and
/// the batch must be discarded, not retried.
///
/// A batch whose first event is not past `last_checkpoint` is rejected as
/// `ContractViolation` before any handler runs, so a stored checkpoint never
/// moves backwards.
pub struct BatchCheckpointer<S> {
    subscription_id: String,
    processor: Arc<BatchProcessor>,
    store: S,
}

impl<S: CheckpointStore> BatchCheckpointer<S> {
    pub fn new(subscription_id: impl Into<String>, processor: Arc<BatchProcessor>, store: S) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            processor,
            store,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S: CheckpointStore> Checkpointer for BatchCheckpointer<S> {
    fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    async fn load(&self) -> storage::Result<Checkpoint> {
        self.store.load(&self.subscription_id).await
    }

    async fn process(
        &self,
        events: &[ResolvedEvent],
        last_checkpoint: &Checkpoint,
        options: &BatchProcessingOptions,
    ) -> StoreResult {
        let Some(last) = events.last() else {
            return StoreResult::Success;
        };
        let new_position = last.position;

        if let Err(reason) = check_follows(events, last_checkpoint) {
            warn!(subscription = %self.subscription_id, %reason, "Rejecting batch");
            return StoreResult::Failure(reason);
        }

        let span = info_span!(
            "checkpointer.process",
            subscription = %self.subscription_id,
            scope = %options.scope,
            events = events.len(),
            to = %new_position,
        );

        async move {
            let applied = self.processor.process(events).await;
            if !applied.is_success() {
                return applied;
            }

            let stored = self
                .store
                .store(&self.subscription_id, new_position, last_checkpoint.position)
                .await;
            if stored.is_success() {
                debug!("Checkpoint advanced");
            }
            stored
        }
        .instrument(span)
        .await
    }
}

fn check_follows(events: &[ResolvedEvent], last_checkpoint: &Checkpoint) -> Result<(), FailureReason> {
    match (events.first(), last_checkpoint.position) {
        (Some(first), Some(last)) if first.position <= last => Err(FailureReason::ContractViolation(
            format!("batch starts at {} but checkpoint is at {}", first.position, last),
        )),
        _ => Ok(()),
    }
}
