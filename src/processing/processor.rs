//! Applies an ordered batch of events to the registered handlers.

use std::sync::Arc;

use tracing::{debug, warn};

use super::registry::HandlerRegistry;
use crate::model::ResolvedEvent;
use crate::outcome::{FailureReason, StoreResult};

/// Applies batches to a [`HandlerRegistry`].
///
/// # Ordering contract
///
/// The processor does not trust the order it is handed. Before any handler
/// runs, positions must be strictly ascending; otherwise the batch is
/// rejected as `FailureReason::ContractViolation` and nothing is applied.
///
/// # Failure
///
/// The first handler error aborts the batch. Handlers that already ran keep
/// whatever they did, which is why they must tolerate redelivery: the batch
/// will be delivered again from its first event.
pub struct BatchProcessor {
    registry: Arc<HandlerRegistry>,
}

impl BatchProcessor {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub async fn process(&self, events: &[ResolvedEvent]) -> StoreResult {
        if let Err(reason) = check_ascending(events) {
            warn!(%reason, "Rejecting batch");
            return StoreResult::Failure(reason);
        }

        for event in events {
            let mut handlers = self.registry.dispatch_targets(&event.event_type).peekable();
            if handlers.peek().is_none() {
                debug!(event_type = %event.event_type, position = %event.position, "No handlers, skipping");
                continue;
            }

            for handler in handlers {
                if let Err(e) = handler.handle(event).await {
                    warn!(
                        event_type = %event.event_type,
                        position = %event.position,
                        stream = %event.stream_id,
                        error = %e,
                        "Handler failed, aborting batch"
                    );
                    return StoreResult::Failure(FailureReason::Handler {
                        event_type: event.event_type.clone(),
                        position: event.position,
                        message: e.message,
                    });
                }
            }
        }

        StoreResult::Success
    }
}

fn check_ascending(events: &[ResolvedEvent]) -> Result<(), FailureReason> {
    for pair in events.windows(2) {
        if pair[1].position <= pair[0].position {
            return Err(FailureReason::ContractViolation(format!(
                "position {} follows {}",
                pair[1].position, pair[0].position
            )));
        }
    }
    Ok(())
}
