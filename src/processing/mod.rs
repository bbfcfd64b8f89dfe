//! Batch application and checkpoint advancement.
//!
//! - [`HandlerRegistry`]: event type to handlers, fixed at startup
//! - [`BatchProcessor`]: applies an ordered batch, aborts on first failure
//! - [`BatchCheckpointer`]: processor + optimistic checkpoint write
//! - [`PooledTransactionalCheckpointer`]: same, co-committed with projection
//!   writes queued on a [`UnitOfWork`]

mod checkpointer;
mod processor;
mod registry;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
mod transactional;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
mod unit_of_work;

pub use checkpointer::{BatchCheckpointer, Checkpointer};
pub use processor::BatchProcessor;
pub use registry::{EventHandler, FnHandler, HandlerError, HandlerRegistry, HandlerRegistryBuilder};

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub use transactional::{
    PooledTransactionalCheckpointer, TransactionCheckpointStore, TransactionalBatchCheckpointer,
};
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub use unit_of_work::{PendingWrite, UnitOfWork};

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;

    use crate::model::{Position, ResolvedEvent};

    /// Event at `position` on its own stream.
    pub fn event(position: u64, event_type: &str) -> ResolvedEvent {
        ResolvedEvent {
            position: Position(position),
            stream_id: format!("order-{position}"),
            revision: 0,
            event_type: event_type.to_string(),
            data: Vec::new(),
            metadata: Vec::new(),
            created_at: Utc::now(),
        }
    }
}
