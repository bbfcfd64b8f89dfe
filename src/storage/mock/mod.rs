//! Mock storage implementations for testing.

mod checkpoint_store;
mod event_store;
mod lock;

pub use checkpoint_store::MockCheckpointStore;
pub use event_store::MockEventStore;
pub use lock::MockSubscriptionLock;
