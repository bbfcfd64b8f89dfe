//! Waymark - checkpointed event-stream subscriptions
//!
//! Reads ordered batches from an append-only event store, applies them to
//! registered handlers, and advances a durable per-subscription checkpoint
//! with an optimistic write. Relational projections can co-commit with the
//! checkpoint in one database transaction.

pub mod config;
pub mod model;
pub mod monitor;
pub mod outcome;
pub mod processing;
pub mod projectors;
pub mod runner;
pub mod storage;
pub mod utils;

pub use model::{BatchProcessingOptions, Checkpoint, Position, ResolvedEvent, StreamScope};
pub use outcome::{FailureReason, StoreResult};
pub use runner::{RunnerError, RunnerHandle, RunnerState, SubscriptionRunner};
