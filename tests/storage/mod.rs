//! Shared storage integration tests.
//!
//! Tests the EventStore, CheckpointStore and SubscriptionLock interfaces
//! against all implementations. Each implementation module imports these
//! test functions and runs them.

pub mod checkpoint_store_tests;
pub mod event_store_tests;
pub mod lock_tests;
