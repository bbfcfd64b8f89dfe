//! Startup helpers and retry policy.

pub mod bootstrap;
pub mod retry;
