//! Batch outcome shared by the processor, the checkpointers and the runner.
//!
//! Every way a batch can end is a value of [`StoreResult`], so the runner
//! branches on one type instead of matching error kinds.

use std::fmt;

use crate::model::Position;

/// Outcome of applying a batch and (possibly) advancing its checkpoint.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreResult {
    /// Batch applied and checkpoint advanced (or nothing to do).
    Success,
    /// Batch rejected; the checkpoint did not move.
    Failure(FailureReason),
}

impl StoreResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            Self::Success => None,
            Self::Failure(reason) => Some(reason),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Failure(FailureReason::Transient(message.into()))
    }

    pub fn conflict(expected: Option<Position>, actual: Option<Position>) -> Self {
        Self::Failure(FailureReason::Conflict { expected, actual })
    }
}

/// Why a batch did not commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Event store or relational store unavailable, timed out, or a commit
    /// failed.
    Transient(String),
    /// The stored checkpoint no longer matched the expected previous
    /// position. Another writer advanced the subscription.
    Conflict {
        expected: Option<Position>,
        actual: Option<Position>,
    },
    /// A handler rejected an event.
    Handler {
        event_type: String,
        position: Position,
        message: String,
    },
    /// The batch was not strictly position-ascending.
    ContractViolation(String),
}

impl FailureReason {
    /// Whether retrying the same work after a backoff can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Handler { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Short label for structured logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transient(_) => "transient",
            Self::Conflict { .. } => "conflict",
            Self::Handler { .. } => "handler",
            Self::ContractViolation(_) => "contract_violation",
        }
    }
}

fn fmt_position(position: &Option<Position>) -> String {
    position
        .map(|p| p.to_string())
        .unwrap_or_else(|| "none".to_string())
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(message) => write!(f, "transient store error: {message}"),
            Self::Conflict { expected, actual } => write!(
                f,
                "checkpoint conflict: expected {}, found {}",
                fmt_position(expected),
                fmt_position(actual)
            ),
            Self::Handler {
                event_type,
                position,
                message,
            } => write!(
                f,
                "handler failed on {event_type} at position {position}: {message}"
            ),
            Self::ContractViolation(message) => write!(f, "invalid batch: {message}"),
        }
    }
}
