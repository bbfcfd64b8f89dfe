//! Value types shared by every layer of the engine.
//!
//! Positions are only meaningful within a [`StreamScope`]: a subscription
//! over `$all` compares global positions, a subscription over a single
//! stream compares stream revisions. The scope lives on the subscription,
//! not on each position.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name used for the all-stream scope in configuration.
pub const ALL_STREAM: &str = "$all";

/// Position within a scope. Zero-based: the first event of a scope is at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(pub u64);

impl Position {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// Next position in the same scope.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Position {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// What a subscription reads: every event in the store, or one stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum StreamScope {
    All,
    Stream(String),
}

impl StreamScope {
    pub fn stream(id: impl Into<String>) -> Self {
        Self::Stream(id.into())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

impl Default for StreamScope {
    fn default() -> Self {
        Self::All
    }
}

impl fmt::Display for StreamScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str(ALL_STREAM),
            Self::Stream(id) => f.write_str(id),
        }
    }
}

impl From<String> for StreamScope {
    fn from(value: String) -> Self {
        if value == ALL_STREAM {
            Self::All
        } else {
            Self::Stream(value)
        }
    }
}

impl From<StreamScope> for String {
    fn from(scope: StreamScope) -> Self {
        scope.to_string()
    }
}

/// Durable "last processed" marker for a subscription.
///
/// `position == None` means the subscription has never committed a batch and
/// must replay from the beginning of its scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub subscription_id: String,
    pub position: Option<Position>,
    pub checkpointed_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Checkpoint for a subscription that has not processed anything yet.
    pub fn initial(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            position: None,
            checkpointed_at: Utc::now(),
        }
    }

    pub fn at(subscription_id: impl Into<String>, position: Position) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            position: Some(position),
            checkpointed_at: Utc::now(),
        }
    }

    pub fn is_initial(&self) -> bool {
        self.position.is_none()
    }
}

/// Event as read back from the store. Never mutated after it is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEvent {
    /// Position in the scope it was read from.
    pub position: Position,
    pub stream_id: String,
    /// Index of the event within its own stream.
    pub revision: u64,
    pub event_type: String,
    pub data: Vec<u8>,
    pub metadata: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Append input for the event stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub event_type: String,
    pub data: Vec<u8>,
    pub metadata: Vec<u8>,
}

impl NewEvent {
    pub fn new(event_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            event_type: event_type.into(),
            data: data.into(),
            metadata: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: impl Into<Vec<u8>>) -> Self {
        self.metadata = metadata.into();
        self
    }
}

/// Per-subscription batch settings, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProcessingOptions {
    /// Maximum number of events handed to the processor at once. Never zero.
    pub batch_size: u32,
    pub scope: StreamScope,
}

impl BatchProcessingOptions {
    pub const DEFAULT_BATCH_SIZE: u32 = 50;

    pub fn new(batch_size: u32, scope: StreamScope) -> Self {
        Self {
            batch_size: batch_size.max(1),
            scope,
        }
    }
}

impl Default for BatchProcessingOptions {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BATCH_SIZE, StreamScope::All)
    }
}
