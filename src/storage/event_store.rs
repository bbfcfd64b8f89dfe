//! EventStore trait definition.

use std::fmt;

use async_trait::async_trait;

use super::Result;
use crate::model::{NewEvent, Position, ResolvedEvent, StreamScope};

/// Concurrency token checked by the store at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedRevision {
    /// Write regardless of the stream's current revision.
    Any,
    /// The stream (or its metadata) must not exist yet.
    NoStream,
    /// The stream's last revision must be exactly this value.
    Exact(u64),
}

impl fmt::Display for ExpectedRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::NoStream => f.write_str("no stream"),
            Self::Exact(revision) => write!(f, "{revision}"),
        }
    }
}

/// Metadata document attached to a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMetadata {
    /// Bumped on every metadata write; the token for [`ExpectedRevision`].
    pub revision: u64,
    pub data: serde_json::Value,
}

/// Result of a successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendResult {
    /// Revision of the last event written to the stream.
    pub next_expected_revision: u64,
    /// Global position of the last event written.
    pub position: Position,
}

/// Interface to the append-only event store.
///
/// The engine only reads events; `append` exists so hosts and tests can
/// feed a store. Metadata writes carry their own revision, independent of
/// the stream's event revision, and back the native checkpoint store.
///
/// Implementations:
/// - `SqliteEventStore`: SQLite storage
/// - `MockEventStore`: In-memory mock for testing
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append events to a stream, enforcing the expected revision.
    async fn append(
        &self,
        stream_id: &str,
        expected: ExpectedRevision,
        events: Vec<NewEvent>,
    ) -> Result<AppendResult>;

    /// Read up to `max_count` events strictly after `from_exclusive`,
    /// ascending. `None` reads from the start of the scope.
    async fn read_forward(
        &self,
        scope: &StreamScope,
        from_exclusive: Option<Position>,
        max_count: usize,
    ) -> Result<Vec<ResolvedEvent>>;

    /// Read up to `max_count` events at or before `from_inclusive`,
    /// descending. `None` starts at the tail.
    async fn read_backward(
        &self,
        scope: &StreamScope,
        from_inclusive: Option<Position>,
        max_count: usize,
    ) -> Result<Vec<ResolvedEvent>>;

    /// Current metadata for a stream, if any has been written.
    async fn get_stream_metadata(&self, stream_id: &str) -> Result<Option<StreamMetadata>>;

    /// Replace a stream's metadata. Returns the new metadata revision.
    async fn set_stream_metadata(
        &self,
        stream_id: &str,
        expected: ExpectedRevision,
        data: serde_json::Value,
    ) -> Result<u64>;

    /// Remove a stream's metadata. Missing metadata is not an error.
    async fn delete_stream_metadata(&self, stream_id: &str) -> Result<()>;
}

/// Check a metadata or stream revision against the caller's expectation.
pub(crate) fn revision_matches(expected: ExpectedRevision, current: Option<u64>) -> bool {
    match (expected, current) {
        (ExpectedRevision::Any, _) => true,
        (ExpectedRevision::NoStream, None) => true,
        (ExpectedRevision::Exact(want), Some(have)) => want == have,
        _ => false,
    }
}
