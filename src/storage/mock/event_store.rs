//! Mock EventStore implementation for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::model::{NewEvent, Position, ResolvedEvent, StreamScope};
use crate::storage::event_store::revision_matches;
use crate::storage::{
    AppendResult, EventStore, ExpectedRevision, Result, StorageError, StreamMetadata,
};

/// In-memory event log. Global positions are indexes into `log`.
#[derive(Default)]
struct Inner {
    log: Vec<ResolvedEvent>,
    metadata: HashMap<String, StreamMetadata>,
}

impl Inner {
    fn stream_revision(&self, stream_id: &str) -> Option<u64> {
        self.log
            .iter()
            .rev()
            .find(|e| e.stream_id == stream_id)
            .map(|e| e.revision)
    }

    /// Events of a scope with `position` rewritten to the scope's numbering.
    fn scoped(&self, scope: &StreamScope) -> Vec<ResolvedEvent> {
        match scope {
            StreamScope::All => self.log.clone(),
            StreamScope::Stream(id) => self
                .log
                .iter()
                .filter(|e| &e.stream_id == id)
                .map(|e| ResolvedEvent {
                    position: Position(e.revision),
                    ..e.clone()
                })
                .collect(),
        }
    }
}

/// Mock event store that keeps events in memory.
#[derive(Default)]
pub struct MockEventStore {
    inner: RwLock<Inner>,
    fail_on_read: RwLock<bool>,
    fail_on_metadata: RwLock<bool>,
}

impl MockEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read return a transient error.
    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    /// Make every metadata access return a transient error.
    pub async fn set_fail_on_metadata(&self, fail: bool) {
        *self.fail_on_metadata.write().await = fail;
    }

    /// Number of events across all streams.
    pub async fn len(&self) -> usize {
        self.inner.read().await.log.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn check_read(&self) -> Result<()> {
        if *self.fail_on_read.read().await {
            return Err(StorageError::Unavailable("mock read failure".to_string()));
        }
        Ok(())
    }

    async fn check_metadata(&self) -> Result<()> {
        if *self.fail_on_metadata.read().await {
            return Err(StorageError::Unavailable(
                "mock metadata failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for MockEventStore {
    async fn append(
        &self,
        stream_id: &str,
        expected: ExpectedRevision,
        events: Vec<NewEvent>,
    ) -> Result<AppendResult> {
        let mut inner = self.inner.write().await;
        let current = inner.stream_revision(stream_id);
        if !revision_matches(expected, current) {
            return Err(StorageError::WrongExpectedRevision {
                stream_id: stream_id.to_string(),
                expected,
                actual: current,
            });
        }

        let mut revision = current.map(|r| r + 1).unwrap_or(0);
        for event in events {
            let position = Position(inner.log.len() as u64);
            inner.log.push(ResolvedEvent {
                position,
                stream_id: stream_id.to_string(),
                revision,
                event_type: event.event_type,
                data: event.data,
                metadata: event.metadata,
                created_at: Utc::now(),
            });
            revision += 1;
        }

        let last_revision = inner.stream_revision(stream_id).unwrap_or(0);
        let last_position = Position(inner.log.len().saturating_sub(1) as u64);
        Ok(AppendResult {
            next_expected_revision: last_revision,
            position: last_position,
        })
    }

    async fn read_forward(
        &self,
        scope: &StreamScope,
        from_exclusive: Option<Position>,
        max_count: usize,
    ) -> Result<Vec<ResolvedEvent>> {
        self.check_read().await?;
        let inner = self.inner.read().await;
        Ok(inner
            .scoped(scope)
            .into_iter()
            .filter(|e| from_exclusive.map_or(true, |from| e.position > from))
            .take(max_count)
            .collect())
    }

    async fn read_backward(
        &self,
        scope: &StreamScope,
        from_inclusive: Option<Position>,
        max_count: usize,
    ) -> Result<Vec<ResolvedEvent>> {
        self.check_read().await?;
        let inner = self.inner.read().await;
        Ok(inner
            .scoped(scope)
            .into_iter()
            .rev()
            .filter(|e| from_inclusive.map_or(true, |from| e.position <= from))
            .take(max_count)
            .collect())
    }

    async fn get_stream_metadata(&self, stream_id: &str) -> Result<Option<StreamMetadata>> {
        self.check_metadata().await?;
        Ok(self.inner.read().await.metadata.get(stream_id).cloned())
    }

    async fn set_stream_metadata(
        &self,
        stream_id: &str,
        expected: ExpectedRevision,
        data: serde_json::Value,
    ) -> Result<u64> {
        self.check_metadata().await?;
        let mut inner = self.inner.write().await;
        let current = inner.metadata.get(stream_id).map(|m| m.revision);
        if !revision_matches(expected, current) {
            return Err(StorageError::WrongExpectedRevision {
                stream_id: stream_id.to_string(),
                expected,
                actual: current,
            });
        }
        let revision = current.map(|r| r + 1).unwrap_or(0);
        inner
            .metadata
            .insert(stream_id.to_string(), StreamMetadata { revision, data });
        Ok(revision)
    }

    async fn delete_stream_metadata(&self, stream_id: &str) -> Result<()> {
        self.check_metadata().await?;
        self.inner.write().await.metadata.remove(stream_id);
        Ok(())
    }
}
