//! Gap and liveness reporting.
//!
//! A subscription is "live" when it trails the tail of its scope by fewer
//! than `threshold` events. Everything here is read-only and can run next to
//! a live runner.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use crate::model::{Position, StreamScope};
use crate::storage::{CheckpointStore, EventStore, Result};

/// Default number of trailing events still considered live.
pub const DEFAULT_LIVENESS_THRESHOLD: u64 = 10;

/// Number of events between the last processed position and the tail.
///
/// - empty scope: 0
/// - never processed, tail `t`: `t + 1` (every event is unread)
/// - otherwise `tail - last`, never negative
pub fn gap(last: Option<Position>, tail: Option<Position>) -> u64 {
    match (last, tail) {
        (_, None) => 0,
        (None, Some(tail)) => tail.0.saturating_add(1),
        (Some(last), Some(tail)) => tail.0.saturating_sub(last.0),
    }
}

/// `gap < threshold`, with the gap supplied by the caller.
pub async fn is_live<F, Fut>(get_gap: F, threshold: u64) -> Result<bool>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<u64>>,
{
    Ok(get_gap().await? < threshold)
}

/// Point-in-time liveness snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LivenessReport {
    pub subscription_id: String,
    pub last_position: Option<Position>,
    pub tail_position: Option<Position>,
    pub gap: u64,
    pub threshold: u64,
    pub live: bool,
}

/// Gap monitor bound to one subscription.
pub struct GapMonitor {
    events: Arc<dyn EventStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    subscription_id: String,
    scope: StreamScope,
    threshold: u64,
}

impl GapMonitor {
    pub fn new(
        events: Arc<dyn EventStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        subscription_id: impl Into<String>,
        scope: StreamScope,
    ) -> Self {
        Self {
            events,
            checkpoints,
            subscription_id: subscription_id.into(),
            scope,
            threshold: DEFAULT_LIVENESS_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Position of the newest event in scope.
    pub async fn tail(&self) -> Result<Option<Position>> {
        let newest = self.events.read_backward(&self.scope, None, 1).await?;
        Ok(newest.first().map(|e| e.position))
    }

    pub async fn get_gap(&self) -> Result<u64> {
        Ok(self.report().await?.gap)
    }

    pub async fn is_live(&self) -> Result<bool> {
        is_live(|| self.get_gap(), self.threshold).await
    }

    pub async fn report(&self) -> Result<LivenessReport> {
        let checkpoint = self.checkpoints.load(&self.subscription_id).await?;
        let tail = self.tail().await?;
        let gap = gap(checkpoint.position, tail);

        Ok(LivenessReport {
            subscription_id: self.subscription_id.clone(),
            last_position: checkpoint.position,
            tail_position: tail,
            gap,
            threshold: self.threshold,
            live: gap < self.threshold,
        })
    }
}
