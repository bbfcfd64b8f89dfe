//! Collector projection for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::{Position, ResolvedEvent};
use crate::processing::{EventHandler, HandlerError};

/// Projection that keeps every event it receives for later inspection.
///
/// Redelivered events are collected again, so tests can observe replays.
#[derive(Default)]
pub struct CollectorProjection {
    collected: Arc<RwLock<Vec<ResolvedEvent>>>,
}

impl CollectorProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the collected events. Stays valid after the projection is
    /// moved into a registry.
    pub fn collected(&self) -> Arc<RwLock<Vec<ResolvedEvent>>> {
        Arc::clone(&self.collected)
    }

    pub async fn count(&self) -> usize {
        self.collected.read().await.len()
    }

    /// Positions in delivery order.
    pub async fn positions(&self) -> Vec<Position> {
        self.collected
            .read()
            .await
            .iter()
            .map(|e| e.position)
            .collect()
    }

    /// Take all collected events, leaving the collector empty.
    pub async fn take(&self) -> Vec<ResolvedEvent> {
        std::mem::take(&mut *self.collected.write().await)
    }
}

#[async_trait]
impl EventHandler for CollectorProjection {
    async fn handle(&self, event: &ResolvedEvent) -> Result<(), HandlerError> {
        self.collected.write().await.push(event.clone());
        Ok(())
    }
}
