//! Logging projection for debugging and smoke runs.

use async_trait::async_trait;
use tracing::info;

use crate::model::ResolvedEvent;
use crate::processing::{EventHandler, HandlerError};

/// Projection that logs every event it receives and never fails.
pub struct LoggingProjection {
    name: String,
}

impl LoggingProjection {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl EventHandler for LoggingProjection {
    async fn handle(&self, event: &ResolvedEvent) -> Result<(), HandlerError> {
        info!(
            projection = %self.name,
            stream = %event.stream_id,
            position = %event.position,
            revision = event.revision,
            event_type = %event.event_type,
            bytes = event.data.len(),
            "Event received"
        );
        Ok(())
    }
}
