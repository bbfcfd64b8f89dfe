//! Static handler registration.
//!
//! Handlers are registered per event type once at startup and the resulting
//! [`HandlerRegistry`] is shared by reference. Dispatch is a map lookup on
//! the event type tag.
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = HandlerRegistry::builder()
//!     .on("OrderPlaced", OrderSummaryProjection::new(unit_of_work.clone()))
//!     .on_fn("OrderCancelled", |event| {
//!         tracing::info!(position = %event.position, "cancelled");
//!         Ok(())
//!     })
//!     .build();
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::model::ResolvedEvent;

/// Error raised by a handler. Aborts the whole batch.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("payload decode failed: {err}"))
    }
}

/// Handler for one or more event types.
///
/// Handlers must tolerate redelivery: an event from a batch that was applied
/// but not checkpointed is delivered again after a crash. Upserts or pure
/// functions of state satisfy this.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &ResolvedEvent) -> Result<(), HandlerError>;
}

/// Adapter turning a plain closure into an [`EventHandler`].
pub struct FnHandler<F>(F);

impl<F> FnHandler<F>
where
    F: Fn(&ResolvedEvent) -> Result<(), HandlerError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&ResolvedEvent) -> Result<(), HandlerError> + Send + Sync,
{
    async fn handle(&self, event: &ResolvedEvent) -> Result<(), HandlerError> {
        (self.0)(event)
    }
}

/// Event type → handlers, in registration order.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    catch_all: Vec<Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// Handlers registered for an event type. Empty for unknown types.
    pub fn handlers_for(&self, event_type: &str) -> &[Arc<dyn EventHandler>] {
        self.handlers
            .get(event_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Everything an event of this type is dispatched to: type-specific
    /// handlers first, then catch-all handlers.
    pub fn dispatch_targets<'a>(
        &'a self,
        event_type: &str,
    ) -> impl Iterator<Item = &'a Arc<dyn EventHandler>> + 'a {
        self.handlers_for(event_type)
            .iter()
            .chain(self.catch_all.iter())
    }

    /// Registered event types, sorted.
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty() && self.catch_all.is_empty()
    }
}

/// Builder for [`HandlerRegistry`]. The registry is immutable once built.
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    catch_all: Vec<Arc<dyn EventHandler>>,
}

impl HandlerRegistryBuilder {
    /// Register a handler for an event type.
    pub fn on(self, event_type: impl Into<String>, handler: impl EventHandler + 'static) -> Self {
        self.on_shared(event_type, Arc::new(handler))
    }

    /// Register a handler that is also registered elsewhere.
    pub fn on_shared(mut self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers
            .entry(event_type.into())
            .or_default()
            .push(handler);
        self
    }

    /// Register a closure.
    pub fn on_fn<F>(self, event_type: impl Into<String>, f: F) -> Self
    where
        F: Fn(&ResolvedEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.on(event_type, FnHandler::new(f))
    }

    /// Register a handler that receives every event, whatever its type.
    pub fn on_any(mut self, handler: impl EventHandler + 'static) -> Self {
        self.catch_all.push(Arc::new(handler));
        self
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
            catch_all: self.catch_all,
        }
    }
}
