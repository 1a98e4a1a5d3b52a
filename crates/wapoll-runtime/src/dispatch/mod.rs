//! Inbound event dispatch.
//!
//! Handlers register per [`EventKind`] before connect. One
//! [`EventDispatcher`] task per session drains the backend stream and runs the
//! matching handlers in registration order.

mod dispatcher;
mod logging;

pub use dispatcher::EventDispatcher;
pub use logging::LoggingHandler;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use wapoll_core::events::{EventKind, InboundEvent};
use wapoll_core::ids::{IdentityId, SessionId};

/// Error type handlers may return. Logged, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Session the event arrived on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchContext {
    /// Live session.
    pub session_id: SessionId,
    /// Identity the session is bound to.
    pub identity_id: IdentityId,
}

/// Reacts to inbound events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handler name for logs.
    fn name(&self) -> &str;

    /// Handle one event.
    async fn handle(&self, event: &InboundEvent, ctx: &DispatchContext) -> Result<(), HandlerError>;
}

/// Handlers keyed by event kind.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for `kind`. Handlers of one kind run in registration order.
    pub fn register(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> &mut Self {
        self.handlers.entry(kind).or_default().push(handler);
        self
    }

    /// Handlers registered for `kind`.
    pub fn handlers_for(&self, kind: EventKind) -> &[Arc<dyn EventHandler>] {
        self.handlers.get(&kind).map_or(&[], Vec::as_slice)
    }

    /// Total registrations.
    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl EventHandler for Named {
        fn name(&self) -> &str {
            self.0
        }
        async fn handle(&self, _: &InboundEvent, _: &DispatchContext) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn register_keeps_order_per_kind() {
        let mut reg = HandlerRegistry::new();
        let _ = reg
            .register(EventKind::Message, Arc::new(Named("a")))
            .register(EventKind::Message, Arc::new(Named("b")))
            .register(EventKind::Connected, Arc::new(Named("c")));

        let names: Vec<&str> = reg
            .handlers_for(EventKind::Message)
            .iter()
            .map(|h| h.name())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(reg.len(), 3);
        assert!(reg.handlers_for(EventKind::LoggedOut).is_empty());
    }

    #[test]
    fn empty_registry() {
        assert!(HandlerRegistry::new().is_empty());
    }
}
