//! Handler that writes session events to the log.

use async_trait::async_trait;
use tracing::info;
use wapoll_core::events::{EventKind, InboundEvent};

use super::{DispatchContext, EventHandler, HandlerError, HandlerRegistry};

/// Logs connects and received messages. Used by `listen`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingHandler;

impl LoggingHandler {
    /// Event kinds this handler is meant for.
    pub const KINDS: [EventKind; 4] = [
        EventKind::Connected,
        EventKind::Message,
        EventKind::Disconnected,
        EventKind::LoggedOut,
    ];

    /// Register this handler for every kind in [`Self::KINDS`].
    pub fn install(registry: &mut HandlerRegistry) {
        let handler = std::sync::Arc::new(Self);
        for kind in Self::KINDS {
            let _ = registry.register(kind, handler.clone());
        }
    }
}

#[async_trait]
impl EventHandler for LoggingHandler {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(&self, event: &InboundEvent, ctx: &DispatchContext) -> Result<(), HandlerError> {
        match event {
            InboundEvent::Connected => {
                info!(identity_id = %ctx.identity_id, "connected, presence set to available");
            }
            InboundEvent::Message(msg) => {
                info!(
                    chat = %msg.chat,
                    sender = %msg.sender,
                    push_name = %msg.push_name,
                    timestamp = %msg.timestamp.to_rfc3339(),
                    "message received"
                );
            }
            InboundEvent::Disconnected => info!("connection dropped"),
            InboundEvent::LoggedOut { reason } => info!(reason, "logged out remotely"),
            InboundEvent::Other { .. } => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wapoll_core::ids::{IdentityId, SessionId};

    #[test]
    fn install_registers_every_kind() {
        let mut reg = HandlerRegistry::new();
        LoggingHandler::install(&mut reg);
        assert_eq!(reg.len(), LoggingHandler::KINDS.len());
        assert!(reg.handlers_for(EventKind::Other).is_empty());
    }

    #[tokio::test]
    async fn handling_never_fails() {
        let ctx = DispatchContext {
            session_id: SessionId::new(),
            identity_id: IdentityId::new(),
        };
        for event in [
            InboundEvent::Connected,
            InboundEvent::Disconnected,
            InboundEvent::LoggedOut { reason: "unlinked".into() },
        ] {
            assert!(LoggingHandler.handle(&event, &ctx).await.is_ok());
        }
    }
}
