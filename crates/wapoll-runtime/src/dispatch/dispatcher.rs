//! Per-session dispatch loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span, warn};
use wapoll_core::events::{EventKind, InboundEvent};
use wapoll_core::presence::PresenceState;

use super::{DispatchContext, HandlerRegistry};
use crate::outbound::OutboundComposer;

/// Routes one session's inbound events to its handlers.
pub struct EventDispatcher {
    registry: Arc<HandlerRegistry>,
    outbound: OutboundComposer,
    ctx: DispatchContext,
}

impl EventDispatcher {
    /// Dispatcher for the session described by `ctx`.
    pub fn new(registry: Arc<HandlerRegistry>, outbound: OutboundComposer, ctx: DispatchContext) -> Self {
        Self {
            registry,
            outbound,
            ctx,
        }
    }

    /// Run [`run`](Self::run) on a new task.
    pub fn spawn(
        self,
        events: mpsc::UnboundedReceiver<InboundEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let span = info_span!("dispatch", session_id = %self.ctx.session_id);
        tokio::spawn(self.run(events, cancel).instrument(span))
    }

    /// Drain `events` until the stream ends or `cancel` fires.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<InboundEvent>, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.dispatch(&event, &cancel).await;
        }
        debug!("dispatcher stopped");
    }

    async fn dispatch(&self, event: &InboundEvent, cancel: &CancellationToken) {
        counter!("inbound_events_total", "type" => event.event_type()).increment(1);

        match event {
            InboundEvent::Other { name } => {
                debug!(name, "dropping unrecognized event");
                return;
            }
            InboundEvent::Connected => {
                self.outbound.send_presence(PresenceState::Available).await;
            }
            InboundEvent::LoggedOut { reason } => {
                warn!(reason, "device was unlinked remotely");
            }
            InboundEvent::Message(_) | InboundEvent::Disconnected => {}
        }

        self.run_handlers(event.kind(), event, cancel).await;
    }

    async fn run_handlers(&self, kind: EventKind, event: &InboundEvent, cancel: &CancellationToken) {
        for handler in self.registry.handlers_for(kind) {
            if cancel.is_cancelled() {
                return;
            }
            let outcome = AssertUnwindSafe(handler.handle(event, &self.ctx))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    counter!("handler_errors_total", "handler" => handler.name().to_string())
                        .increment(1);
                    warn!(handler = handler.name(), event = event.event_type(), error = %e, "event handler failed");
                }
                Err(panic) => {
                    counter!("handler_errors_total", "handler" => handler.name().to_string())
                        .increment(1);
                    error!(
                        handler = handler.name(),
                        event = event.event_type(),
                        panic = panic_message(panic.as_ref()),
                        "event handler panicked"
                    );
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}
