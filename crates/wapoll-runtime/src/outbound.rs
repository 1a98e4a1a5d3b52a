//! Outbound message composition for a live session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use metrics::counter;
use tracing::{debug, info, instrument, warn};
use wapoll_core::jid::Jid;
use wapoll_core::poll::PollRequest;
use wapoll_core::presence::PresenceState;

use crate::backend::{BackendClient, SendReceipt};
use crate::errors::RuntimeError;

/// Builds and sends messages over one session's client.
///
/// Cloned into the dispatcher so the connect-time presence update goes
/// through the same path as every other send.
#[derive(Clone)]
pub struct OutboundComposer {
    client: Arc<dyn BackendClient>,
    open: Arc<AtomicBool>,
}

impl OutboundComposer {
    /// Composer over `client`. The composer starts open.
    pub fn new(client: Arc<dyn BackendClient>) -> Self {
        Self {
            client,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Refuse further sends. Called when the owning session disconnects.
    pub(crate) fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Whether sends can go out right now.
    pub fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst) && self.client.is_connected()
    }

    /// Advertise presence. Failures are logged, never returned.
    pub async fn send_presence(&self, state: PresenceState) {
        if !self.is_connected() {
            debug!(%state, "presence skipped, not connected");
            return;
        }
        match self.client.send_presence(state).await {
            Ok(()) => {
                counter!("outbound_sends_total", "kind" => "presence").increment(1);
                debug!(%state, "presence sent");
            }
            Err(e) => warn!(%state, error = %e, "failed to send presence"),
        }
    }

    /// Send `poll` to `to`, exactly once.
    #[instrument(skip(self, poll), fields(to = %to, options = poll.options().len()))]
    pub async fn send_poll(&self, to: &Jid, poll: &PollRequest) -> Result<SendReceipt, RuntimeError> {
        if !self.is_connected() {
            return Err(RuntimeError::NotConnected);
        }
        let message = self.client.build_poll_creation(poll);
        let receipt = self.client.send_message(to, message).await?;
        counter!("outbound_sends_total", "kind" => "poll").increment(1);
        info!(message_id = %receipt.message_id, "poll sent");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::loopback::LoopbackBackend;
    use crate::backend::{MessagingBackend, OutboundMessage};
    use crate::errors::BackendError;
    use assert_matches::assert_matches;
    use wapoll_store::{ConnectionConfig, DeviceIdentity, IdentityStore};

    fn poll() -> PollRequest {
        PollRequest::new("Q", vec!["x".into(), "y".into(), "z".into()], 1).unwrap()
    }

    fn client(backend: &LoopbackBackend) -> Arc<dyn BackendClient> {
        let store = Arc::new(IdentityStore::open(":memory:", &ConnectionConfig::default()).unwrap());
        let identity = DeviceIdentity::blank().with_credential(Jid::new("1", "s.whatsapp.net"), None);
        backend.client(identity, store)
    }

    #[tokio::test]
    async fn send_poll_when_connected_sends_once() {
        let backend = LoopbackBackend::new();
        let client = client(&backend);
        client.connect().await.unwrap();
        let composer = OutboundComposer::new(client);

        let to = Jid::group("120363028452547709");
        let receipt = composer.send_poll(&to, &poll()).await.unwrap();
        assert_eq!(receipt.recipient, to);

        let sent = backend.sent();
        assert_eq!(sent.len(), 1);
        assert_matches!(
            &sent[0].1,
            OutboundMessage::PollCreation { name, options, selectable_count: 1 }
                if name == "Q" && options.len() == 3
        );
    }

    #[tokio::test]
    async fn send_poll_when_not_connected_sends_nothing() {
        let backend = LoopbackBackend::new();
        let composer = OutboundComposer::new(client(&backend));
        let res = composer.send_poll(&Jid::group("1"), &poll()).await;
        assert_matches!(res, Err(RuntimeError::NotConnected));
        assert!(backend.sent().is_empty());
    }

    #[tokio::test]
    async fn closed_composer_refuses_sends() {
        let backend = LoopbackBackend::new();
        let client = client(&backend);
        client.connect().await.unwrap();
        let composer = OutboundComposer::new(client);
        composer.close();
        assert_matches!(
            composer.send_poll(&Jid::group("1"), &poll()).await,
            Err(RuntimeError::NotConnected)
        );
        composer.send_presence(PresenceState::Available).await;
        assert!(backend.sent().is_empty());
        assert!(backend.presences().is_empty());
    }

    #[tokio::test]
    async fn presence_skipped_when_not_connected() {
        let backend = LoopbackBackend::new();
        let composer = OutboundComposer::new(client(&backend));
        composer.send_presence(PresenceState::Available).await;
        assert!(backend.presences().is_empty());
    }

    #[tokio::test]
    async fn presence_backend_failure_is_swallowed() {
        let backend =
            LoopbackBackend::new().fail_presences(vec![BackendError::Permanent("rejected".into())]);
        let client = client(&backend);
        client.connect().await.unwrap();
        let composer = OutboundComposer::new(client);

        composer.send_presence(PresenceState::Available).await;
        assert!(backend.presences().is_empty());
        assert!(composer.is_connected());

        // The session keeps working after the failed update.
        composer.send_presence(PresenceState::Available).await;
        assert_eq!(backend.presences(), vec![PresenceState::Available]);
        assert!(composer.send_poll(&Jid::group("1"), &poll()).await.is_ok());
    }
}
