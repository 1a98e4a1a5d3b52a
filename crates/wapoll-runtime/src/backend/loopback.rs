//! In-process loopback backend.
//!
//! Scripted stand-in for the chat network. Pairing issues a code and completes
//! the handshake immediately; connects emit `Connected` followed by any
//! scripted inbound events; sends are recorded instead of transmitted. Tests
//! drive it through the builder methods and inspect what it recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use wapoll_core::events::{InboundEvent, PairingEvent};
use wapoll_core::jid::{DEFAULT_USER_SERVER, Jid};
use wapoll_core::presence::PresenceState;
use wapoll_store::{DeviceIdentity, IdentityStore};

use super::{BackendClient, MessagingBackend, OutboundMessage, SendReceipt};
use crate::errors::BackendError;

const PAIRING_CHANNEL_CAPACITY: usize = 32;
const DEFAULT_CODE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Default)]
struct Script {
    /// `None` means one random code.
    pairing_events: Option<Vec<PairingEvent>>,
    /// Account bound when a code is issued. `None` leaves the identity blank.
    pair_as: Option<(Jid, Option<String>)>,
    connect_failures: VecDeque<BackendError>,
    presence_failures: VecDeque<BackendError>,
    /// Simulated handshake latency, slept at the start of every connect.
    connect_delay: Option<Duration>,
    inbound: Vec<InboundEvent>,
}

#[derive(Default)]
struct Activity {
    connect_calls: usize,
    disconnect_calls: usize,
    presences: Vec<PresenceState>,
    sent: Vec<(Jid, OutboundMessage)>,
}

#[derive(Default)]
struct LoopbackState {
    script: Mutex<Script>,
    activity: Mutex<Activity>,
    /// Subscribers of connected clients, keyed by client serial.
    live: Mutex<HashMap<u64, Vec<mpsc::UnboundedSender<InboundEvent>>>>,
    max_live: AtomicUsize,
    next_serial: AtomicU64,
}

/// Scripted in-process backend.
#[derive(Clone)]
pub struct LoopbackBackend {
    state: Arc<LoopbackState>,
}

impl Default for LoopbackBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackBackend {
    /// Backend whose pairing issues one random code and binds a random account.
    pub fn new() -> Self {
        let backend = Self {
            state: Arc::new(LoopbackState::default()),
        };
        let user = 40_700_000_000_u64 + rand::random::<u64>() % 1_000_000;
        backend.state.script.lock().pair_as = Some((
            Jid::new(user.to_string(), DEFAULT_USER_SERVER),
            Some("loopback".to_string()),
        ));
        backend
    }

    /// Replace the pairing events emitted after connect.
    #[must_use]
    pub fn with_pairing_events(self, events: Vec<PairingEvent>) -> Self {
        self.state.script.lock().pairing_events = Some(events);
        self
    }

    /// Account bound to the identity once a pairing code is issued.
    #[must_use]
    pub fn pairing_as(self, jid: Jid, push_name: Option<String>) -> Self {
        self.state.script.lock().pair_as = Some((jid, push_name));
        self
    }

    /// Issue codes without ever completing the handshake.
    #[must_use]
    pub fn without_pairing_completion(self) -> Self {
        self.state.script.lock().pair_as = None;
        self
    }

    /// Fail the next connects with these errors, in order.
    #[must_use]
    pub fn fail_connects(self, errors: Vec<BackendError>) -> Self {
        self.state.script.lock().connect_failures.extend(errors);
        self
    }

    /// Fail the next presence updates with these errors, in order.
    #[must_use]
    pub fn fail_presences(self, errors: Vec<BackendError>) -> Self {
        self.state.script.lock().presence_failures.extend(errors);
        self
    }

    /// Sleep for `delay` at the start of every connect.
    #[must_use]
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        self.state.script.lock().connect_delay = Some(delay);
        self
    }

    /// Events delivered after `Connected` on every session connect.
    #[must_use]
    pub fn with_inbound(self, events: Vec<InboundEvent>) -> Self {
        self.state.script.lock().inbound = events;
        self
    }

    /// Push an event to every connected subscriber. Returns how many received it.
    pub fn emit(&self, event: InboundEvent) -> usize {
        let live = self.state.live.lock();
        live.values()
            .flatten()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    /// Messages sent so far, oldest first.
    pub fn sent(&self) -> Vec<(Jid, OutboundMessage)> {
        self.state.activity.lock().sent.clone()
    }

    /// Presence updates sent so far.
    pub fn presences(&self) -> Vec<PresenceState> {
        self.state.activity.lock().presences.clone()
    }

    /// Number of `connect` calls, failed ones included.
    pub fn connect_calls(&self) -> usize {
        self.state.activity.lock().connect_calls
    }

    /// Number of `disconnect` calls that closed an open connection.
    pub fn disconnect_calls(&self) -> usize {
        self.state.activity.lock().disconnect_calls
    }

    /// Connections currently open.
    pub fn live_connections(&self) -> usize {
        self.state.live.lock().len()
    }

    /// Most connections ever open at once.
    pub fn max_live_connections(&self) -> usize {
        self.state.max_live.load(Ordering::SeqCst)
    }
}

impl MessagingBackend for LoopbackBackend {
    fn name(&self) -> &str {
        "loopback"
    }

    fn is_simulated(&self) -> bool {
        true
    }

    fn client(&self, identity: DeviceIdentity, store: Arc<IdentityStore>) -> Arc<dyn BackendClient> {
        Arc::new(LoopbackClient {
            serial: self.state.next_serial.fetch_add(1, Ordering::SeqCst),
            state: Arc::clone(&self.state),
            identity: Mutex::new(identity),
            store,
            connected: AtomicBool::new(false),
            pairing_tx: Mutex::new(None),
            pending: Mutex::new(Vec::new()),
        })
    }
}

struct LoopbackClient {
    serial: u64,
    state: Arc<LoopbackState>,
    identity: Mutex<DeviceIdentity>,
    store: Arc<IdentityStore>,
    connected: AtomicBool,
    pairing_tx: Mutex<Option<mpsc::Sender<PairingEvent>>>,
    /// Subscribers registered before connect.
    pending: Mutex<Vec<mpsc::UnboundedSender<InboundEvent>>>,
}

impl LoopbackClient {
    fn run_pairing(&self, tx: &mpsc::Sender<PairingEvent>) -> Result<(), BackendError> {
        let (events, pair_as) = {
            let script = self.state.script.lock();
            let events = script.pairing_events.clone().unwrap_or_else(|| {
                vec![PairingEvent::Code {
                    code: format!("2@{:016x},{:016x}", rand::random::<u64>(), rand::random::<u64>()),
                    timeout: DEFAULT_CODE_TIMEOUT,
                }]
            });
            (events, script.pair_as.clone())
        };

        let mut completed = false;
        for event in events {
            let is_code = matches!(event, PairingEvent::Code { .. });
            let _ = tx.try_send(event);
            if is_code && !completed {
                if let Some((jid, push_name)) = pair_as.clone() {
                    self.complete_handshake(jid.clone(), push_name)?;
                    let _ = tx.try_send(PairingEvent::Success { jid });
                    completed = true;
                }
            }
        }
        Ok(())
    }

    fn complete_handshake(&self, jid: Jid, push_name: Option<String>) -> Result<(), BackendError> {
        let mut identity = self.identity.lock();
        let paired = identity.clone().with_credential(jid, push_name);
        self.store
            .save_identity(&paired)
            .map_err(|e| BackendError::Permanent(format!("persisting pairing: {e}")))?;
        debug!(identity_id = %paired.id, "loopback pairing completed");
        *identity = paired;
        Ok(())
    }

    fn go_live(&self) {
        let subscribers = std::mem::take(&mut *self.pending.lock());
        let inbound = self.state.script.lock().inbound.clone();
        for tx in &subscribers {
            let _ = tx.send(InboundEvent::Connected);
            for event in &inbound {
                let _ = tx.send(event.clone());
            }
        }
        let mut live = self.state.live.lock();
        let _ = live.insert(self.serial, subscribers);
        let _ = self.state.max_live.fetch_max(live.len(), Ordering::SeqCst);
    }
}

#[async_trait]
impl BackendClient for LoopbackClient {
    fn pairing_channel(&self) -> Result<mpsc::Receiver<PairingEvent>, BackendError> {
        if self.identity.lock().has_credential() {
            return Err(BackendError::ChannelUnavailable(
                "identity already has a credential".into(),
            ));
        }
        let (tx, rx) = mpsc::channel(PAIRING_CHANNEL_CAPACITY);
        *self.pairing_tx.lock() = Some(tx);
        Ok(rx)
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<InboundEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.connected.load(Ordering::SeqCst) {
            if let Some(subs) = self.state.live.lock().get_mut(&self.serial) {
                subs.push(tx);
            }
        } else {
            self.pending.lock().push(tx);
        }
        rx
    }

    async fn connect(&self) -> Result<(), BackendError> {
        self.state.activity.lock().connect_calls += 1;
        let delay = self.state.script.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.state.script.lock().connect_failures.pop_front() {
            warn!(error = %err, "loopback connect failure injected");
            return Err(err);
        }
        if self.connected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let pairing_tx = self.pairing_tx.lock().take();
        if let Some(tx) = pairing_tx {
            // The sender drops at the end of this block, closing the channel.
            if let Err(e) = self.run_pairing(&tx) {
                self.connected.store(false, Ordering::SeqCst);
                return Err(e);
            }
        } else if !self.identity.lock().has_credential() {
            self.connected.store(false, Ordering::SeqCst);
            return Err(BackendError::Permanent("device is not paired".into()));
        }

        self.go_live();
        Ok(())
    }

    async fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.state.live.lock().remove(&self.serial);
        self.state.activity.lock().disconnect_calls += 1;
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_presence(&self, state: PresenceState) -> Result<(), BackendError> {
        if !self.is_connected() {
            return Err(BackendError::NotConnected);
        }
        if let Some(err) = self.state.script.lock().presence_failures.pop_front() {
            return Err(err);
        }
        self.state.activity.lock().presences.push(state);
        Ok(())
    }

    async fn send_message(
        &self,
        to: &Jid,
        message: OutboundMessage,
    ) -> Result<SendReceipt, BackendError> {
        if !self.is_connected() {
            return Err(BackendError::NotConnected);
        }
        self.state.activity.lock().sent.push((to.clone(), message));
        Ok(SendReceipt {
            message_id: format!("3EB0{:016X}", rand::random::<u64>()),
            recipient: to.clone(),
            sent_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wapoll_core::poll::PollRequest;
    use wapoll_store::ConnectionConfig;

    fn store() -> Arc<IdentityStore> {
        Arc::new(IdentityStore::open(":memory:", &ConnectionConfig::default()).unwrap())
    }

    fn paired() -> DeviceIdentity {
        DeviceIdentity::blank().with_credential(Jid::new("1", DEFAULT_USER_SERVER), None)
    }

    #[tokio::test]
    async fn pairing_issues_code_and_persists_identity() {
        let store = store();
        let backend = LoopbackBackend::new().with_pairing_events(vec![PairingEvent::Code {
            code: "CODE123".into(),
            timeout: Duration::from_secs(20),
        }]);
        let client = backend.client(DeviceIdentity::blank(), Arc::clone(&store));
        let mut rx = client.pairing_channel().unwrap();
        client.connect().await.unwrap();

        assert_matches!(rx.recv().await, Some(PairingEvent::Code { code, .. }) if code == "CODE123");
        assert_matches!(rx.recv().await, Some(PairingEvent::Success { .. }));
        assert!(rx.recv().await.is_none());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn reports_itself_as_simulated() {
        let backend = LoopbackBackend::new();
        assert_eq!(backend.name(), "loopback");
        assert!(backend.is_simulated());
    }

    #[tokio::test]
    async fn pairing_channel_refused_for_paired_identity() {
        let backend = LoopbackBackend::new();
        let client = backend.client(paired(), store());
        assert_matches!(
            client.pairing_channel(),
            Err(BackendError::ChannelUnavailable(_))
        );
    }

    #[tokio::test]
    async fn connect_streams_connected_then_script() {
        let backend = LoopbackBackend::new().with_inbound(vec![InboundEvent::Disconnected]);
        let client = backend.client(paired(), store());
        let mut rx = client.subscribe();
        client.connect().await.unwrap();
        assert_eq!(rx.recv().await, Some(InboundEvent::Connected));
        assert_eq!(rx.recv().await, Some(InboundEvent::Disconnected));

        client.disconnect().await;
        assert!(rx.recv().await.is_none());
        assert_eq!(backend.live_connections(), 0);
    }

    #[tokio::test]
    async fn unpaired_session_connect_is_rejected() {
        let backend = LoopbackBackend::new();
        let client = backend.client(DeviceIdentity::blank(), store());
        assert_matches!(client.connect().await, Err(BackendError::Permanent(_)));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let backend = LoopbackBackend::new().fail_connects(vec![
            BackendError::Transient("a".into()),
            BackendError::Permanent("b".into()),
        ]);
        let client = backend.client(paired(), store());
        assert_matches!(client.connect().await, Err(BackendError::Transient(_)));
        assert_matches!(client.connect().await, Err(BackendError::Permanent(_)));
        client.connect().await.unwrap();
        assert_eq!(backend.connect_calls(), 3);
    }

    #[tokio::test]
    async fn sends_require_connection_and_are_recorded() {
        let backend = LoopbackBackend::new();
        let client = backend.client(paired(), store());
        let poll = PollRequest::new("Q", vec!["a".into(), "b".into()], 1).unwrap();
        let to = Jid::group("123");

        assert_matches!(
            client.send_message(&to, client.build_poll_creation(&poll)).await,
            Err(BackendError::NotConnected)
        );
        client.connect().await.unwrap();
        let receipt = client
            .send_message(&to, client.build_poll_creation(&poll))
            .await
            .unwrap();
        assert_eq!(receipt.recipient, to);
        assert_eq!(backend.sent().len(), 1);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let backend = LoopbackBackend::new();
        let client = backend.client(paired(), store());
        client.connect().await.unwrap();
        client.disconnect().await;
        client.disconnect().await;
        assert_eq!(backend.disconnect_calls(), 1);
        assert_eq!(backend.max_live_connections(), 1);
    }

    #[tokio::test]
    async fn injected_presence_failure_is_consumed_once() {
        let backend =
            LoopbackBackend::new().fail_presences(vec![BackendError::Transient("busy".into())]);
        let client = backend.client(paired(), store());
        client.connect().await.unwrap();
        assert_matches!(
            client.send_presence(PresenceState::Available).await,
            Err(BackendError::Transient(_))
        );
        client.send_presence(PresenceState::Available).await.unwrap();
        assert_eq!(backend.presences(), vec![PresenceState::Available]);
    }

    #[tokio::test]
    async fn emit_reaches_live_subscribers_only() {
        let backend = LoopbackBackend::new();
        let client = backend.client(paired(), store());
        let _rx = client.subscribe();
        assert_eq!(backend.emit(InboundEvent::Disconnected), 0);
        client.connect().await.unwrap();
        assert_eq!(backend.emit(InboundEvent::Disconnected), 1);
    }
}
