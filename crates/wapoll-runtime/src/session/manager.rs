//! `SessionManager`: owns every live session in the process.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use wapoll_core::ids::IdentityId;
use wapoll_core::retry::RetryConfig;
use wapoll_store::{ActiveIdentity, DeviceIdentity, IdentityStore};

use super::locks::{IdentityGuard, IdentityLocks};
use super::{Session, SessionState};
use crate::backend::{BackendClient, MessagingBackend};
use crate::dispatch::{DispatchContext, EventDispatcher, HandlerRegistry};
use crate::errors::RuntimeError;
use crate::outbound::OutboundComposer;

/// Creates, tracks and tears down sessions.
///
/// INVARIANT: at most one live session per identity. `connect` rejects a
/// second one with [`RuntimeError::AlreadyConnected`].
pub struct SessionManager {
    store: Arc<IdentityStore>,
    backend: Arc<dyn MessagingBackend>,
    retry: RetryConfig,
    /// Live sessions keyed by identity.
    active: Mutex<HashMap<IdentityId, Session>>,
    /// Identities that held a session at some point in this process.
    history: Mutex<HashSet<IdentityId>>,
    locks: IdentityLocks,
}

impl SessionManager {
    /// Manager over `store` and `backend`, retrying transient connect
    /// failures per `retry`.
    pub fn new(
        store: Arc<IdentityStore>,
        backend: Arc<dyn MessagingBackend>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            backend,
            retry,
            active: Mutex::new(HashMap::new()),
            history: Mutex::new(HashSet::new()),
            locks: IdentityLocks::default(),
        }
    }

    /// The identity store.
    pub fn store(&self) -> &Arc<IdentityStore> {
        &self.store
    }

    /// The messaging backend.
    pub fn backend(&self) -> &Arc<dyn MessagingBackend> {
        &self.backend
    }

    /// Serialize a lifecycle operation on `id` against connect/disconnect/logout.
    pub(crate) async fn lock_identity(&self, id: &IdentityId) -> IdentityGuard<'_> {
        self.locks.lock_identity(id).await
    }

    /// Open a session for a paired identity.
    ///
    /// The identity is re-read from the store under its lock and the session
    /// runs on the persisted record; an identity removed or unpaired since the
    /// caller read it is [`RuntimeError::NotPaired`]. The inbound stream is
    /// subscribed before the connection opens, so no event is missed.
    /// Transient failures are retried with backoff; permanent ones fail
    /// immediately.
    #[instrument(skip_all, fields(identity_id = %identity.id))]
    pub async fn connect(
        &self,
        identity: &DeviceIdentity,
        handlers: Arc<HandlerRegistry>,
    ) -> Result<Session, RuntimeError> {
        let _guard = self.lock_identity(&identity.id).await;
        let identity = match self
            .store
            .find_active(&ActiveIdentity::ById(identity.id.clone()))?
        {
            Some(persisted) if persisted.has_credential() => persisted,
            _ => return Err(RuntimeError::NotPaired),
        };
        if self.active.lock().contains_key(&identity.id) {
            return Err(RuntimeError::AlreadyConnected(identity.id.to_string()));
        }

        let client = self.backend.client(identity.clone(), Arc::clone(&self.store));
        let events = client.subscribe();
        self.connect_with_retry(client.as_ref()).await?;

        let outbound = OutboundComposer::new(Arc::clone(&client));
        let cancel = CancellationToken::new();
        let session = Session::new(identity.clone(), client, outbound.clone(), cancel.clone());
        let ctx = DispatchContext {
            session_id: session.id().clone(),
            identity_id: identity.id.clone(),
        };
        session.set_dispatcher(EventDispatcher::new(handlers, outbound, ctx).spawn(events, cancel));

        {
            let mut active = self.active.lock();
            let _ = active.insert(identity.id.clone(), session.clone());
            #[allow(clippy::cast_precision_loss)]
            gauge!("sessions_active").set(active.len() as f64);
        }
        let _ = self.history.lock().insert(identity.id.clone());
        info!(session_id = %session.id(), backend = self.backend.name(), "session connected");
        Ok(session)
    }

    async fn connect_with_retry(&self, client: &dyn BackendClient) -> Result<(), RuntimeError> {
        let mut attempt = 0;
        loop {
            match client.connect().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    counter!("connect_retries_total").increment(1);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "transient connect failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    client.disconnect().await;
                    return Err(e.into());
                }
            }
        }
    }

    /// Close a session. Idempotent.
    #[instrument(skip_all, fields(session_id = %session.id()))]
    pub async fn disconnect(&self, session: &Session) {
        let _guard = self.lock_identity(&session.identity().id).await;
        self.teardown(session).await;
    }

    async fn teardown(&self, session: &Session) {
        session.cancellation().cancel();
        session.outbound().close();
        session.client().disconnect().await;

        {
            let mut active = self.active.lock();
            let is_current = active
                .get(&session.identity().id)
                .is_some_and(|s| s.id() == session.id());
            if is_current {
                let _ = active.remove(&session.identity().id);
                info!(session_id = %session.id(), "session disconnected");
            }
            #[allow(clippy::cast_precision_loss)]
            gauge!("sessions_active").set(active.len() as f64);
        }

        if let Some(handle) = session.take_dispatcher() {
            if let Err(e) = handle.await {
                warn!(error = %e, "dispatcher task ended abnormally");
            }
        }
    }

    /// Disconnect every session and delete every stored identity.
    ///
    /// Works without a connection. Idempotent. Returns how many identities
    /// were removed.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<usize, RuntimeError> {
        let _all = self.locks.lock_all().await;
        let sessions: Vec<Session> = self.active.lock().values().cloned().collect();
        for session in &sessions {
            self.teardown(session).await;
        }
        let removed = self.store.delete_all()?;
        self.history.lock().clear();
        info!(removed, sessions = sessions.len(), "logged out");
        Ok(removed)
    }

    /// Lifecycle state of the identity `selector` points at.
    pub fn state(&self, selector: &ActiveIdentity) -> Result<SessionState, RuntimeError> {
        let Some(identity) = self.store.find_active(selector)? else {
            return Ok(SessionState::Unpaired);
        };
        if !identity.has_credential() {
            return Ok(SessionState::Unpaired);
        }
        if let Some(session) = self.active.lock().get(&identity.id) {
            return Ok(session.state());
        }
        if self.history.lock().contains(&identity.id) {
            Ok(SessionState::Disconnected)
        } else {
            Ok(SessionState::Paired)
        }
    }

    /// Number of live sessions.
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Disconnect every session, keeping identities.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let _all = self.locks.lock_all().await;
        let sessions: Vec<Session> = self.active.lock().values().cloned().collect();
        debug!(count = sessions.len(), "shutting down sessions");
        for session in &sessions {
            self.teardown(session).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::loopback::LoopbackBackend;
    use crate::dispatch::{EventHandler, HandlerError};
    use crate::errors::BackendError;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::time::Duration;
    use wapoll_core::events::{EventKind, InboundEvent};
    use wapoll_core::jid::Jid;
    use wapoll_core::presence::PresenceState;
    use wapoll_store::ConnectionConfig;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 50,
            jitter_factor: 0.0,
        }
    }

    fn setup(backend: &LoopbackBackend) -> (Arc<IdentityStore>, SessionManager) {
        let store = Arc::new(IdentityStore::open(":memory:", &ConnectionConfig::default()).unwrap());
        let manager = SessionManager::new(
            Arc::clone(&store),
            Arc::new(backend.clone()),
            fast_retry(),
        );
        (store, manager)
    }

    fn paired_in(store: &IdentityStore) -> DeviceIdentity {
        let identity =
            DeviceIdentity::blank().with_credential(Jid::new("40712345678", "s.whatsapp.net"), None);
        store.save_identity(&identity).unwrap();
        identity
    }

    fn no_handlers() -> Arc<HandlerRegistry> {
        Arc::new(HandlerRegistry::new())
    }

    #[tokio::test]
    async fn connect_requires_credential() {
        let backend = LoopbackBackend::new();
        let (_store, manager) = setup(&backend);
        let res = manager.connect(&DeviceIdentity::blank(), no_handlers()).await;
        assert_matches!(res, Err(RuntimeError::NotPaired));
        assert_eq!(backend.connect_calls(), 0);
    }

    #[tokio::test]
    async fn connect_and_disconnect_leave_identities_untouched() {
        let backend = LoopbackBackend::new();
        let (store, manager) = setup(&backend);
        let identity = paired_in(&store);
        let before = store.list_identities().unwrap();

        let session = manager.connect(&identity, no_handlers()).await.unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        manager.disconnect(&session).await;

        assert_eq!(store.list_identities().unwrap(), before);
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn second_connect_is_rejected() {
        let backend = LoopbackBackend::new();
        let (store, manager) = setup(&backend);
        let identity = paired_in(&store);

        let session = manager.connect(&identity, no_handlers()).await.unwrap();
        let second = manager.connect(&identity, no_handlers()).await;
        assert_matches!(second, Err(RuntimeError::AlreadyConnected(_)));
        assert_eq!(backend.max_live_connections(), 1);

        manager.disconnect(&session).await;
        let again = manager.connect(&identity, no_handlers()).await.unwrap();
        manager.disconnect(&again).await;
        assert_eq!(backend.max_live_connections(), 1);
    }

    #[tokio::test]
    async fn concurrent_connects_yield_one_session() {
        let backend = LoopbackBackend::new();
        let (store, manager) = setup(&backend);
        let identity = paired_in(&store);

        let (a, b) = tokio::join!(
            manager.connect(&identity, no_handlers()),
            manager.connect(&identity, no_handlers())
        );
        assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
        assert_eq!(backend.max_live_connections(), 1);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let backend = LoopbackBackend::new();
        let (store, manager) = setup(&backend);
        let identity = paired_in(&store);
        let session = manager.connect(&identity, no_handlers()).await.unwrap();

        manager.disconnect(&session).await;
        manager.disconnect(&session).await;
        assert_eq!(backend.disconnect_calls(), 1);
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_connect_failures_are_retried() {
        let backend = LoopbackBackend::new().fail_connects(vec![
            BackendError::Transient("reset".into()),
            BackendError::Transient("timeout".into()),
        ]);
        let (store, manager) = setup(&backend);
        let identity = paired_in(&store);

        let session = manager.connect(&identity, no_handlers()).await.unwrap();
        assert_eq!(backend.connect_calls(), 3);
        manager.disconnect(&session).await;
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let backend = LoopbackBackend::new().fail_connects(vec![
            BackendError::Transient("1".into()),
            BackendError::Transient("2".into()),
            BackendError::Transient("3".into()),
            BackendError::Transient("4".into()),
        ]);
        let (store, manager) = setup(&backend);
        let identity = paired_in(&store);

        let res = manager.connect(&identity, no_handlers()).await;
        assert_matches!(res, Err(RuntimeError::Backend(BackendError::Transient(_))));
        assert_eq!(backend.connect_calls(), 4);
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn permanent_connect_failure_is_not_retried() {
        let backend =
            LoopbackBackend::new().fail_connects(vec![BackendError::Permanent("banned".into())]);
        let (store, manager) = setup(&backend);
        let identity = paired_in(&store);

        let res = manager.connect(&identity, no_handlers()).await;
        assert_matches!(res, Err(RuntimeError::Backend(BackendError::Permanent(_))));
        assert_eq!(backend.connect_calls(), 1);
    }

    #[tokio::test]
    async fn logout_disconnects_and_clears_store() {
        let backend = LoopbackBackend::new();
        let (store, manager) = setup(&backend);
        let identity = paired_in(&store);
        let session = manager.connect(&identity, no_handlers()).await.unwrap();

        assert_eq!(manager.logout().await.unwrap(), 1);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(manager.active_count(), 0);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn connect_with_identity_read_before_logout_is_rejected() {
        let backend = LoopbackBackend::new();
        let (store, manager) = setup(&backend);
        let stale = paired_in(&store);
        assert_eq!(manager.logout().await.unwrap(), 1);

        let res = manager.connect(&stale, no_handlers()).await;
        assert_matches!(res, Err(RuntimeError::NotPaired));
        assert_eq!(backend.connect_calls(), 0);
        assert_eq!(backend.live_connections(), 0);
        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.state(&ActiveIdentity::First).unwrap(), SessionState::Unpaired);
    }

    #[tokio::test]
    async fn connect_uses_the_persisted_record() {
        let backend = LoopbackBackend::new();
        let (store, manager) = setup(&backend);
        let identity = paired_in(&store);
        let renamed = DeviceIdentity {
            push_name: Some("Ana".into()),
            ..identity.clone()
        };
        store.save_identity(&renamed).unwrap();

        let session = manager.connect(&identity, no_handlers()).await.unwrap();
        assert_eq!(session.identity().push_name.as_deref(), Some("Ana"));
        manager.disconnect(&session).await;
    }

    #[tokio::test]
    async fn logout_twice_is_idempotent() {
        let backend = LoopbackBackend::new();
        let (store, manager) = setup(&backend);
        let _ = paired_in(&store);
        assert_eq!(manager.logout().await.unwrap(), 1);
        assert_eq!(manager.logout().await.unwrap(), 0);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn state_walks_the_lifecycle() {
        let backend = LoopbackBackend::new();
        let (store, manager) = setup(&backend);
        let sel = ActiveIdentity::First;
        assert_eq!(manager.state(&sel).unwrap(), SessionState::Unpaired);

        let identity = paired_in(&store);
        assert_eq!(manager.state(&sel).unwrap(), SessionState::Paired);

        let session = manager.connect(&identity, no_handlers()).await.unwrap();
        assert_eq!(manager.state(&sel).unwrap(), SessionState::Connected);

        manager.disconnect(&session).await;
        assert_eq!(manager.state(&sel).unwrap(), SessionState::Disconnected);
    }

    struct Counter(Mutex<usize>);

    #[async_trait]
    impl EventHandler for Counter {
        fn name(&self) -> &str {
            "counter"
        }
        async fn handle(&self, _: &InboundEvent, _: &crate::dispatch::DispatchContext) -> Result<(), HandlerError> {
            *self.0.lock() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn session_dispatches_connected_and_sets_presence() {
        let backend = LoopbackBackend::new();
        let (store, manager) = setup(&backend);
        let identity = paired_in(&store);
        let counter = Arc::new(Counter(Mutex::new(0)));
        let mut reg = HandlerRegistry::new();
        let _ = reg.register(EventKind::Connected, counter.clone());

        let session = manager.connect(&identity, Arc::new(reg)).await.unwrap();
        for _ in 0..50 {
            if *counter.0.lock() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        manager.disconnect(&session).await;

        assert_eq!(*counter.0.lock(), 1);
        assert_eq!(backend.presences(), vec![PresenceState::Available]);
    }
}
