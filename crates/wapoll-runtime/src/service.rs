//! `PollService`: the operations the CLI exposes.
//!
//! Every operation resolves the active identity through the configured
//! [`ActiveIdentity`] selector, so which device is used never depends on
//! store iteration order.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use wapoll_core::jid::{GROUP_SERVER, Jid};
use wapoll_core::poll::PollRequest;
use wapoll_settings::WapollSettings;
use wapoll_store::{ActiveIdentity, ConnectionConfig, DeviceIdentity, IdentityStore};

use crate::backend::{MessagingBackend, SendReceipt};
use crate::dispatch::{HandlerRegistry, LoggingHandler};
use crate::errors::RuntimeError;
use crate::pairing::{PairingCode, PairingFlow};
use crate::session::{SessionManager, SessionState};

/// Login, logout, listen and poll creation for the active identity.
pub struct PollService {
    settings: Arc<WapollSettings>,
    selector: ActiveIdentity,
    sessions: Arc<SessionManager>,
    pairing: PairingFlow,
    handlers: Arc<HandlerRegistry>,
}

impl PollService {
    /// Open the configured identity store and build the service.
    ///
    /// An unreachable store is fatal: [`RuntimeError::Store`] with
    /// `StoreError::Unavailable`.
    pub fn new(
        settings: Arc<WapollSettings>,
        backend: Arc<dyn MessagingBackend>,
    ) -> Result<Self, RuntimeError> {
        let config = ConnectionConfig {
            pool_size: settings.store.pool_size,
            busy_timeout_ms: settings.store.busy_timeout_ms,
            ..ConnectionConfig::default()
        };
        let store = Arc::new(IdentityStore::open(&settings.store.database_url, &config)?);
        Ok(Self::with_store(settings, store, backend))
    }

    /// Build over an already-open store. `listen` logs events through
    /// [`LoggingHandler`] until [`with_handlers`](Self::with_handlers) replaces it.
    pub fn with_store(
        settings: Arc<WapollSettings>,
        store: Arc<IdentityStore>,
        backend: Arc<dyn MessagingBackend>,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(store, backend, settings.retry.clone()));
        let pairing = PairingFlow::new(
            Arc::clone(&sessions),
            Duration::from_millis(settings.session.pairing_timeout_ms),
        );
        let mut handlers = HandlerRegistry::new();
        LoggingHandler::install(&mut handlers);
        Self {
            selector: ActiveIdentity::from_setting(settings.session.active_identity.as_deref()),
            settings,
            sessions,
            pairing,
            handlers: Arc::new(handlers),
        }
    }

    /// Replace the handlers `listen` registers.
    #[must_use]
    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Arc::new(handlers);
        self
    }

    /// The session manager.
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// The selector every operation resolves identities through.
    pub fn selector(&self) -> &ActiveIdentity {
        &self.selector
    }

    /// Run pairing and return the code to render, if one was issued.
    #[instrument(skip(self))]
    pub async fn login_code(&self) -> Result<Option<PairingCode>, RuntimeError> {
        self.pairing.pair_active(&self.selector).await
    }

    /// Run pairing and return the code, or an empty string when the backend
    /// closed the channel without one.
    pub async fn login(&self) -> Result<String, RuntimeError> {
        Ok(self.login_code().await?.map(|c| c.code).unwrap_or_default())
    }

    /// Disconnect and forget every identity. Idempotent.
    pub async fn logout(&self) -> Result<(), RuntimeError> {
        let _ = self.sessions.logout().await?;
        Ok(())
    }

    /// Stay connected for `duration` or until `cancel` fires, dispatching
    /// inbound events to the registered handlers.
    #[instrument(skip(self, cancel), fields(seconds = duration.as_secs()))]
    pub async fn listen(&self, duration: Duration, cancel: CancellationToken) -> Result<(), RuntimeError> {
        let identity = self.paired_identity()?;
        let session = self
            .sessions
            .connect(&identity, Arc::clone(&self.handlers))
            .await?;
        info!(session_id = %session.id(), "listening");

        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            () = cancel.cancelled() => info!("listen cancelled"),
            () = session.cancellation().cancelled() => info!("session closed while listening"),
        }

        self.sessions.disconnect(&session).await;
        Ok(())
    }

    /// Send one poll to the configured destination.
    ///
    /// Validation and the paired check happen before any connection is
    /// opened; when they fail nothing is sent.
    #[instrument(skip(self, options), fields(options = options.len()))]
    pub async fn create_poll(
        &self,
        question: &str,
        options: Vec<String>,
        selectable_count: u32,
    ) -> Result<SendReceipt, RuntimeError> {
        let poll = PollRequest::new(question, options, selectable_count)?;
        let destination = self.destination()?;
        let identity = self.paired_identity()?;

        let session = self
            .sessions
            .connect(&identity, Arc::new(HandlerRegistry::new()))
            .await?;
        let sent = session.outbound().send_poll(&destination, &poll).await;
        self.sessions.disconnect(&session).await;

        let receipt = sent?;
        info!(
            push_name = session.identity().push_name.as_deref().unwrap_or_default(),
            message_id = %receipt.message_id,
            "created a poll"
        );
        Ok(receipt)
    }

    /// Stored identities, oldest first.
    pub fn devices(&self) -> Result<Vec<DeviceIdentity>, RuntimeError> {
        Ok(self.sessions.store().list_identities()?)
    }

    /// Lifecycle state of the active identity.
    pub fn state(&self) -> Result<SessionState, RuntimeError> {
        self.sessions.state(&self.selector)
    }

    fn paired_identity(&self) -> Result<DeviceIdentity, RuntimeError> {
        match self.sessions.store().find_active(&self.selector)? {
            Some(identity) if identity.has_credential() => Ok(identity),
            _ => Err(RuntimeError::NotPaired),
        }
    }

    fn destination(&self) -> Result<Jid, RuntimeError> {
        let raw = self
            .settings
            .poll
            .destination
            .as_deref()
            .ok_or(RuntimeError::MissingDestination)?;
        Jid::parse_with_default(raw, GROUP_SERVER).map_err(RuntimeError::InvalidDestination)
    }
}
