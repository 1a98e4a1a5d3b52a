//! Session lifecycle.
//!
//! A [`Session`] is the live binding between a paired [`DeviceIdentity`] and
//! an open backend client. [`SessionManager`] creates and tears them down.

mod locks;
mod manager;

pub use manager::SessionManager;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wapoll_core::ids::SessionId;
use wapoll_store::DeviceIdentity;

use crate::backend::BackendClient;
use crate::outbound::OutboundComposer;

/// Lifecycle state of the active identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No identity with a credential.
    Unpaired,
    /// Paired, never connected in this process.
    Paired,
    /// A live session exists.
    Connected,
    /// A session existed and has been closed.
    Disconnected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unpaired => "unpaired",
            Self::Paired => "paired",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        })
    }
}

/// Handle to a live session. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: SessionId,
    identity: DeviceIdentity,
    client: Arc<dyn BackendClient>,
    outbound: OutboundComposer,
    cancel: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    connected_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(
        identity: DeviceIdentity,
        client: Arc<dyn BackendClient>,
        outbound: OutboundComposer,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: SessionId::new(),
                identity,
                client,
                outbound,
                cancel,
                dispatcher: Mutex::new(None),
                connected_at: Utc::now(),
            }),
        }
    }

    /// Session ID.
    pub fn id(&self) -> &SessionId {
        &self.inner.id
    }

    /// Identity the session is bound to.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.inner.identity
    }

    /// When the connection opened.
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.inner.connected_at
    }

    /// Composer for sends on this session.
    pub fn outbound(&self) -> &OutboundComposer {
        &self.inner.outbound
    }

    /// Fires when the session is torn down.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// `Connected` while open, `Disconnected` afterwards.
    pub fn state(&self) -> SessionState {
        if self.inner.outbound.is_connected() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    pub(crate) fn client(&self) -> &Arc<dyn BackendClient> {
        &self.inner.client
    }

    pub(crate) fn set_dispatcher(&self, handle: JoinHandle<()>) {
        *self.inner.dispatcher.lock() = Some(handle);
    }

    pub(crate) fn take_dispatcher(&self) -> Option<JoinHandle<()>> {
        self.inner.dispatcher.lock().take()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("identity_id", &self.inner.identity.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
