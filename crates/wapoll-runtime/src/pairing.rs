//! QR pairing handshake.
//!
//! Opens the backend's pairing channel, connects once, and returns the first
//! code the backend issues. The backend persists the identity itself when the
//! handshake completes; this flow only reads codes.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, instrument, warn};
use wapoll_core::events::PairingEvent;
use wapoll_store::{ActiveIdentity, DeviceIdentity};

use crate::backend::BackendClient;
use crate::errors::RuntimeError;
use crate::session::SessionManager;

/// A short-lived code to render for scanning. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingCode {
    /// Payload to encode in the scannable image.
    pub code: String,
    /// How long the code stays valid.
    #[serde(with = "millis")]
    pub timeout: Duration,
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Disconnects the pairing client on every exit path.
///
/// [`release`](Self::release) disconnects inline; dropping an unreleased
/// guard (e.g. when the pairing future is cancelled) spawns the disconnect.
struct ConnectionGuard {
    client: Option<Arc<dyn BackendClient>>,
}

impl ConnectionGuard {
    fn new(client: Arc<dyn BackendClient>) -> Self {
        Self {
            client: Some(client),
        }
    }

    async fn release(mut self) {
        if let Some(client) = self.client.take() {
            client.disconnect().await;
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let _ = handle.spawn(async move { client.disconnect().await });
            }
            Err(_) => warn!("pairing client dropped outside a runtime, disconnect skipped"),
        }
    }
}

/// Drives pairing handshakes, one at a time.
pub struct PairingFlow {
    sessions: Arc<SessionManager>,
    code_timeout: Duration,
    /// Held from identity lookup until the handshake's connection is released.
    handshake: Mutex<()>,
}

impl PairingFlow {
    /// Flow that gives up waiting for a code after `code_timeout`.
    pub fn new(sessions: Arc<SessionManager>, code_timeout: Duration) -> Self {
        Self {
            sessions,
            code_timeout,
            handshake: Mutex::new(()),
        }
    }

    /// Pair the identity `selector` points at, or a fresh blank one.
    ///
    /// The lookup runs under the handshake lock, so concurrent logins pair
    /// one after another instead of racing on separate blank identities.
    pub async fn pair_active(
        &self,
        selector: &ActiveIdentity,
    ) -> Result<Option<PairingCode>, RuntimeError> {
        let _handshake = self.handshake.lock().await;
        let identity = self.sessions.store().active_or_blank(selector)?;
        self.pair_locked(identity).await
    }

    /// Pair `identity` and return the first code the backend issues.
    ///
    /// An identity that already holds a credential is logged out first and
    /// replaced by a blank one with the same local ID. `Ok(None)` means the
    /// channel closed (or the wait timed out) before any code arrived.
    /// Connect failures are not retried.
    pub async fn pair(&self, identity: DeviceIdentity) -> Result<Option<PairingCode>, RuntimeError> {
        let _handshake = self.handshake.lock().await;
        self.pair_locked(identity).await
    }

    #[instrument(skip_all, fields(identity_id = %identity.id))]
    async fn pair_locked(
        &self,
        identity: DeviceIdentity,
    ) -> Result<Option<PairingCode>, RuntimeError> {
        let identity = if identity.has_credential() {
            info!("identity already paired, logging out before re-pairing");
            let _ = self.sessions.logout().await?;
            DeviceIdentity {
                id: identity.id,
                ..DeviceIdentity::blank()
            }
        } else {
            identity
        };

        let _guard = self.sessions.lock_identity(&identity.id).await;
        let client = self
            .sessions
            .backend()
            .client(identity, Arc::clone(self.sessions.store()));
        let mut events = client.pairing_channel()?;
        let connection = ConnectionGuard::new(Arc::clone(&client));

        let outcome = match client.connect().await {
            Ok(()) => Ok(self.await_code(&mut events).await),
            Err(e) => {
                warn!(error = %e, "pairing connect failed");
                Err(e.into())
            }
        };
        connection.release().await;
        outcome
    }

    async fn await_code(&self, events: &mut mpsc::Receiver<PairingEvent>) -> Option<PairingCode> {
        let deadline = tokio::time::sleep(self.code_timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                () = &mut deadline => {
                    warn!(timeout_ms = u64::try_from(self.code_timeout.as_millis()).unwrap_or(u64::MAX), "no pairing code issued in time");
                    return None;
                }
                event = events.recv() => match event {
                    Some(PairingEvent::Code { code, timeout }) => {
                        info!("pairing code issued");
                        return Some(PairingCode { code, timeout });
                    }
                    Some(other) => debug!(event = other.name(), "ignoring pairing event"),
                    None => {
                        info!("pairing channel closed without a code");
                        return None;
                    }
                },
            }
        }
    }
}
