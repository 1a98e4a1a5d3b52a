//! Messaging backend seam.
//!
//! The wire protocol (transport, encryption, message encoding) lives behind
//! [`MessagingBackend`]. The runtime only sees clients bound to one
//! [`DeviceIdentity`], the pairing channel, the inbound event stream, and
//! outbound sends.
//!
//! A backend persists a completed pairing itself through the
//! [`IdentityStore`] handed to [`MessagingBackend::client`], the way a device
//! store is updated at the end of a handshake.

pub mod loopback;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use wapoll_core::events::{InboundEvent, PairingEvent};
use wapoll_core::jid::Jid;
use wapoll_core::poll::PollRequest;
use wapoll_core::presence::PresenceState;
use wapoll_store::{DeviceIdentity, IdentityStore};

use crate::errors::BackendError;

/// Factory for clients bound to a device identity.
pub trait MessagingBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Whether nothing actually reaches the network.
    fn is_simulated(&self) -> bool {
        false
    }

    /// Create a client for `identity`. Nothing is opened until
    /// [`BackendClient::connect`].
    fn client(&self, identity: DeviceIdentity, store: Arc<IdentityStore>) -> Arc<dyn BackendClient>;
}

/// A client bound to one device identity.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Open the pairing channel. Must be called before [`connect`](Self::connect).
    ///
    /// Fails with [`BackendError::ChannelUnavailable`] when the identity
    /// already has a credential.
    fn pairing_channel(&self) -> Result<mpsc::Receiver<PairingEvent>, BackendError>;

    /// Subscribe to the inbound event stream. Events arrive in backend order.
    /// The stream ends when the client disconnects.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<InboundEvent>;

    /// Open the connection.
    async fn connect(&self) -> Result<(), BackendError>;

    /// Close the connection. Idempotent.
    async fn disconnect(&self);

    /// Whether the connection is open.
    fn is_connected(&self) -> bool;

    /// Advertise presence.
    async fn send_presence(&self, state: PresenceState) -> Result<(), BackendError>;

    /// Encode a poll creation message.
    fn build_poll_creation(&self, poll: &PollRequest) -> OutboundMessage {
        OutboundMessage::poll_creation(poll)
    }

    /// Send a message once. Never retried by the caller.
    async fn send_message(&self, to: &Jid, message: OutboundMessage)
    -> Result<SendReceipt, BackendError>;
}

/// An encoded outbound message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum OutboundMessage {
    /// A poll creation message.
    PollCreation {
        /// Poll name shown to recipients.
        name: String,
        /// Option labels in display order.
        options: Vec<String>,
        /// Maximum options a recipient may select.
        selectable_count: u32,
    },
}

impl OutboundMessage {
    /// Poll creation from a validated request.
    pub fn poll_creation(poll: &PollRequest) -> Self {
        Self::PollCreation {
            name: poll.question().to_string(),
            options: poll.options().to_vec(),
            selectable_count: poll.selectable_count(),
        }
    }

    /// Message kind for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PollCreation { .. } => "poll_creation",
        }
    }
}

/// Acknowledgement of a sent message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    /// Backend-assigned message ID.
    pub message_id: String,
    /// Chat the message went to.
    pub recipient: Jid,
    /// Server acknowledgement time.
    pub sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_creation_copies_request() {
        let poll = PollRequest::new("Q", vec!["x".into(), "y".into(), "z".into()], 1).unwrap();
        let msg = OutboundMessage::poll_creation(&poll);
        assert_eq!(
            msg,
            OutboundMessage::PollCreation {
                name: "Q".into(),
                options: vec!["x".into(), "y".into(), "z".into()],
                selectable_count: 1,
            }
        );
        assert_eq!(msg.kind(), "poll_creation");
    }

    #[test]
    fn outbound_message_wire_shape() {
        let poll = PollRequest::new("Q", vec!["a".into()], 1).unwrap();
        let v = serde_json::to_value(OutboundMessage::poll_creation(&poll)).unwrap();
        assert_eq!(v["type"], "poll_creation");
        assert_eq!(v["selectable_count"], 1);
    }
}
