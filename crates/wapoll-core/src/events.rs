//! Event types emitted by the messaging backend.
//!
//! Two event families:
//!
//! - **[`PairingEvent`]**: Events on the one-shot QR pairing channel
//!   (code issued, success, timeout, error).
//! - **[`InboundEvent`]**: Live session events delivered while connected
//!   (connection established, messages, disconnects).
//!
//! Both are transient. Neither is ever persisted by wapoll.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::jid::Jid;

// ─────────────────────────────────────────────────────────────────────────────
// PairingEvent: QR channel
// ─────────────────────────────────────────────────────────────────────────────

/// Events on the pairing channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PairingEvent {
    /// A new code to display. Supersedes any previous code.
    Code {
        /// The payload to encode in the scannable image.
        code: String,
        /// How long the code stays valid.
        #[serde(with = "duration_ms")]
        timeout: Duration,
    },
    /// The handshake completed and the device now has a credential.
    Success {
        /// Account the device was bound to.
        jid: Jid,
    },
    /// All codes expired without a scan.
    Timeout,
    /// The backend reported a pairing error.
    Error {
        /// Backend-supplied description.
        message: String,
    },
    /// Any event this crate does not model.
    Other {
        /// Backend event name.
        name: String,
    },
}

impl PairingEvent {
    /// Event name as the backend reports it.
    pub fn name(&self) -> &str {
        match self {
            Self::Code { .. } => "code",
            Self::Success { .. } => "success",
            Self::Timeout => "timeout",
            Self::Error { .. } => "error",
            Self::Other { name } => name,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// InboundEvent: live session stream
// ─────────────────────────────────────────────────────────────────────────────

/// Metadata of a received message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInfo {
    /// Backend message ID.
    pub id: String,
    /// Chat the message was posted in.
    pub chat: Jid,
    /// Author of the message.
    pub sender: Jid,
    /// Display name the sender advertises.
    pub push_name: String,
    /// Server timestamp.
    pub timestamp: DateTime<Utc>,
    /// Plain text body, when the message has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Events delivered on a connected session's stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// The connection is fully established.
    Connected,
    /// A message arrived.
    Message(MessageInfo),
    /// The connection dropped.
    Disconnected,
    /// The account unlinked this device remotely.
    LoggedOut {
        /// Backend-supplied reason.
        reason: String,
    },
    /// Any event this crate does not model.
    Other {
        /// Backend event name.
        name: String,
    },
}

/// Discriminant of [`InboundEvent`], used as a handler registration key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// [`InboundEvent::Connected`]
    Connected,
    /// [`InboundEvent::Message`]
    Message,
    /// [`InboundEvent::Disconnected`]
    Disconnected,
    /// [`InboundEvent::LoggedOut`]
    LoggedOut,
    /// [`InboundEvent::Other`]
    Other,
}

impl InboundEvent {
    /// The event's kind.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected => EventKind::Connected,
            Self::Message(_) => EventKind::Message,
            Self::Disconnected => EventKind::Disconnected,
            Self::LoggedOut { .. } => EventKind::LoggedOut,
            Self::Other { .. } => EventKind::Other,
        }
    }

    /// Event type string for logs and metrics labels.
    pub fn event_type(&self) -> &'static str {
        match self.kind() {
            EventKind::Connected => "connected",
            EventKind::Message => "message",
            EventKind::Disconnected => "disconnected",
            EventKind::LoggedOut => "logged_out",
            EventKind::Other => "other",
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
