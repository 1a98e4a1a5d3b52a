//! Runtime and backend error types.

use wapoll_core::errors::CoreError;
use wapoll_store::StoreError;

/// Failures reported by a messaging backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Network-level failure worth retrying (timeouts, resets, 5xx).
    #[error("transient backend failure: {0}")]
    Transient(String),

    /// Failure that will not go away on retry (auth rejected, banned, bad request).
    #[error("backend failure: {0}")]
    Permanent(String),

    /// The pairing channel cannot be opened, e.g. because the identity
    /// already holds a credential.
    #[error("pairing channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// The client is not connected.
    #[error("backend client is not connected")]
    NotConnected,
}

impl BackendError {
    /// Whether retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Errors surfaced by runtime operations.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The operation needs a paired identity and none exists.
    #[error("not logged in: no paired device identity")]
    NotPaired,

    /// The operation needs a live session.
    #[error("session is not connected")]
    NotConnected,

    /// The identity already has a live session.
    #[error("identity {0} already has a live session")]
    AlreadyConnected(String),

    /// The poll request is malformed.
    #[error(transparent)]
    InvalidPoll(#[from] CoreError),

    /// The configured poll destination is not a valid chat address.
    #[error("invalid poll destination: {0}")]
    InvalidDestination(CoreError),

    /// No destination chat is configured for polls.
    #[error("poll destination is not configured (set poll.destination or WAPOLL_POLL_DESTINATION)")]
    MissingDestination,

    /// The messaging backend failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The identity store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Internal invariant violation.
    #[error("internal runtime error: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// Whether the identity store is unreachable (fatal at startup).
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_unavailable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(BackendError::Transient("reset".into()).is_transient());
        assert!(!BackendError::Permanent("401".into()).is_transient());
        assert!(!BackendError::NotConnected.is_transient());
    }

    #[test]
    fn store_unavailable_detection() {
        let e = RuntimeError::from(StoreError::Unavailable("down".into()));
        assert!(e.is_store_unavailable());
        assert!(!RuntimeError::NotPaired.is_store_unavailable());
    }

    #[test]
    fn messages_are_user_facing() {
        assert_eq!(
            RuntimeError::NotPaired.to_string(),
            "not logged in: no paired device identity"
        );
        let e = RuntimeError::from(BackendError::Transient("timeout".into()));
        assert_eq!(e.to_string(), "transient backend failure: timeout");
    }
}
