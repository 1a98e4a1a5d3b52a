//! Identity store errors.

/// Errors from the identity store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The durable store cannot be reached or initialised. Fatal at startup.
    #[error("identity store unavailable: {0}")]
    Unavailable(String),

    /// No identity matched the selector.
    #[error("device identity not found: {0}")]
    NotFound(String),

    /// `SQLite` error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A stored row could not be decoded.
    #[error("corrupt identity row {id}: {reason}")]
    Corrupt {
        /// Row ID.
        id: String,
        /// Decode failure.
        reason: String,
    },

    /// Internal invariant violation.
    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Whether this error means the store itself is unreachable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Pool(_))
    }
}

/// Store result alias.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_classification() {
        assert!(StoreError::Unavailable("down".into()).is_unavailable());
        assert!(!StoreError::NotFound("dev_1".into()).is_unavailable());
    }

    #[test]
    fn display_messages() {
        let e = StoreError::Corrupt {
            id: "dev_1".into(),
            reason: "bad jid".into(),
        };
        assert_eq!(e.to_string(), "corrupt identity row dev_1: bad jid");
    }
}
