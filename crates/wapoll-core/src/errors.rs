//! Validation and parse errors for core value types.

/// Errors raised while constructing core value types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// A JID string could not be parsed.
    #[error("invalid jid '{input}': {reason}")]
    InvalidJid {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A poll request violated its shape constraints.
    #[error("invalid poll: {0}")]
    InvalidPoll(String),
}

impl CoreError {
    pub(crate) fn invalid_jid(input: &str, reason: &'static str) -> Self {
        Self::InvalidJid {
            input: input.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_jid_display() {
        let e = CoreError::invalid_jid("@@", "empty user");
        assert_eq!(e.to_string(), "invalid jid '@@': empty user");
    }

    #[test]
    fn invalid_poll_display() {
        let e = CoreError::InvalidPoll("no options".into());
        assert!(e.to_string().contains("no options"));
    }
}
