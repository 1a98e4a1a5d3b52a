//! Branded identifier newtypes.
//!
//! Identifiers are plain strings on the wire and in `SQLite`, but distinct
//! types in code so an identity ID can never be passed where a session ID
//! is expected.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh, time-ordered ID.
            #[must_use]
            pub fn new() -> Self {
                Self(format!(concat!($prefix, "_{}"), Uuid::now_v7()))
            }

            /// Wrap an existing ID string.
            pub fn from_string(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(
    /// Local identifier of a persisted device identity row.
    IdentityId,
    "dev"
);

branded_id!(
    /// Identifier of one live session (one connect → disconnect span).
    SessionId,
    "sess"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_carry_prefix() {
        assert!(IdentityId::new().as_str().starts_with("dev_"));
        assert!(SessionId::new().as_str().starts_with("sess_"));
    }

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(IdentityId::new(), IdentityId::new());
    }

    #[test]
    fn serde_is_transparent() {
        let id = IdentityId::from_string("dev_abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"dev_abc\"");
        let back: IdentityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display_matches_inner() {
        let id = SessionId::from("sess_1");
        assert_eq!(id.to_string(), "sess_1");
    }
}
