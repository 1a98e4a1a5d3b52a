//! Chat network addresses.
//!
//! A [`Jid`] is `user@server`. Users live on [`DEFAULT_USER_SERVER`], group
//! chats on [`GROUP_SERVER`]. A bare user part without `@` is accepted by
//! [`Jid::parse_with_default`] and bound to the caller-supplied server.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::CoreError;

/// Server for individual user accounts.
pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";
/// Server for group chats.
pub const GROUP_SERVER: &str = "g.us";

/// A chat or account address.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Jid {
    /// User, phone number, or group identifier.
    pub user: String,
    /// Server part.
    pub server: String,
}

impl Jid {
    /// Build a JID from its parts.
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            server: server.into(),
        }
    }

    /// Build a group JID.
    pub fn group(id: impl Into<String>) -> Self {
        Self::new(id, GROUP_SERVER)
    }

    /// Whether this JID addresses a group chat.
    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }

    /// Parse `user@server`, or a bare `user` bound to `default_server`.
    pub fn parse_with_default(input: &str, default_server: &str) -> Result<Self, CoreError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CoreError::invalid_jid(input, "empty"));
        }
        match trimmed.split_once('@') {
            Some((user, server)) => {
                if user.is_empty() {
                    return Err(CoreError::invalid_jid(input, "empty user"));
                }
                if server.is_empty() {
                    return Err(CoreError::invalid_jid(input, "empty server"));
                }
                if server.contains('@') {
                    return Err(CoreError::invalid_jid(input, "multiple '@'"));
                }
                Ok(Self::new(user, server))
            }
            None => Ok(Self::new(trimmed, default_server)),
        }
    }
}

impl FromStr for Jid {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_with_default(s, DEFAULT_USER_SERVER)
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.server)
    }
}

impl Serialize for Jid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Jid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parse_full_jid() {
        let jid: Jid = "120363028452547709@g.us".parse().unwrap();
        assert_eq!(jid.user, "120363028452547709");
        assert!(jid.is_group());
        assert_eq!(jid.to_string(), "120363028452547709@g.us");
    }

    #[test]
    fn bare_user_gets_default_server() {
        let jid = Jid::parse_with_default("4915112345678", GROUP_SERVER).unwrap();
        assert_eq!(jid, Jid::group("4915112345678"));

        let jid: Jid = "4915112345678".parse().unwrap();
        assert_eq!(jid.server, DEFAULT_USER_SERVER);
    }

    #[test]
    fn rejects_malformed() {
        assert_matches!(
            "".parse::<Jid>(),
            Err(CoreError::InvalidJid { reason: "empty", .. })
        );
        assert_matches!(
            "@g.us".parse::<Jid>(),
            Err(CoreError::InvalidJid { reason: "empty user", .. })
        );
        assert_matches!(
            "abc@".parse::<Jid>(),
            Err(CoreError::InvalidJid { reason: "empty server", .. })
        );
        assert_matches!(
            "a@b@c".parse::<Jid>(),
            Err(CoreError::InvalidJid { reason: "multiple '@'", .. })
        );
    }

    #[test]
    fn serde_as_string() {
        let jid = Jid::new("123", DEFAULT_USER_SERVER);
        let json = serde_json::to_string(&jid).unwrap();
        assert_eq!(json, "\"123@s.whatsapp.net\"");
        let back: Jid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, jid);
    }
}
