//! Device identity records and the active-identity selector.

use std::fmt;

use serde::{Deserialize, Serialize};
use wapoll_core::ids::IdentityId;
use wapoll_core::jid::Jid;

/// A device identity bound (or about to be bound) to one pairing.
///
/// The credential is the account [`Jid`]: an identity with `jid == None` has
/// never completed pairing and cannot connect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    /// Local row ID.
    pub id: IdentityId,
    /// Account this device is paired to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jid: Option<Jid>,
    /// Display name of the paired account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    /// Platform string reported during the handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 time pairing completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paired_at: Option<String>,
}

impl DeviceIdentity {
    /// A fresh identity with no credential. Not persisted.
    pub fn blank() -> Self {
        Self {
            id: IdentityId::new(),
            jid: None,
            push_name: None,
            platform: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            paired_at: None,
        }
    }

    /// Whether the identity has completed pairing.
    pub fn has_credential(&self) -> bool {
        self.jid.is_some()
    }

    /// Record a completed pairing.
    #[must_use]
    pub fn with_credential(mut self, jid: Jid, push_name: Option<String>) -> Self {
        self.jid = Some(jid);
        self.push_name = push_name;
        self.paired_at = Some(chrono::Utc::now().to_rfc3339());
        self
    }
}

/// Which stored identity the system operates on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ActiveIdentity {
    /// The oldest identity by creation time (ties broken by insertion order).
    #[default]
    First,
    /// A specific identity.
    ById(IdentityId),
}

impl ActiveIdentity {
    /// Build from the optional `session.activeIdentity` setting.
    pub fn from_setting(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(id) if !id.is_empty() => Self::ById(IdentityId::from(id)),
            _ => Self::First,
        }
    }
}

impl fmt::Display for ActiveIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("first"),
            Self::ById(id) => write!(f, "{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_has_no_credential() {
        let d = DeviceIdentity::blank();
        assert!(!d.has_credential());
        assert!(d.paired_at.is_none());
        assert!(d.id.as_str().starts_with("dev_"));
    }

    #[test]
    fn with_credential_sets_pairing_fields() {
        let d = DeviceIdentity::blank().with_credential(Jid::new("123", "s.whatsapp.net"), Some("Ana".into()));
        assert!(d.has_credential());
        assert_eq!(d.push_name.as_deref(), Some("Ana"));
        assert!(d.paired_at.is_some());
    }

    #[test]
    fn selector_from_setting() {
        assert_eq!(ActiveIdentity::from_setting(None), ActiveIdentity::First);
        assert_eq!(ActiveIdentity::from_setting(Some("  ")), ActiveIdentity::First);
        assert_eq!(
            ActiveIdentity::from_setting(Some("dev_9")),
            ActiveIdentity::ById(IdentityId::from("dev_9"))
        );
        assert_eq!(ActiveIdentity::First.to_string(), "first");
    }
}
