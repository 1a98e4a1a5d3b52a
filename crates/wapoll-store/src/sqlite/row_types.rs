//! Raw table rows, decoded into domain types by the store.

use wapoll_core::ids::IdentityId;

use crate::errors::{Result, StoreError};
use crate::types::DeviceIdentity;

/// One row of the `devices` table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceRow {
    /// Primary key.
    pub id: String,
    /// Account JID string, `NULL` until paired.
    pub jid: Option<String>,
    /// Display name.
    pub push_name: Option<String>,
    /// Platform string.
    pub platform: Option<String>,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 pairing time.
    pub paired_at: Option<String>,
}

impl DeviceRow {
    /// Build a row from a domain identity.
    pub fn from_identity(identity: &DeviceIdentity) -> Self {
        Self {
            id: identity.id.to_string(),
            jid: identity.jid.as_ref().map(ToString::to_string),
            push_name: identity.push_name.clone(),
            platform: identity.platform.clone(),
            created_at: identity.created_at.clone(),
            paired_at: identity.paired_at.clone(),
        }
    }

    /// Decode into a domain identity.
    pub fn into_identity(self) -> Result<DeviceIdentity> {
        let jid = match self.jid {
            Some(raw) => Some(raw.parse().map_err(|e| StoreError::Corrupt {
                id: self.id.clone(),
                reason: format!("{e}"),
            })?),
            None => None,
        };
        Ok(DeviceIdentity {
            id: IdentityId::from_string(self.id),
            jid,
            push_name: self.push_name,
            platform: self.platform,
            created_at: self.created_at,
            paired_at: self.paired_at,
        })
    }
}
