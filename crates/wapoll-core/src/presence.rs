//! Presence states a device can advertise.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Online presence advertised to contacts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    /// Online.
    Available,
    /// Offline.
    Unavailable,
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Available => "available",
            Self::Unavailable => "unavailable",
        })
    }
}
