// ── Client records and peer assignments ──

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Authorization state of a client record.
///
/// Only the exact value `active` authorizes a client. Anything else,
/// including a missing status parameter, is inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ClientStatus {
    Active,
    #[default]
    Inactive,
}

impl ClientStatus {
    /// Interpret a stored status value; absent or unknown means inactive.
    pub fn from_stored(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

/// A peer authorized for this pass of reconciliation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAssignment {
    pub client_id: String,
    pub address: Ipv4Addr,
    pub public_key: String,
}

impl PeerAssignment {
    /// The peer's single-host allowed IP, e.g. `10.77.0.110/32`.
    pub fn allowed_ip(&self) -> String {
        format!("{}/32", self.address)
    }
}

/// Why a client was left out of the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    MissingPublicKey,
    AddressCollision { with: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingPublicKey => f.write_str("missing public key"),
            Self::AddressCollision { with } => write!(f, "address collision with {with}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedClient {
    pub client_id: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}
