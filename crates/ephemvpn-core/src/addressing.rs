// ── Deterministic peer addressing ──
//
// A peer's address is a pure function of its client identifier:
// MD5(id) → first 8 bytes (16 hex chars) as a big-endian u64 →
// `% 254 + 2` → last octet of the /24 peer subnet. Both the server-side
// reconciler and the client-config renderer call `PeerSubnet::address_for`,
// so the two sides cannot drift apart.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Number of usable host slots produced by the reduction.
pub const ADDRESS_SLOTS: u64 = 254;

/// Lowest octet the reduction can produce (`.0` and `.1` are never handed out).
pub const FIRST_PEER_OCTET: u8 = 2;

/// Last octet of a client identifier's address, always in `2..=255`.
pub fn host_octet(client_id: &str) -> u8 {
    let digest = Md5::digest(client_id.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let reduced = u64::from_be_bytes(head) % ADDRESS_SLOTS;
    // `reduced` < 254, so the conversion cannot fail.
    u8::try_from(reduced).unwrap_or_default() + FIRST_PEER_OCTET
}

/// The reserved /24 that peer addresses are carved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerSubnet {
    network: Ipv4Addr,
}

impl PeerSubnet {
    pub const DEFAULT: Self = Self {
        network: Ipv4Addr::new(10, 77, 0, 0),
    };

    /// Build from a network address; the last octet must be zero.
    pub fn new(network: Ipv4Addr) -> Result<Self, CoreError> {
        if network.octets()[3] != 0 {
            return Err(CoreError::Config {
                field: "peer_subnet".into(),
                reason: format!("{network} is not a /24 network address"),
            });
        }
        Ok(Self { network })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        24
    }

    /// Address with the given last octet.
    pub fn host(&self, octet: u8) -> Ipv4Addr {
        let [a, b, c, _] = self.network.octets();
        Ipv4Addr::new(a, b, c, octet)
    }

    /// The node's own tunnel address (`.1`).
    pub fn server_address(&self) -> Ipv4Addr {
        self.host(1)
    }

    /// Stable address for a client identifier.
    pub fn address_for(&self, client_id: &str) -> Ipv4Addr {
        self.host(host_octet(client_id))
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        ip.octets()[..3] == self.network.octets()[..3]
    }
}

impl Default for PeerSubnet {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for PeerSubnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/24", self.network)
    }
}

impl FromStr for PeerSubnet {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CoreError::Config {
            field: "peer_subnet".into(),
            reason: format!("{s}: {reason}"),
        };
        let (addr, len) = s.trim().split_once('/').unwrap_or((s.trim(), "24"));
        if len != "24" {
            return Err(invalid("only /24 peer subnets are supported"));
        }
        let network: Ipv4Addr = addr.parse().map_err(|_| invalid("not an IPv4 address"))?;
        Self::new(network)
    }
}

impl TryFrom<String> for PeerSubnet {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PeerSubnet> for String {
    fn from(value: PeerSubnet) -> Self {
        value.to_string()
    }
}
