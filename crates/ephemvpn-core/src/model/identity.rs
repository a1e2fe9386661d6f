// ── Node identity ──

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

pub const KEY_ALGORITHM: &str = "curve25519";
pub const KEY_PURPOSE: &str = "wireguard-server";

/// Provenance record stored next to the node key as
/// `timestamp|algorithm|purpose`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub created_at: DateTime<Utc>,
    pub algorithm: String,
    pub purpose: String,
}

impl KeyMetadata {
    pub fn now() -> Self {
        Self {
            created_at: Utc::now(),
            algorithm: KEY_ALGORITHM.to_owned(),
            purpose: KEY_PURPOSE.to_owned(),
        }
    }
}

impl fmt::Display for KeyMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.created_at.to_rfc3339(),
            self.algorithm,
            self.purpose
        )
    }
}

impl FromStr for KeyMetadata {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, '|');
        let (Some(ts), Some(algorithm), Some(purpose)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("expected timestamp|algorithm|purpose, got '{s}'"));
        };
        let created_at = DateTime::parse_from_rfc3339(ts)
            .map_err(|e| format!("bad timestamp '{ts}': {e}"))?
            .with_timezone(&Utc);
        Ok(Self {
            created_at,
            algorithm: algorithm.to_owned(),
            purpose: purpose.to_owned(),
        })
    }
}

/// The node's tunnel keypair. The private half never appears in `Debug`.
#[derive(Debug, Clone)]
pub struct Identity {
    pub private_key: SecretString,
    pub public_key: String,
    pub metadata: Option<KeyMetadata>,
}

impl Identity {
    pub fn private_key(&self) -> &str {
        self.private_key.expose_secret()
    }
}
