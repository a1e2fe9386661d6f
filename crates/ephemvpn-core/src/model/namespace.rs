// ── Parameter namespace ──
//
// Every parameter the node touches lives under one prefix. The layout is
// shared with the peer-management API, so these paths are a wire contract.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PREFIX: &str = "/ephem-vpn";

/// A normalized parameter prefix: leading `/`, no trailing `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Namespace {
    prefix: String,
}

impl Namespace {
    pub fn new(prefix: impl AsRef<str>) -> Self {
        let trimmed = prefix.as_ref().trim().trim_matches('/');
        Self {
            prefix: format!("/{trimmed}"),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn join(&self, suffix: &str) -> String {
        if self.prefix == "/" {
            format!("/{suffix}")
        } else {
            format!("{}/{suffix}", self.prefix)
        }
    }

    // ── Node parameters ──────────────────────────────────────────────

    pub fn master_api_key(&self) -> String {
        self.join("master-api-key")
    }

    pub fn server_private_key(&self) -> String {
        self.join("wg/server-private-key")
    }

    pub fn server_private_key_b64(&self) -> String {
        self.join("wg/server-private-key-b64")
    }

    pub fn server_public_key(&self) -> String {
        self.join("wg/server-public-key")
    }

    pub fn server_public_key_b64(&self) -> String {
        self.join("wg/server-public-key-b64")
    }

    pub fn server_key_metadata(&self) -> String {
        self.join("wg/server-key-metadata")
    }

    // ── Client records ───────────────────────────────────────────────

    /// Prefix that every client record parameter starts with.
    pub fn users_root(&self) -> String {
        self.join("users/")
    }

    pub fn user_status(&self, client_id: &str) -> String {
        self.join(&format!("users/{client_id}/status"))
    }

    pub fn user_public_key(&self, client_id: &str) -> String {
        self.join(&format!("users/{client_id}/wg-public-key"))
    }

    pub fn user_private_key(&self, client_id: &str) -> String {
        self.join(&format!("users/{client_id}/wg-private-key"))
    }

    pub fn user_created_at(&self, client_id: &str) -> String {
        self.join(&format!("users/{client_id}/created-at"))
    }

    /// Client identifier a parameter name belongs to, if it is a client
    /// record path (`{prefix}/users/{id}/...`).
    pub fn client_id_of<'a>(&self, name: &'a str) -> Option<&'a str> {
        let root = self.users_root();
        let rest = name.strip_prefix(root.as_str())?;
        let id = rest.split('/').next()?;
        (!id.is_empty()).then_some(id)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl From<String> for Namespace {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Namespace> for String {
    fn from(value: Namespace) -> Self {
        value.prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_normalized() {
        assert_eq!(Namespace::new("ephem-vpn/").prefix(), "/ephem-vpn");
        assert_eq!(Namespace::new("/ephem-vpn").prefix(), "/ephem-vpn");
        assert_eq!(Namespace::new(" /a/b/ ").prefix(), "/a/b");
    }

    #[test]
    fn node_paths() {
        let ns = Namespace::default();
        assert_eq!(ns.master_api_key(), "/ephem-vpn/master-api-key");
        assert_eq!(ns.server_private_key(), "/ephem-vpn/wg/server-private-key");
        assert_eq!(
            ns.server_public_key_b64(),
            "/ephem-vpn/wg/server-public-key-b64"
        );
        assert_eq!(ns.server_key_metadata(), "/ephem-vpn/wg/server-key-metadata");
    }

    #[test]
    fn client_paths_round_trip_through_client_id_of() {
        let ns = Namespace::default();
        let status = ns.user_status("alice");
        assert_eq!(status, "/ephem-vpn/users/alice/status");
        assert_eq!(ns.client_id_of(&status), Some("alice"));
        assert_eq!(
            ns.client_id_of("/ephem-vpn/users/bob/wg-public-key"),
            Some("bob")
        );
    }

    #[test]
    fn client_id_of_rejects_foreign_paths() {
        let ns = Namespace::default();
        assert_eq!(ns.client_id_of("/ephem-vpn/wg/server-public-key"), None);
        assert_eq!(ns.client_id_of("/other/users/alice/status"), None);
        assert_eq!(ns.client_id_of("/ephem-vpn/users//status"), None);
    }
}
