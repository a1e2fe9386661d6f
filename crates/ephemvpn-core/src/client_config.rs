// ── Client configuration rendering ──
//
// Produces the wg-quick file a client imports. The client address comes
// from `PeerSubnet::address_for`, the same function the roster uses for
// the server side of the tunnel.

use std::fmt::Write as _;
use std::net::Ipv4Addr;

use ephemvpn_store::ParameterStore;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::config::{DEFAULT_KEEPALIVE, NodeConfig};
use crate::error::CoreError;

/// Everything needed to render one client's configuration file.
#[derive(Debug, Clone)]
pub struct ClientProfile {
    pub client_id: String,
    pub private_key: SecretString,
    pub address: Ipv4Addr,
    pub dns: Vec<Ipv4Addr>,
    pub server_public_key: String,
    pub endpoint: String,
    pub allowed_ips: String,
    pub keepalive: u16,
}

impl ClientProfile {
    /// Load the client's key and the node's public key from the store.
    ///
    /// `endpoint` is the `host:port` clients should dial.
    pub async fn load(
        store: &dyn ParameterStore,
        config: &NodeConfig,
        client_id: &str,
        endpoint: String,
    ) -> Result<Self, CoreError> {
        let ns = &config.namespace;
        debug!(client_id, "loading client profile");

        let private_key = store.get(&ns.user_private_key(client_id)).await?;
        let server_public_key = store.get(&ns.server_public_key()).await?;

        Ok(Self {
            client_id: client_id.to_owned(),
            private_key: SecretString::from(private_key.trim().to_owned()),
            address: config.tunnel.subnet.address_for(client_id),
            dns: config.client_dns.clone(),
            server_public_key: server_public_key.trim().to_owned(),
            endpoint,
            allowed_ips: config.route_cidr.clone(),
            keepalive: DEFAULT_KEEPALIVE,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "[Interface]");
        let _ = writeln!(out, "PrivateKey = {}", self.private_key.expose_secret());
        let _ = writeln!(out, "Address = {}/32", self.address);
        if !self.dns.is_empty() {
            let servers: Vec<String> = self.dns.iter().map(ToString::to_string).collect();
            let _ = writeln!(out, "DNS = {}", servers.join(", "));
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "[Peer]");
        let _ = writeln!(out, "PublicKey = {}", self.server_public_key);
        let _ = writeln!(out, "Endpoint = {}", self.endpoint);
        let _ = writeln!(out, "AllowedIPs = {}", self.allowed_ips);
        let _ = writeln!(out, "PersistentKeepalive = {}", self.keepalive);
        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ephemvpn_store::MemoryStore;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::{DnsSettings, PublicIpConfig, TunnelSettings};
    use crate::model::Namespace;

    fn node_config() -> NodeConfig {
        NodeConfig {
            namespace: Namespace::default(),
            region: "us-east-1".into(),
            api_port: 8000,
            tunnel: TunnelSettings::default(),
            dns: DnsSettings::default(),
            public_ip: PublicIpConfig::default(),
            client_dns: vec![Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(8, 8, 4, 4)],
            route_cidr: "0.0.0.0/0".into(),
        }
    }

    #[tokio::test]
    async fn renders_full_client_config() {
        let config = node_config();
        let ns = &config.namespace;
        let store = MemoryStore::with_params([
            (ns.user_private_key("user1"), "client-private".to_owned()),
            (ns.server_public_key(), "server-public\n".to_owned()),
        ]);

        let profile = ClientProfile::load(&store, &config, "user1", "vpn.example.com:51820".into())
            .await
            .unwrap();

        assert_eq!(
            profile.render(),
            "[Interface]\n\
             PrivateKey = client-private\n\
             Address = 10.77.0.110/32\n\
             DNS = 8.8.8.8, 8.8.4.4\n\
             \n\
             [Peer]\n\
             PublicKey = server-public\n\
             Endpoint = vpn.example.com:51820\n\
             AllowedIPs = 0.0.0.0/0\n\
             PersistentKeepalive = 25\n"
        );
    }

    #[tokio::test]
    async fn client_and_server_agree_on_address() {
        let config = node_config();
        let ns = &config.namespace;
        let store = MemoryStore::with_params([
            (ns.user_private_key("laptop-01"), "k".to_owned()),
            (ns.server_public_key(), "s".to_owned()),
        ]);

        let profile = ClientProfile::load(&store, &config, "laptop-01", "1.2.3.4:51820".into())
            .await
            .unwrap();
        assert_eq!(profile.address, config.tunnel.subnet.address_for("laptop-01"));
        assert_eq!(profile.address, Ipv4Addr::new(10, 77, 0, 154));
    }

    #[tokio::test]
    async fn unknown_client_is_not_found() {
        let config = node_config();
        let store = MemoryStore::new();
        let result = ClientProfile::load(&store, &config, "ghost", "h:1".into()).await;
        assert!(matches!(result, Err(CoreError::NotFound { .. })));
    }
}
