// ── Runtime configuration ──
//
// Plain data handed to the orchestrator and routing controller. Loading
// and layering live in `ephemvpn-config`; these types never read the
// environment themselves.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::addressing::PeerSubnet;
use crate::model::Namespace;

pub const DEFAULT_LISTEN_PORT: u16 = 51820;
pub const DEFAULT_API_PORT: u16 = 8000;
pub const DEFAULT_DNS_TTL: i64 = 60;
pub const DEFAULT_KEEPALIVE: u16 = 25;

/// Echo services queried, in order, for the node's public address.
pub const DEFAULT_ECHO_SERVICES: &[&str] = &[
    "https://api.ipify.org?format=json",
    "https://httpbin.org/ip",
    "https://ipapi.co/json/",
    "https://api.myip.com",
];

pub const DEFAULT_METADATA_URL: &str = "http://169.254.169.254/latest/meta-data/public-ipv4";

/// Everything the node-side orchestrator needs for one startup pass.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub namespace: Namespace,
    pub region: String,
    pub api_port: u16,
    pub tunnel: TunnelSettings,
    pub dns: DnsSettings,
    pub public_ip: PublicIpConfig,
    /// DNS servers written into rendered client configs.
    pub client_dns: Vec<Ipv4Addr>,
    /// CIDR advertised to clients as their allowed IPs.
    pub route_cidr: String,
}

impl NodeConfig {
    /// Endpoint clients dial: the DNS name when one is configured.
    pub fn static_endpoint(&self) -> Option<String> {
        self.dns
            .name
            .as_ref()
            .map(|name| format!("{name}:{}", self.tunnel.listen_port))
    }
}

/// Tunnel engine parameters.
#[derive(Debug, Clone)]
pub struct TunnelSettings {
    pub interface: String,
    pub listen_port: u16,
    pub mtu: Option<u16>,
    pub config_dir: PathBuf,
    /// Interface NAT masquerade rules are attached to, if any.
    pub egress_interface: Option<String>,
    pub subnet: PeerSubnet,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            interface: "wg0".into(),
            listen_port: DEFAULT_LISTEN_PORT,
            mtu: None,
            config_dir: PathBuf::from("/etc/wireguard"),
            egress_interface: None,
            subnet: PeerSubnet::DEFAULT,
        }
    }
}

/// DNS publication settings. Publication only happens when both the
/// record name and the hosted zone are known.
#[derive(Debug, Clone, Default)]
pub struct DnsSettings {
    pub name: Option<String>,
    pub hosted_zone_id: Option<String>,
    pub ttl: Option<i64>,
}

impl DnsSettings {
    pub fn target(&self) -> Option<DnsTarget> {
        Some(DnsTarget {
            name: self.name.clone()?,
            hosted_zone_id: self.hosted_zone_id.clone()?,
            ttl: self.ttl.unwrap_or(DEFAULT_DNS_TTL),
        })
    }
}

/// A fully specified `A` record to upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsTarget {
    pub name: String,
    pub hosted_zone_id: String,
    pub ttl: i64,
}

/// Sources for public address detection.
#[derive(Debug, Clone)]
pub struct PublicIpConfig {
    pub echo_services: Vec<Url>,
    pub metadata_url: Option<Url>,
    pub override_ip: Option<Ipv4Addr>,
    pub timeout: Duration,
}

impl Default for PublicIpConfig {
    fn default() -> Self {
        Self {
            echo_services: DEFAULT_ECHO_SERVICES
                .iter()
                .filter_map(|s| Url::parse(s).ok())
                .collect(),
            metadata_url: Url::parse(DEFAULT_METADATA_URL).ok(),
            override_ip: None,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Client-side routing controller settings.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub tunnel_interface: String,
    pub subnet: PeerSubnet,
    pub snapshot_path: PathBuf,
    pub resolv_conf: PathBuf,
    /// Foreground VPN client launched by `start`.
    pub client_command: String,
    pub probe_timeout: Duration,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            tunnel_interface: "wg0".into(),
            subnet: PeerSubnet::DEFAULT,
            snapshot_path: PathBuf::from("/var/lib/ephemvpn/routing-snapshot.json"),
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
            client_command: "ephemvpn-client".into(),
            probe_timeout: Duration::from_secs(5),
        }
    }
}
