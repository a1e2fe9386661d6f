//! Settings for the ephemvpn node and client.
//!
//! Layered with figment: built-in defaults, then an optional TOML file,
//! then the plain environment names the node has always used
//! (`SSM_PREFIX`, `DNS_NAME`, ...), then `EPHEMVPN_`-prefixed variables.
//! [`Settings`] translates into the runtime configs `ephemvpn-core`
//! consumes.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ephemvpn_core::routing::Destination;
use ephemvpn_core::{
    DnsSettings, Namespace, NodeConfig, PeerSubnet, PublicIpConfig, RoutingConfig, TunnelSettings,
};
use ephemvpn_store::SsmConfig;

/// Environment variables read without a prefix.
pub const PLAIN_ENV_KEYS: &[&str] = &[
    "SSM_PREFIX",
    "AWS_REGION",
    "API_PORT",
    "WG_LISTEN_PORT",
    "WG_MTU",
    "ROUTE_CIDR",
    "DNS_NAME",
    "HOSTED_ZONE_ID",
    "VPN_PUBLIC_IP",
];

pub const ENV_PREFIX: &str = "EPHEMVPN_";

const KEYRING_SERVICE: &str = "ephemvpn";
const KEYRING_USER: &str = "api-key";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no API credential configured")]
    NoCredentials,

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.to_string(),
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// Every tunable, flat so each maps to one environment variable.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    // Parameter store
    pub ssm_prefix: String,
    pub aws_region: String,
    pub ssm_endpoint: Option<String>,

    // API hand-off
    pub api_port: u16,
    pub api_command: Option<String>,

    // Tunnel engine
    pub wg_listen_port: u16,
    pub wg_mtu: Option<u16>,
    pub wg_interface: String,
    pub wg_config_dir: PathBuf,
    pub egress_interface: Option<String>,
    pub peer_subnet: String,
    pub route_cidr: String,
    pub client_dns: Vec<String>,

    // DNS publication
    pub dns_name: Option<String>,
    pub hosted_zone_id: Option<String>,
    pub dns_ttl: i64,
    pub vpn_public_ip: Option<String>,
    pub ip_detect_timeout_secs: u64,

    // Client-side routing
    pub tunnel_interface: String,
    pub snapshot_path: PathBuf,
    pub resolv_conf: PathBuf,
    pub client_command: String,
    pub probe_timeout_secs: u64,

    /// API credential (plaintext; prefer the keyring).
    pub api_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let routing = RoutingConfig::default();
        let tunnel = TunnelSettings::default();
        Self {
            ssm_prefix: ephemvpn_core::model::namespace::DEFAULT_PREFIX.into(),
            aws_region: "us-east-1".into(),
            ssm_endpoint: None,
            api_port: ephemvpn_core::config::DEFAULT_API_PORT,
            api_command: None,
            wg_listen_port: tunnel.listen_port,
            wg_mtu: None,
            wg_interface: tunnel.interface,
            wg_config_dir: tunnel.config_dir,
            egress_interface: None,
            peer_subnet: PeerSubnet::DEFAULT.to_string(),
            route_cidr: "0.0.0.0/0".into(),
            client_dns: vec!["8.8.8.8".into(), "8.8.4.4".into()],
            dns_name: None,
            hosted_zone_id: None,
            dns_ttl: ephemvpn_core::config::DEFAULT_DNS_TTL,
            vpn_public_ip: None,
            ip_detect_timeout_secs: 5,
            tunnel_interface: routing.tunnel_interface,
            snapshot_path: routing.snapshot_path,
            resolv_conf: routing.resolv_conf,
            client_command: routing.client_command,
            probe_timeout_secs: routing.probe_timeout.as_secs(),
            api_key: None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Settings {
    /// Blank environment values mean "unset".
    fn normalized(mut self) -> Self {
        self.ssm_endpoint = non_empty(self.ssm_endpoint);
        self.api_command = non_empty(self.api_command);
        self.egress_interface = non_empty(self.egress_interface);
        self.dns_name = non_empty(self.dns_name);
        self.hosted_zone_id = non_empty(self.hosted_zone_id);
        self.vpn_public_ip = non_empty(self.vpn_public_ip);
        self.api_key = non_empty(self.api_key);
        self
    }

    // ── Translation into runtime configs ────────────────────────────

    pub fn ssm_config(&self) -> Result<SsmConfig, ConfigError> {
        let endpoint = self
            .ssm_endpoint
            .as_deref()
            .map(url::Url::parse)
            .transpose()
            .map_err(|e| invalid("ssm_endpoint", e))?;
        Ok(SsmConfig {
            region: self.aws_region.clone(),
            endpoint,
        })
    }

    pub fn peer_subnet(&self) -> Result<PeerSubnet, ConfigError> {
        self.peer_subnet
            .parse()
            .map_err(|e| invalid("peer_subnet", e))
    }

    pub fn node_config(&self) -> Result<NodeConfig, ConfigError> {
        let client_dns = self
            .client_dns
            .iter()
            .map(|s| s.trim().parse::<Ipv4Addr>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid("client_dns", e))?;
        let override_ip = self
            .vpn_public_ip
            .as_deref()
            .map(|s| s.trim().parse::<Ipv4Addr>())
            .transpose()
            .map_err(|e| invalid("vpn_public_ip", e))?;
        match self.route_cidr.trim().parse::<Destination>() {
            Ok(Destination::Prefix(ref p)) if p.contains('/') => {}
            Ok(_) => {
                return Err(invalid(
                    "route_cidr",
                    format!("'{}' is not a CIDR", self.route_cidr),
                ));
            }
            Err(e) => return Err(invalid("route_cidr", e)),
        }

        Ok(NodeConfig {
            namespace: Namespace::new(&self.ssm_prefix),
            region: self.aws_region.clone(),
            api_port: self.api_port,
            tunnel: TunnelSettings {
                interface: self.wg_interface.clone(),
                listen_port: self.wg_listen_port,
                mtu: self.wg_mtu,
                config_dir: self.wg_config_dir.clone(),
                egress_interface: self.egress_interface.clone(),
                subnet: self.peer_subnet()?,
            },
            dns: DnsSettings {
                name: self.dns_name.clone(),
                hosted_zone_id: self.hosted_zone_id.clone(),
                ttl: Some(self.dns_ttl),
            },
            public_ip: PublicIpConfig {
                override_ip,
                timeout: Duration::from_secs(self.ip_detect_timeout_secs),
                ..PublicIpConfig::default()
            },
            client_dns,
            route_cidr: self.route_cidr.clone(),
        })
    }

    pub fn routing_config(&self) -> Result<RoutingConfig, ConfigError> {
        Ok(RoutingConfig {
            tunnel_interface: self.tunnel_interface.clone(),
            subnet: self.peer_subnet()?,
            snapshot_path: self.snapshot_path.clone(),
            resolv_conf: self.resolv_conf.clone(),
            client_command: self.client_command.clone(),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
        })
    }

    // ── Credential resolution ───────────────────────────────────────

    /// API credential: explicit value, then settings/environment, then
    /// the system keyring.
    pub fn resolve_api_key(&self, explicit: Option<&str>) -> Result<SecretString, ConfigError> {
        if let Some(key) = explicit.filter(|k| !k.is_empty()) {
            return Ok(SecretString::from(key.to_owned()));
        }
        if let Some(ref key) = self.api_key {
            return Ok(SecretString::from(key.clone()));
        }
        if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER) {
            if let Ok(secret) = entry.get_password() {
                return Ok(SecretString::from(secret));
            }
        }
        Err(ConfigError::NoCredentials)
    }
}

/// Store the API credential in the system keyring.
pub fn store_api_key(secret: &SecretString) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
    entry.set_password(secret.expose_secret())?;
    Ok(())
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "ephemvpn", "ephemvpn").map_or_else(
        || PathBuf::from("/etc/ephemvpn/config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Loading & saving ────────────────────────────────────────────────

/// The provider stack, exposed so callers can add their own layers.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(path))
        .merge(Env::raw().only(PLAIN_ENV_KEYS))
        .merge(Env::prefixed(ENV_PREFIX))
}

/// Load settings from `path` (or the default location) plus environment.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let settings: Settings = figment(&path).extract()?;
    Ok(settings.normalized())
}

/// Write settings as TOML, creating parent directories.
pub fn save_settings(settings: &Settings, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(settings)?)?;
    Ok(())
}
