// ── Tunnel engine hand-off ──
//
// The tunnel itself is an external, unmodified engine. This module owns
// the explicit configuration object the engine is driven from and the
// one implementation that applies it (`wg-quick`).

use std::fmt::Write as _;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::addressing::PeerSubnet;
use crate::config::TunnelSettings;
use crate::error::CoreError;
use crate::model::{Identity, PeerAssignment};

/// Full configuration for the node side of the tunnel.
#[derive(Debug, Clone, Serialize)]
pub struct TunnelConfig {
    pub interface: String,
    pub listen_port: u16,
    pub mtu: Option<u16>,
    #[serde(skip)]
    pub private_key: SecretString,
    pub address: Ipv4Addr,
    pub subnet: PeerSubnet,
    pub peers: Vec<PeerAssignment>,
    pub egress_interface: Option<String>,
}

impl TunnelConfig {
    pub fn new(settings: &TunnelSettings, identity: &Identity, peers: Vec<PeerAssignment>) -> Self {
        Self {
            interface: settings.interface.clone(),
            listen_port: settings.listen_port,
            mtu: settings.mtu,
            private_key: identity.private_key.clone(),
            address: settings.subnet.server_address(),
            subnet: settings.subnet,
            peers,
            egress_interface: settings.egress_interface.clone(),
        }
    }

    fn nat_rules(&self) -> Option<(String, String)> {
        let egress = self.egress_interface.as_deref()?;
        let rules = |op: &str| {
            format!(
                "iptables -t nat {op} POSTROUTING -s {} -o {egress} -j MASQUERADE; \
                 iptables {op} FORWARD -i {} -j ACCEPT",
                self.subnet, self.interface
            )
        };
        Some((rules("-A"), rules("-D")))
    }

    fn render_with(&self, private_key: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "[Interface]");
        let _ = writeln!(out, "PrivateKey = {private_key}");
        let _ = writeln!(
            out,
            "Address = {}/{}",
            self.address,
            self.subnet.prefix_len()
        );
        let _ = writeln!(out, "ListenPort = {}", self.listen_port);
        if let Some(mtu) = self.mtu {
            let _ = writeln!(out, "MTU = {mtu}");
        }
        if let Some((up, down)) = self.nat_rules() {
            let _ = writeln!(out, "PostUp = {up}");
            let _ = writeln!(out, "PostDown = {down}");
        }
        for peer in &self.peers {
            let _ = writeln!(out);
            let _ = writeln!(out, "# {}", peer.client_id);
            let _ = writeln!(out, "[Peer]");
            let _ = writeln!(out, "PublicKey = {}", peer.public_key);
            let _ = writeln!(out, "AllowedIPs = {}", peer.allowed_ip());
        }
        out
    }

    /// The `wg-quick` file contents, including the private key.
    pub fn render(&self) -> String {
        self.render_with(self.private_key.expose_secret())
    }

    /// Same as [`render`](Self::render) with the private key masked.
    pub fn render_redacted(&self) -> String {
        self.render_with("(redacted)")
    }
}

/// Applies a [`TunnelConfig`] to the host.
#[async_trait]
pub trait TunnelEngine: Send + Sync {
    async fn apply(&self, config: &TunnelConfig) -> Result<(), CoreError>;
}

/// Drives the kernel WireGuard interface through `wg-quick`.
#[derive(Debug, Clone)]
pub struct WgQuickEngine {
    config_dir: PathBuf,
}

impl WgQuickEngine {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_path(&self, interface: &str) -> PathBuf {
        self.config_dir.join(format!("{interface}.conf"))
    }

    async fn write_config(&self, path: &Path, contents: &str) -> Result<(), CoreError> {
        tokio::fs::create_dir_all(&self.config_dir).await?;
        tokio::fs::write(path, contents).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        Ok(())
    }
}

async fn wg_quick(action: &str, target: &Path) -> Result<std::process::Output, CoreError> {
    Command::new("wg-quick")
        .arg(action)
        .arg(target)
        .output()
        .await
        .map_err(|e| CoreError::command("wg-quick", e.to_string()))
}

#[async_trait]
impl TunnelEngine for WgQuickEngine {
    async fn apply(&self, config: &TunnelConfig) -> Result<(), CoreError> {
        let path = self.config_path(&config.interface);
        self.write_config(&path, &config.render()).await?;
        debug!(path = %path.display(), peers = config.peers.len(), "wrote tunnel config");

        // An interface that is not up yet makes `down` fail; that is fine.
        let down = wg_quick("down", &path).await?;
        if !down.status.success() {
            debug!(
                stderr = %String::from_utf8_lossy(&down.stderr).trim(),
                "wg-quick down reported an error, continuing"
            );
        }

        let up = wg_quick("up", &path).await?;
        if !up.status.success() {
            return Err(CoreError::command(
                "wg-quick",
                String::from_utf8_lossy(&up.stderr).trim().to_owned(),
            ));
        }

        info!(interface = %config.interface, peers = config.peers.len(), "tunnel interface up");
        Ok(())
    }
}
