// ── Linux backend ──
//
// `ip` for routes and links, `iptables-save`/`iptables-restore` for the
// NAT table, and a plain file for the resolver configuration. Commands
// are always spawned with an argument vector.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::backend::{HostDescription, RoutingBackend};
use super::route::{RouteDescriptor, parse_routes};
use super::state::HostAction;
use crate::error::CoreError;

#[derive(Debug, Clone)]
pub struct LinuxBackend {
    resolv_conf: PathBuf,
}

impl LinuxBackend {
    pub fn new(resolv_conf: impl Into<PathBuf>) -> Self {
        Self {
            resolv_conf: resolv_conf.into(),
        }
    }
}

/// Run a command and return its stdout; non-zero exit is an error.
async fn run<S: AsRef<str>>(program: &str, args: &[S]) -> Result<String, CoreError> {
    run_tolerating(program, args, None).await
}

/// Like [`run`], but a failure whose stderr contains `benign` counts as
/// success.
async fn run_tolerating<S: AsRef<str>>(
    program: &str,
    args: &[S],
    benign: Option<&str>,
) -> Result<String, CoreError> {
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    debug!(program, ?args, "running");
    let output = Command::new(program)
        .args(&args)
        .output()
        .await
        .map_err(|e| CoreError::command(program, e.to_string()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if benign.is_some_and(|b| stderr.contains(b)) {
            debug!(program, ?args, stderr = %stderr.trim(), "already in the wanted state");
            return Ok(String::new());
        }
        return Err(CoreError::command(
            program,
            format!("{} ({})", stderr.trim(), output.status),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `ip` stderr meaning the action had nothing left to do.
fn already_done(action: &HostAction) -> Option<&'static str> {
    match action {
        HostAction::DeleteRoute(_) => Some("No such process"),
        HostAction::LinkDown(_) => Some("Cannot find device"),
        _ => None,
    }
}

/// Like [`run`], but a missing binary yields `None`.
async fn run_optional(program: &str, args: &[&str]) -> Result<Option<String>, CoreError> {
    match Command::new(program).args(args).output().await {
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(program, "not installed, treating its state as empty");
            Ok(None)
        }
        Err(e) => Err(CoreError::command(program, e.to_string())),
        Ok(output) if output.status.success() => {
            Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
        }
        Ok(output) => Err(CoreError::command(
            program,
            String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        )),
    }
}

async fn restore_nat(rules: &str) -> Result<(), CoreError> {
    let mut child = Command::new("iptables-restore")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CoreError::command("iptables-restore", e.to_string()))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(rules.as_bytes()).await?;
    }
    let output = child.wait_with_output().await?;
    if !output.status.success() {
        return Err(CoreError::command(
            "iptables-restore",
            String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        ));
    }
    Ok(())
}

#[async_trait]
impl RoutingBackend for LinuxBackend {
    async fn default_routes(&self) -> Result<Vec<RouteDescriptor>, CoreError> {
        let out = run("ip", &["route", "show", "default"]).await?;
        parse_routes(&out)
    }

    async fn nat_rules(&self) -> Result<String, CoreError> {
        Ok(run_optional("iptables-save", &["-t", "nat"])
            .await?
            .unwrap_or_default())
    }

    async fn dns_config(&self) -> Result<String, CoreError> {
        match tokio::fs::read_to_string(&self.resolv_conf).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %self.resolv_conf.display(), "no resolver configuration");
                Ok(String::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn link_exists(&self, interface: &str) -> Result<bool, CoreError> {
        let status = Command::new("ip")
            .args(["link", "show", "dev", interface])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| CoreError::command("ip", e.to_string()))?;
        Ok(status.success())
    }

    async fn route_exists(&self, route: &RouteDescriptor) -> Result<bool, CoreError> {
        let out = run("ip", route.show_args().as_slice()).await?;
        Ok(!out.trim().is_empty())
    }

    async fn apply(&self, action: &HostAction) -> Result<(), CoreError> {
        match action {
            HostAction::DeleteRoute(route) => {
                run_tolerating("ip", route.delete_args().as_slice(), already_done(action))
                    .await
                    .map(drop)
            }
            HostAction::AddRoute(route) => run("ip", route.add_args().as_slice()).await.map(drop),
            HostAction::LinkDown(dev) => run_tolerating(
                "ip",
                &["link", "set", "dev", dev.as_str(), "down"],
                already_done(action),
            )
            .await
            .map(drop),
            HostAction::WriteDnsConfig(text) => {
                tokio::fs::write(&self.resolv_conf, text).await?;
                Ok(())
            }
            HostAction::RestoreNatRules(rules) if rules.trim().is_empty() => {
                debug!("snapshot has no NAT rules, nothing to restore");
                Ok(())
            }
            HostAction::RestoreNatRules(rules) => restore_nat(rules).await,
        }
    }

    async fn describe(&self) -> Result<HostDescription, CoreError> {
        Ok(HostDescription {
            routes: run("ip", &["route", "show"]).await?,
            nat_rules: run_optional("iptables", &["-t", "nat", "-S"])
                .await?
                .unwrap_or_default(),
            interfaces: run("ip", &["-brief", "address", "show"]).await?,
        })
    }
}
