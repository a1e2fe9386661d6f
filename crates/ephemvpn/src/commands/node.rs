//! Node command handlers: the server-side startup pass and its pieces.

use serde::Serialize;
use tabled::Tabled;
use tokio::process::Command;
use tracing::info;

use ephemvpn_config::Settings;
use ephemvpn_core::dns::publish_node_address;
use ephemvpn_core::routing::require_root;
use ephemvpn_core::{
    DnsOutcome, IdentityBootstrapper, NodeConfig, NodeReport, Orchestrator, PeerAssignment,
    PublicAddressResolver, Route53Publisher, RosterReconciler, SkippedClient, WgQuickEngine,
    api_environment,
};
use ephemvpn_store::{MemoryStore, ParameterStore};

use crate::cli::{GlobalOpts, NodeArgs, NodeCommand, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::connect_store;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct PeerRow {
    #[tabled(rename = "Client")]
    client_id: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Public key")]
    public_key: String,
}

impl From<&PeerAssignment> for PeerRow {
    fn from(p: &PeerAssignment) -> Self {
        Self {
            client_id: p.client_id.clone(),
            address: p.allowed_ip(),
            public_key: p.public_key.clone(),
        }
    }
}

#[derive(Tabled)]
struct SkippedRow {
    #[tabled(rename = "Skipped client")]
    client_id: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

impl From<&SkippedClient> for SkippedRow {
    fn from(s: &SkippedClient) -> Self {
        Self {
            client_id: s.client_id.clone(),
            reason: s.reason.to_string(),
        }
    }
}

#[derive(Serialize)]
struct IdentityView {
    public_key: String,
    created_at: Option<String>,
    algorithm: Option<String>,
    purpose: Option<String>,
}

#[derive(Serialize)]
struct CredentialView {
    parameter: String,
    saved_to_keyring: bool,
}

// ── Detail renderers ────────────────────────────────────────────────

fn peers_table(peers: &[PeerAssignment], skipped: &[SkippedClient]) -> String {
    let mut out = String::new();
    if !peers.is_empty() {
        let rows: Vec<PeerRow> = peers.iter().map(PeerRow::from).collect();
        out.push_str(&output::render_table(&rows));
    }
    if !skipped.is_empty() {
        let rows: Vec<SkippedRow> = skipped.iter().map(SkippedRow::from).collect();
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&output::render_table(&rows));
    }
    out
}

fn report_detail(report: &NodeReport) -> String {
    let tunnel = if report.tunnel_applied {
        format!("applied to {}", report.tunnel.interface)
    } else {
        "dry run, not applied".to_owned()
    };
    let summary = output::detail_lines(&[
        ("Public key", report.public_key.clone()),
        (
            "Peers",
            format!(
                "{} active, {} inactive, {} skipped",
                report.peers.len(),
                report.inactive.len(),
                report.skipped.len()
            ),
        ),
        ("DNS", report.dns.to_string()),
        ("Tunnel", tunnel),
    ]);

    let table = peers_table(&report.peers, &report.skipped);
    let mut out = summary;
    if !table.is_empty() {
        out.push_str("\n\n");
        out.push_str(&table);
    }
    if !report.tunnel_applied {
        out.push_str("\n\n");
        out.push_str(&report.tunnel.render_redacted());
    }
    out
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    args: NodeArgs,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let node = settings.node_config()?;
    let offline = args.offline;

    match args.command {
        NodeCommand::Up {
            dry_run,
            api_command,
        } => {
            if !dry_run {
                require_root("node up")?;
            }
            let api_command = api_command.or_else(|| settings.api_command.clone());
            let store = open_store(settings, offline).await?;
            up(&*store, &node, global, dry_run, api_command.as_deref()).await
        }

        NodeCommand::Identity => {
            let store = open_store(settings, offline).await?;
            let identity = IdentityBootstrapper::new(&*store, &node.namespace)
                .ensure_identity()
                .await?;
            let meta = identity.metadata.as_ref();
            let view = IdentityView {
                public_key: identity.public_key.clone(),
                created_at: meta.map(|m| m.created_at.to_rfc3339()),
                algorithm: meta.map(|m| m.algorithm.clone()),
                purpose: meta.map(|m| m.purpose.clone()),
            };
            let out = output::render_single(
                &global.output,
                &view,
                |v| {
                    output::detail_lines(&[
                        ("Public key", v.public_key.clone()),
                        ("Created", v.created_at.clone().unwrap_or_else(|| "-".into())),
                        ("Algorithm", v.algorithm.clone().unwrap_or_else(|| "-".into())),
                        ("Purpose", v.purpose.clone().unwrap_or_else(|| "-".into())),
                    ])
                },
                |v| v.public_key.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        NodeCommand::Credential { save_to_keyring } => {
            let store = open_store(settings, offline).await?;
            let secret = IdentityBootstrapper::new(&*store, &node.namespace)
                .ensure_api_credential()
                .await?;
            if save_to_keyring {
                config::store_api_key(&secret)?;
            }
            let view = CredentialView {
                parameter: node.namespace.master_api_key(),
                saved_to_keyring: save_to_keyring,
            };
            let out = output::render_single(
                &global.output,
                &view,
                |v| {
                    let saved = if v.saved_to_keyring { "yes" } else { "no" };
                    output::detail_lines(&[
                        ("Parameter", v.parameter.clone()),
                        ("In keyring", saved.to_owned()),
                    ])
                },
                |v| v.parameter.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        NodeCommand::Peers => {
            let store = open_store(settings, offline).await?;
            let report = RosterReconciler::new(&*store, &node.namespace, node.tunnel.subnet)
                .reconcile()
                .await?;
            let out = match global.output {
                OutputFormat::Table => peers_table(&report.peers, &report.skipped),
                _ => output::render_list(
                    &global.output,
                    &report.peers,
                    |p| PeerRow::from(p),
                    |p| p.client_id.clone(),
                )?,
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        NodeCommand::PublishDns => {
            let outcome = publish_dns(&node).await?;
            let out = output::render_single(
                &global.output,
                &outcome,
                ToString::to_string,
                ToString::to_string,
            )?;
            output::print_output(&out, global.quiet);
            match outcome {
                DnsOutcome::Failed { reason } => Err(CliError::DnsFailed { reason }),
                _ => Ok(()),
            }
        }
    }
}

async fn publish_dns(node: &NodeConfig) -> Result<DnsOutcome, CliError> {
    let resolver = PublicAddressResolver::new(node.public_ip.clone())?;
    let target = node.dns.target();
    let publisher = match target {
        Some(_) => Some(Route53Publisher::connect(&node.region).await),
        None => None,
    };
    let records = publisher
        .as_ref()
        .map(|p| p as &dyn ephemvpn_core::DnsRecordPublisher);
    Ok(publish_node_address(&resolver, records, target.as_ref()).await)
}

/// SSM, or an empty in-memory store for `--offline`.
async fn open_store(
    settings: &Settings,
    offline: bool,
) -> Result<Box<dyn ParameterStore>, CliError> {
    if offline {
        info!("offline: using an empty in-memory parameter store");
        return Ok(Box::new(MemoryStore::new()));
    }
    Ok(Box::new(connect_store(settings).await?))
}

async fn up(
    store: &dyn ParameterStore,
    node: &NodeConfig,
    global: &GlobalOpts,
    dry_run: bool,
    api_command: Option<&str>,
) -> Result<(), CliError> {
    let resolver = PublicAddressResolver::new(node.public_ip.clone())?;
    let publisher = match node.dns.target() {
        Some(_) => Some(Route53Publisher::connect(&node.region).await),
        None => None,
    };
    let engine = WgQuickEngine::new(node.tunnel.config_dir.clone());

    let mut orchestrator = Orchestrator::new(store, node, &resolver);
    if let Some(ref publisher) = publisher {
        orchestrator = orchestrator.with_dns(publisher);
    }
    if !dry_run {
        orchestrator = orchestrator.with_engine(&engine);
    }
    let report = orchestrator.run().await?;

    let out = output::render_single(&global.output, &report, report_detail, |r| {
        r.public_key.clone()
    })?;
    output::print_output(&out, global.quiet);

    match api_command {
        Some(command) if dry_run => {
            info!(command, "dry run, API process not started");
            Ok(())
        }
        Some(command) => hand_off(command, node).await,
        None => Ok(()),
    }
}

/// Run the peer-management API in the foreground with the node's settings.
async fn hand_off(command: &str, node: &NodeConfig) -> Result<(), CliError> {
    let mut parts = command.split_whitespace();
    let Some(program) = parts.next() else {
        return Err(CliError::Validation {
            field: "api_command".into(),
            reason: "command is empty".into(),
        });
    };

    info!(program, "starting API process");
    let status = Command::new(program)
        .args(parts)
        .envs(api_environment(node))
        .status()
        .await
        .map_err(|e| CliError::Operation {
            message: format!("failed to start {program}: {e}"),
        })?;

    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(CliError::ChildFailed {
            program: program.to_owned(),
            code,
        }),
        None => Err(CliError::Operation {
            message: format!("{program} was terminated by a signal"),
        }),
    }
}
