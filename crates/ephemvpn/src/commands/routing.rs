//! Routing command handlers for the connecting host.

use std::time::Duration;

use serde::Serialize;
use tabled::Tabled;
use tracing::warn;

use ephemvpn_config::Settings;
use ephemvpn_core::routing::{
    CaptureOutcome, ClientLaunch, HostDescription, LinuxBackend, ProbeResult, RestoreReport,
    RouteDescriptor, RoutingSnapshot, SessionReport, StepFailure, probe_tcp, require_root,
    run_session,
};
use ephemvpn_core::{CoreError, RoutingController, RoutingState};

use crate::cli::{GlobalOpts, StartArgs, TestArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

async fn open(settings: &Settings) -> Result<RoutingController<LinuxBackend>, CliError> {
    let cfg = settings.routing_config()?;
    let backend = LinuxBackend::new(cfg.resolv_conf.clone());
    Ok(RoutingController::open(backend, cfg).await)
}

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct RouteRow {
    #[tabled(rename = "Destination")]
    destination: String,
    #[tabled(rename = "Gateway")]
    gateway: String,
    #[tabled(rename = "Device")]
    interface: String,
    #[tabled(rename = "Metric")]
    metric: String,
}

impl From<&RouteDescriptor> for RouteRow {
    fn from(r: &RouteDescriptor) -> Self {
        Self {
            destination: r.destination.to_string(),
            gateway: r.gateway.map_or_else(|| "-".into(), |g| g.to_string()),
            interface: r.interface.clone().unwrap_or_else(|| "-".into()),
            metric: r.metric.map_or_else(|| "-".into(), |m| m.to_string()),
        }
    }
}

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "Failed step")]
    step: String,
    #[tabled(rename = "Error")]
    error: String,
}

impl From<&StepFailure> for FailureRow {
    fn from(f: &StepFailure) -> Self {
        Self {
            step: f.step.clone(),
            error: f.error.clone(),
        }
    }
}

fn line_count(text: &str) -> String {
    let n = text.lines().filter(|l| !l.trim().is_empty()).count();
    format!("{n} line(s)")
}

fn snapshot_detail(snapshot: &RoutingSnapshot, path: &str) -> String {
    let mut out = output::detail_lines(&[
        ("Snapshot", path.to_owned()),
        ("Captured", snapshot.captured_at.to_rfc3339()),
        ("NAT rules", line_count(&snapshot.nat_rules)),
        ("DNS config", line_count(&snapshot.dns_config)),
    ]);
    if !snapshot.default_routes.is_empty() {
        let rows: Vec<RouteRow> = snapshot.default_routes.iter().map(RouteRow::from).collect();
        out.push_str("\n\n");
        out.push_str(&output::render_table(&rows));
    }
    out
}

fn restore_detail(report: &RestoreReport, color: bool) -> String {
    let status = if report.is_clean() {
        output::status("restored", true, color)
    } else {
        output::status("partially restored", false, color)
    };
    let mut out = output::detail_lines(&[
        ("Routing", status),
        ("Steps applied", report.applied.to_string()),
        ("Steps failed", report.failures.len().to_string()),
    ]);
    if !report.failures.is_empty() {
        let rows: Vec<FailureRow> = report.failures.iter().map(FailureRow::from).collect();
        out.push_str("\n\n");
        out.push_str(&output::render_table(&rows));
    }
    out
}

fn capture_label(outcome: CaptureOutcome) -> &'static str {
    match outcome {
        CaptureOutcome::Captured => "captured",
        CaptureOutcome::Deferred => "deferred",
    }
}

fn restore_result(report: &RestoreReport) -> Result<(), CliError> {
    if report.is_clean() {
        Ok(())
    } else {
        Err(CliError::RestoreIncomplete {
            failed: report.failures.len(),
        })
    }
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn backup(settings: &Settings, global: &GlobalOpts) -> Result<(), CliError> {
    require_root("backup")?;
    let mut controller = open(settings).await?;
    let snapshot = controller.backup().await?;
    let path = controller.config().snapshot_path.display().to_string();

    let out = output::render_single(
        &global.output,
        &snapshot,
        |s| snapshot_detail(s, &path),
        |_| path.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn restore(settings: &Settings, global: &GlobalOpts) -> Result<(), CliError> {
    require_root("restore")?;
    let mut controller = open(settings).await?;
    let report = match controller.restore().await {
        Ok(report) => report,
        Err(CoreError::MissingSnapshot { path }) => {
            warn!(path = %path.display(), "no routing snapshot, nothing to restore");
            return Err(CliError::MissingSnapshot {
                path: path.display().to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &report,
        |r| restore_detail(r, color),
        |r| r.applied.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    restore_result(&report)
}

pub async fn setup(settings: &Settings, global: &GlobalOpts) -> Result<(), CliError> {
    require_root("setup")?;
    let mut controller = open(settings).await?;
    let outcome = controller.capture().await?;

    let cfg = controller.config();
    let detail = match outcome {
        CaptureOutcome::Captured => format!("{} routed via {}", cfg.subnet, cfg.tunnel_interface),
        CaptureOutcome::Deferred => {
            format!("{} not present, routes unchanged", cfg.tunnel_interface)
        }
    };
    let out = output::render_single(
        &global.output,
        &outcome,
        |_| detail.clone(),
        |o| capture_label(*o).to_owned(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[derive(Serialize)]
struct ShowView {
    state: RoutingState,
    snapshot: Option<String>,
    #[serde(flatten)]
    host: HostDescription,
}

fn show_detail(view: &ShowView, color: bool) -> String {
    let section = |title: &str, body: &str| {
        let body = if body.trim().is_empty() { "(none)" } else { body.trim_end() };
        format!("{}\n{body}", output::dim(&format!("── {title} ──"), color))
    };
    [
        output::detail_lines(&[
            ("State", view.state.to_string()),
            (
                "Snapshot",
                view.snapshot.clone().unwrap_or_else(|| "none".into()),
            ),
        ]),
        section("Routes", &view.host.routes),
        section("NAT", &view.host.nat_rules),
        section("Interfaces", &view.host.interfaces),
    ]
    .join("\n\n")
}

pub async fn show(settings: &Settings, global: &GlobalOpts) -> Result<(), CliError> {
    let controller = open(settings).await?;
    let host = controller.describe().await?;
    let state = controller.state();
    let snapshot = (state == RoutingState::BackedUp)
        .then(|| controller.config().snapshot_path.display().to_string());

    let view = ShowView {
        state,
        snapshot,
        host,
    };
    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &view,
        |v| show_detail(v, color),
        |v| v.state.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn probe_detail(result: &ProbeResult, color: bool) -> String {
    let verdict = if result.reachable {
        output::status("reachable", true, color)
    } else {
        output::status("unreachable", false, color)
    };
    let mut line = format!(
        "{}:{} {verdict} {}",
        result.host,
        result.port,
        output::dim(&format!("({} ms)", result.elapsed_ms), color)
    );
    if let Some(ref error) = result.error {
        line.push_str(&format!(": {error}"));
    }
    line
}

pub async fn test(
    args: TestArgs,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let limit = match args.timeout {
        Some(secs) => Duration::from_secs(secs),
        None => settings.routing_config()?.probe_timeout,
    };
    let result = probe_tcp(&args.host, args.port, limit).await;

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &result,
        |r| probe_detail(r, color),
        |r| r.reachable.to_string(),
    )?;
    output::print_output(&out, global.quiet);

    if result.reachable {
        Ok(())
    } else {
        Err(CliError::Unreachable {
            host: result.host,
            port: result.port,
        })
    }
}

fn session_detail(report: &SessionReport, color: bool) -> String {
    let exit = report
        .client_exit
        .map_or_else(|| "killed by signal".to_owned(), |c| c.to_string());
    let mut out = output::detail_lines(&[
        ("Capture", capture_label(report.capture).to_owned()),
        ("Client exit", exit),
        ("Interrupts", report.interrupts.to_string()),
    ]);
    out.push('\n');
    out.push_str(&restore_detail(&report.restore, color));
    out
}

pub async fn start(
    args: StartArgs,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    require_root("start")?;
    let credential = config::resolve_credential(settings, args.api_key.as_deref())?;
    if credential.is_none() {
        warn!("no API credential available, starting the client without one");
    }

    let mut controller = open(settings).await?;
    let launch = ClientLaunch::for_endpoint(
        controller.config().client_command.clone(),
        &args.host,
        args.port,
        credential,
    );
    let report = run_session(&mut controller, &launch).await?;

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &report,
        |r| session_detail(r, color),
        |r| r.client_exit.unwrap_or(-1).to_string(),
    )?;
    output::print_output(&out, global.quiet);

    restore_result(&report.restore)?;
    match report.client_exit {
        Some(code) if code != 0 => Err(CliError::ChildFailed {
            program: launch.program,
            code,
        }),
        _ => Ok(()),
    }
}
