// ── Full-tunnel session ──
//
// backup → capture → foreground client → restore. Interrupts that
// arrive while the client runs are absorbed so the restore still runs
// once the client exits. A hard kill of this process skips the restore
// and leaves the host captured.

use std::process::ExitStatus;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::process::Command;
use tracing::{info, warn};

use super::backend::RoutingBackend;
use super::controller::{CaptureOutcome, RestoreReport, RoutingController};
use crate::error::CoreError;

/// Environment variable carrying the API credential to the client.
pub const CREDENTIAL_ENV: &str = "EPHEMVPN_API_KEY";

/// How to launch the foreground VPN client.
#[derive(Debug, Clone)]
pub struct ClientLaunch {
    pub program: String,
    pub args: Vec<String>,
    pub credential: Option<SecretString>,
}

impl ClientLaunch {
    /// `program host port`, with the credential passed through the
    /// environment rather than the command line.
    pub fn for_endpoint(
        program: impl Into<String>,
        host: &str,
        port: u16,
        credential: Option<SecretString>,
    ) -> Self {
        Self {
            program: program.into(),
            args: vec![host.to_owned(), port.to_string()],
            credential,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref credential) = self.credential {
            cmd.env(CREDENTIAL_ENV, credential.expose_secret());
        }
        cmd
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub capture: CaptureOutcome,
    /// Client exit code; `None` when it was killed by a signal.
    pub client_exit: Option<i32>,
    pub interrupts: u32,
    pub restore: RestoreReport,
}

async fn wait_absorbing_interrupts(
    child: &mut tokio::process::Child,
) -> Result<(ExitStatus, u32), CoreError> {
    let mut interrupts = 0;
    loop {
        tokio::select! {
            status = child.wait() => return Ok((status?, interrupts)),
            signal = tokio::signal::ctrl_c() => {
                signal?;
                interrupts += 1;
                info!("interrupt received, waiting for the VPN client to exit before restoring routes");
            }
        }
    }
}

/// Run a complete session. Routes are restored whenever capture was
/// attempted, including when the capture or the client launch fails.
pub async fn run_session<B: RoutingBackend>(
    controller: &mut RoutingController<B>,
    launch: &ClientLaunch,
) -> Result<SessionReport, CoreError> {
    controller.backup().await?;

    let capture = match controller.capture().await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(error = %e, "capture failed, restoring");
            restore_quietly(controller).await;
            return Err(e);
        }
    };

    info!(program = %launch.program, args = ?launch.args, "starting VPN client");
    let mut child = match launch.command().spawn() {
        Ok(child) => child,
        Err(e) => {
            restore_quietly(controller).await;
            return Err(CoreError::command(&launch.program, e.to_string()));
        }
    };

    let waited = wait_absorbing_interrupts(&mut child).await;
    let restore = controller.restore().await?;
    let (status, interrupts) = waited?;
    info!(%status, "VPN client exited");

    Ok(SessionReport {
        capture,
        client_exit: status.code(),
        interrupts,
        restore,
    })
}

async fn restore_quietly<B: RoutingBackend>(controller: &mut RoutingController<B>) {
    if let Err(e) = controller.restore().await {
        warn!(error = %e, "restore after failed session start did not complete");
    }
}
