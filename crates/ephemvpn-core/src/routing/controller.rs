// ── Routing controller ──
//
// Drives the pure state machine against a backend and the snapshot
// file. Capture is strict: the first failed action aborts it. Restore is
// best-effort: every action is attempted and failures are collected.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::backend::{HostDescription, RoutingBackend};
use super::snapshot::RoutingSnapshot;
use super::state::{RoutingState, plan_backup, plan_capture, plan_restore};
use crate::config::RoutingConfig;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureOutcome {
    Captured,
    /// The tunnel device does not exist yet; nothing was changed.
    Deferred,
}

/// One restore step that did not succeed.
#[derive(Debug, Clone, Serialize)]
pub struct StepFailure {
    pub step: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RestoreReport {
    pub applied: usize,
    pub failures: Vec<StepFailure>,
}

impl RestoreReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct RoutingController<B> {
    backend: B,
    config: RoutingConfig,
    state: RoutingState,
}

impl<B: RoutingBackend> RoutingController<B> {
    /// A controller for a fresh process: `BackedUp` when a snapshot file
    /// is already on disk, `Untouched` otherwise.
    pub async fn open(backend: B, config: RoutingConfig) -> Self {
        let state = if RoutingSnapshot::exists(&config.snapshot_path).await {
            RoutingState::BackedUp
        } else {
            RoutingState::Untouched
        };
        Self::with_state(backend, config, state)
    }

    pub fn with_state(backend: B, config: RoutingConfig, state: RoutingState) -> Self {
        Self {
            backend,
            config,
            state,
        }
    }

    pub fn state(&self) -> RoutingState {
        self.state
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Record current default routes, NAT rules and resolver config.
    /// Overwrites any existing snapshot.
    pub async fn backup(&mut self) -> Result<RoutingSnapshot, CoreError> {
        let observed = self
            .backend
            .observe(&self.config.tunnel_interface, self.config.subnet)
            .await?;
        let (next, snapshot) = plan_backup(self.state, &observed, Utc::now())?;
        snapshot.save(&self.config.snapshot_path).await?;

        info!(
            from = %self.state,
            to = %next,
            routes = snapshot.default_routes.len(),
            path = %self.config.snapshot_path.display(),
            "routing state backed up"
        );
        self.state = next;
        Ok(snapshot)
    }

    /// Route the peer subnet through the tunnel device.
    pub async fn capture(&mut self) -> Result<CaptureOutcome, CoreError> {
        if self.state == RoutingState::Untouched {
            warn!("capturing without a backup, restore will have nothing to go back to");
        }
        let tunnel = self.config.tunnel_interface.clone();
        let observed = self.backend.observe(&tunnel, self.config.subnet).await?;
        let transition = plan_capture(self.state, &observed, &tunnel, self.config.subnet)?;

        if !observed.tunnel_present {
            info!(interface = %tunnel, "tunnel device not present, capture deferred");
            return Ok(CaptureOutcome::Deferred);
        }

        for action in &transition.actions {
            self.backend.apply(action).await?;
            info!(%action, "applied");
        }
        info!(from = %self.state, to = %transition.next, "routing captured");
        self.state = transition.next;
        Ok(CaptureOutcome::Captured)
    }

    /// Return the host to its recorded state.
    ///
    /// A missing snapshot is an error the caller can report softly. The
    /// snapshot is removed after a clean pass and kept when any step
    /// failed so the restore can be retried.
    pub async fn restore(&mut self) -> Result<RestoreReport, CoreError> {
        let path = self.config.snapshot_path.clone();
        let snapshot = RoutingSnapshot::load(&path).await?;
        let tunnel = self.config.tunnel_interface.clone();
        let observed = self.backend.observe(&tunnel, self.config.subnet).await?;
        let transition = plan_restore(&observed, &snapshot, &tunnel, self.config.subnet);

        let mut report = RestoreReport::default();
        for action in &transition.actions {
            match self.backend.apply(action).await {
                Ok(()) => {
                    report.applied += 1;
                    info!(%action, "applied");
                }
                Err(e) => {
                    warn!(%action, error = %e, "restore step failed, continuing");
                    report.failures.push(StepFailure {
                        step: action.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.is_clean() {
            RoutingSnapshot::discard(&path).await?;
        } else {
            warn!(
                failures = report.failures.len(),
                path = %path.display(),
                "restore incomplete, keeping snapshot"
            );
        }
        info!(from = %self.state, to = %transition.next, "routing restored");
        self.state = transition.next;
        Ok(report)
    }

    pub async fn describe(&self) -> Result<HostDescription, CoreError> {
        self.backend.describe().await
    }
}
