// ── Routing state machine ──
//
// Pure transition planning. Each `plan_*` function looks at the current
// state and what was observed on the host and returns the next state
// plus the host actions that realize it. Nothing here touches the host.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;

use super::route::RouteDescriptor;
use super::snapshot::RoutingSnapshot;
use crate::addressing::PeerSubnet;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RoutingState {
    Untouched,
    BackedUp,
    Captured,
    Restored,
}

/// A single mutation of host networking state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "target", rename_all = "snake_case")]
pub enum HostAction {
    DeleteRoute(RouteDescriptor),
    AddRoute(RouteDescriptor),
    LinkDown(String),
    WriteDnsConfig(String),
    RestoreNatRules(String),
}

impl std::fmt::Display for HostAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeleteRoute(r) => write!(f, "delete route {r}"),
            Self::AddRoute(r) => write!(f, "add route {r}"),
            Self::LinkDown(dev) => write!(f, "set {dev} down"),
            Self::WriteDnsConfig(_) => f.write_str("rewrite resolver configuration"),
            Self::RestoreNatRules(_) => f.write_str("restore NAT rules"),
        }
    }
}

/// What the backend saw on the host right before a transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedHost {
    pub default_routes: Vec<RouteDescriptor>,
    pub nat_rules: String,
    pub dns_config: String,
    pub tunnel_present: bool,
    /// The peer subnet is already routed through the tunnel device.
    pub subnet_routed: bool,
}

/// A planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: RoutingState,
    pub actions: Vec<HostAction>,
}

fn invalid(state: RoutingState, operation: &'static str) -> CoreError {
    CoreError::InvalidTransition {
        state: state.to_string(),
        operation,
    }
}

/// Record the host's pre-capture state.
///
/// Backing up a captured host would record the tunnel's routes as the
/// ones to restore, so that is refused.
pub fn plan_backup(
    state: RoutingState,
    observed: &ObservedHost,
    now: DateTime<Utc>,
) -> Result<(RoutingState, RoutingSnapshot), CoreError> {
    if state == RoutingState::Captured {
        return Err(invalid(state, "back up"));
    }
    let snapshot = RoutingSnapshot {
        default_routes: observed.default_routes.clone(),
        nat_rules: observed.nat_rules.clone(),
        dns_config: observed.dns_config.clone(),
        captured_at: now,
    };
    Ok((RoutingState::BackedUp, snapshot))
}

/// Steer traffic through the tunnel device.
///
/// When the device does not exist yet the transition is a no-op: the
/// state stays where it was and no actions are produced.
pub fn plan_capture(
    state: RoutingState,
    observed: &ObservedHost,
    tunnel: &str,
    subnet: PeerSubnet,
) -> Result<Transition, CoreError> {
    if state == RoutingState::Captured {
        return Err(invalid(state, "capture"));
    }
    if !observed.tunnel_present {
        return Ok(Transition {
            next: state,
            actions: Vec::new(),
        });
    }

    let mut actions: Vec<HostAction> = observed
        .default_routes
        .iter()
        .filter(|r| r.uses_interface(tunnel))
        .cloned()
        .map(HostAction::DeleteRoute)
        .collect();
    if !observed.subnet_routed {
        actions.push(HostAction::AddRoute(RouteDescriptor::subnet_route(
            subnet, tunnel,
        )));
    }

    Ok(Transition {
        next: RoutingState::Captured,
        actions,
    })
}

/// Put the host back the way the snapshot describes it.
///
/// The subnet route is only removed when it was seen on the host.
pub fn plan_restore(
    observed: &ObservedHost,
    snapshot: &RoutingSnapshot,
    tunnel: &str,
    subnet: PeerSubnet,
) -> Transition {
    let mut actions: Vec<HostAction> = observed
        .default_routes
        .iter()
        .cloned()
        .map(HostAction::DeleteRoute)
        .collect();
    actions.extend(
        snapshot
            .default_routes
            .iter()
            .cloned()
            .map(HostAction::AddRoute),
    );

    if observed.subnet_routed {
        actions.push(HostAction::DeleteRoute(RouteDescriptor::subnet_route(
            subnet, tunnel,
        )));
    }
    if observed.tunnel_present {
        actions.push(HostAction::LinkDown(tunnel.to_owned()));
    }
    if observed.dns_config != snapshot.dns_config {
        actions.push(HostAction::WriteDnsConfig(snapshot.dns_config.clone()));
    }
    if observed.nat_rules != snapshot.nat_rules {
        actions.push(HostAction::RestoreNatRules(snapshot.nat_rules.clone()));
    }

    Transition {
        next: RoutingState::Restored,
        actions,
    }
}
