//! Startup reconciliation and routing control for an ephemeral VPN node.
//!
//! The tunnel engine itself is external; this crate decides what it runs
//! with and keeps the connecting host's routing recoverable:
//!
//! - **[`IdentityBootstrapper`]**: get-or-create for the node keypair and
//!   the administrative API credential in the parameter store.
//! - **[`RosterReconciler`]**: rebuilds the authorized peer set from
//!   client records, assigning each peer a stable address via
//!   [`PeerSubnet::address_for`].
//! - **[`dns`]**: best-effort public address detection and `A` record
//!   publication.
//! - **[`TunnelConfig`] / [`TunnelEngine`]**: the explicit configuration
//!   handed to the engine, and the `wg-quick` implementation.
//! - **[`Orchestrator`]**: sequences one node startup pass.
//! - **[`routing`]**: the client-side backup/capture/restore state
//!   machine, its Linux backend, and the full-tunnel session.

pub mod addressing;
pub mod client_config;
pub mod config;
pub mod dns;
pub mod engine;
pub mod error;
pub mod identity;
pub mod model;
pub mod orchestrator;
pub mod roster;
pub mod routing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use addressing::PeerSubnet;
pub use client_config::ClientProfile;
pub use config::{DnsSettings, DnsTarget, NodeConfig, PublicIpConfig, RoutingConfig, TunnelSettings};
pub use dns::{DnsOutcome, DnsRecordPublisher, PublicAddressResolver, Route53Publisher};
pub use engine::{TunnelConfig, TunnelEngine, WgQuickEngine};
pub use error::CoreError;
pub use identity::IdentityBootstrapper;
pub use model::{ClientStatus, Identity, KeyMetadata, Namespace, PeerAssignment, SkippedClient};
pub use orchestrator::{NodeReport, Orchestrator, api_environment};
pub use roster::{RosterReconciler, RosterReport};
pub use routing::{RoutingController, RoutingState};
