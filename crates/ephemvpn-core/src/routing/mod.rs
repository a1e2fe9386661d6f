//! Client-side routing control.
//!
//! A four-state machine (`Untouched → BackedUp → Captured → Restored`)
//! with pure transition planning in [`state`], host effects behind
//! [`RoutingBackend`], and a JSON [`RoutingSnapshot`] that lets a restore
//! run in a different process than the capture.

pub mod backend;
pub mod controller;
pub mod linux;
pub mod privilege;
pub mod probe;
pub mod route;
pub mod session;
pub mod snapshot;
pub mod state;

#[cfg(test)]
pub(crate) mod fake;

pub use backend::{HostDescription, RoutingBackend};
pub use controller::{CaptureOutcome, RestoreReport, RoutingController, StepFailure};
pub use linux::LinuxBackend;
pub use privilege::require_root;
pub use probe::{ProbeResult, probe_tcp};
pub use route::{Destination, RouteDescriptor};
pub use session::{ClientLaunch, SessionReport, run_session};
pub use snapshot::RoutingSnapshot;
pub use state::{HostAction, ObservedHost, RoutingState};
