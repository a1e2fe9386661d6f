// ── Host backend seam ──

use async_trait::async_trait;
use serde::Serialize;

use super::route::RouteDescriptor;
use super::state::{HostAction, ObservedHost};
use crate::addressing::PeerSubnet;
use crate::error::CoreError;

/// Human-readable dump of the host's networking state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HostDescription {
    pub routes: String,
    pub nat_rules: String,
    pub interfaces: String,
}

/// Reads and mutates host routing state on behalf of the controller.
#[async_trait]
pub trait RoutingBackend: Send + Sync {
    async fn default_routes(&self) -> Result<Vec<RouteDescriptor>, CoreError>;

    /// NAT table dump; empty when the host has no packet filter tooling.
    async fn nat_rules(&self) -> Result<String, CoreError>;

    /// Resolver configuration; empty when there is none.
    async fn dns_config(&self) -> Result<String, CoreError>;

    async fn link_exists(&self, interface: &str) -> Result<bool, CoreError>;

    /// Whether this exact route is installed.
    async fn route_exists(&self, route: &RouteDescriptor) -> Result<bool, CoreError>;

    async fn apply(&self, action: &HostAction) -> Result<(), CoreError>;

    async fn describe(&self) -> Result<HostDescription, CoreError>;

    /// Everything a transition needs to look at, in one call.
    async fn observe(&self, tunnel: &str, subnet: PeerSubnet) -> Result<ObservedHost, CoreError> {
        let tunnel_present = self.link_exists(tunnel).await?;
        let subnet_routed = tunnel_present
            && self
                .route_exists(&RouteDescriptor::subnet_route(subnet, tunnel))
                .await?;
        Ok(ObservedHost {
            default_routes: self.default_routes().await?,
            nat_rules: self.nat_rules().await?,
            dns_config: self.dns_config().await?,
            tunnel_present,
            subnet_routed,
        })
    }
}
