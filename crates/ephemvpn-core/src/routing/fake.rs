// In-memory host used by the routing tests.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::backend::{HostDescription, RoutingBackend};
use super::route::RouteDescriptor;
use super::state::{HostAction, ObservedHost};
use crate::error::CoreError;

#[derive(Debug, Default)]
struct Host {
    routes: Vec<RouteDescriptor>,
    nat_rules: String,
    dns_config: String,
    links: BTreeSet<String>,
    applied: Vec<HostAction>,
    failing: Vec<HostAction>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeBackend {
    host: Arc<Mutex<Host>>,
}

#[allow(clippy::unwrap_used)]
impl FakeBackend {
    pub(crate) fn new(defaults: Vec<RouteDescriptor>, nat_rules: &str, dns_config: &str) -> Self {
        Self {
            host: Arc::new(Mutex::new(Host {
                routes: defaults,
                nat_rules: nat_rules.to_owned(),
                dns_config: dns_config.to_owned(),
                ..Host::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Host> {
        self.host.lock().unwrap()
    }

    pub(crate) fn add_link(&self, name: &str) {
        self.lock().links.insert(name.to_owned());
    }

    pub(crate) fn link_up(&self, name: &str) -> bool {
        self.lock().links.contains(name)
    }

    pub(crate) fn push_default(&self, route: RouteDescriptor) {
        self.lock().routes.push(route);
    }

    pub(crate) fn set_dns(&self, text: &str) {
        text.clone_into(&mut self.lock().dns_config);
    }

    pub(crate) fn has_route(&self, route: &RouteDescriptor) -> bool {
        self.lock().routes.contains(route)
    }

    pub(crate) fn fail_on(&self, action: HostAction) {
        self.lock().failing.push(action);
    }

    pub(crate) fn applied(&self) -> Vec<HostAction> {
        self.lock().applied.clone()
    }

    pub(crate) fn host(&self) -> ObservedHost {
        let host = self.lock();
        ObservedHost {
            default_routes: host.routes.iter().filter(|r| r.is_default()).cloned().collect(),
            nat_rules: host.nat_rules.clone(),
            dns_config: host.dns_config.clone(),
            tunnel_present: false,
            subnet_routed: false,
        }
    }
}

#[async_trait]
impl RoutingBackend for FakeBackend {
    async fn default_routes(&self) -> Result<Vec<RouteDescriptor>, CoreError> {
        Ok(self.host().default_routes)
    }

    async fn nat_rules(&self) -> Result<String, CoreError> {
        Ok(self.lock().nat_rules.clone())
    }

    async fn dns_config(&self) -> Result<String, CoreError> {
        Ok(self.lock().dns_config.clone())
    }

    async fn link_exists(&self, interface: &str) -> Result<bool, CoreError> {
        Ok(self.link_up(interface))
    }

    async fn route_exists(&self, route: &RouteDescriptor) -> Result<bool, CoreError> {
        Ok(self.has_route(route))
    }

    async fn apply(&self, action: &HostAction) -> Result<(), CoreError> {
        let mut host = self.lock();
        if host.failing.contains(action) {
            return Err(CoreError::command("fake", format!("refused: {action}")));
        }
        match action {
            HostAction::DeleteRoute(route) => {
                if !host.routes.contains(route) {
                    return Err(CoreError::command(
                        "fake",
                        "RTNETLINK answers: No such process",
                    ));
                }
                host.routes.retain(|r| r != route);
            }
            HostAction::AddRoute(route) => {
                if !host.routes.contains(route) {
                    host.routes.push(route.clone());
                }
            }
            HostAction::LinkDown(dev) => {
                host.links.remove(dev);
            }
            HostAction::WriteDnsConfig(text) => text.clone_into(&mut host.dns_config),
            HostAction::RestoreNatRules(rules) => rules.clone_into(&mut host.nat_rules),
        }
        host.applied.push(action.clone());
        Ok(())
    }

    async fn describe(&self) -> Result<HostDescription, CoreError> {
        let host = self.lock();
        Ok(HostDescription {
            routes: host
                .routes
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n"),
            nat_rules: host.nat_rules.clone(),
            interfaces: host.links.iter().cloned().collect::<Vec<_>>().join("\n"),
        })
    }
}
