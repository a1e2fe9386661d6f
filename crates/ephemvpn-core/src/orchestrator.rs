// ── Node startup orchestration ──
//
// identity → credential → roster → DNS (best effort) → tunnel config →
// engine. Store outages abort the pass; DNS problems never do.

use ephemvpn_store::ParameterStore;
use serde::Serialize;
use tracing::info;

use crate::config::NodeConfig;
use crate::dns::{DnsOutcome, DnsRecordPublisher, PublicAddressResolver, publish_node_address};
use crate::engine::{TunnelConfig, TunnelEngine};
use crate::error::CoreError;
use crate::identity::IdentityBootstrapper;
use crate::model::{PeerAssignment, SkippedClient};
use crate::roster::RosterReconciler;

/// What one startup pass did.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub public_key: String,
    pub peers: Vec<PeerAssignment>,
    pub inactive: Vec<String>,
    pub skipped: Vec<SkippedClient>,
    pub dns: DnsOutcome,
    /// `false` on dry runs.
    pub tunnel_applied: bool,
    #[serde(skip)]
    pub tunnel: TunnelConfig,
}

pub struct Orchestrator<'a> {
    store: &'a dyn ParameterStore,
    config: &'a NodeConfig,
    resolver: &'a PublicAddressResolver,
    records: Option<&'a dyn DnsRecordPublisher>,
    engine: Option<&'a dyn TunnelEngine>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        store: &'a dyn ParameterStore,
        config: &'a NodeConfig,
        resolver: &'a PublicAddressResolver,
    ) -> Self {
        Self {
            store,
            config,
            resolver,
            records: None,
            engine: None,
        }
    }

    #[must_use]
    pub fn with_dns(mut self, records: &'a dyn DnsRecordPublisher) -> Self {
        self.records = Some(records);
        self
    }

    /// Without an engine the pass stops after building the tunnel config.
    #[must_use]
    pub fn with_engine(mut self, engine: &'a dyn TunnelEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub async fn run(&self) -> Result<NodeReport, CoreError> {
        let ns = &self.config.namespace;
        info!(prefix = ns.prefix(), "node startup");

        let bootstrap = IdentityBootstrapper::new(self.store, ns);
        let identity = bootstrap.ensure_identity().await?;
        bootstrap.ensure_api_credential().await?;

        let roster = RosterReconciler::new(self.store, ns, self.config.tunnel.subnet)
            .reconcile()
            .await?;

        let target = self.config.dns.target();
        let dns = publish_node_address(self.resolver, self.records, target.as_ref()).await;

        let tunnel = TunnelConfig::new(&self.config.tunnel, &identity, roster.peers.clone());
        let tunnel_applied = match self.engine {
            Some(engine) => {
                engine.apply(&tunnel).await?;
                true
            }
            None => {
                info!("dry run, tunnel engine not invoked");
                false
            }
        };

        Ok(NodeReport {
            public_key: identity.public_key,
            peers: roster.peers,
            inactive: roster.inactive,
            skipped: roster.skipped,
            dns,
            tunnel_applied,
            tunnel,
        })
    }
}

/// Environment handed to the peer-management API process.
pub fn api_environment(config: &NodeConfig) -> Vec<(&'static str, String)> {
    let mut env = vec![
        ("SSM_PREFIX", config.namespace.prefix().to_owned()),
        ("AWS_REGION", config.region.clone()),
        ("API_PORT", config.api_port.to_string()),
        ("WG_LISTEN_PORT", config.tunnel.listen_port.to_string()),
    ];
    if let Some(ref name) = config.dns.name {
        env.push(("DNS_NAME", name.clone()));
    }
    env
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use ephemvpn_store::MemoryStore;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::{DnsSettings, PublicIpConfig, TunnelSettings};
    use crate::model::Namespace;

    fn config() -> NodeConfig {
        NodeConfig {
            namespace: Namespace::default(),
            region: "eu-west-1".into(),
            api_port: 8000,
            tunnel: TunnelSettings::default(),
            dns: DnsSettings::default(),
            public_ip: PublicIpConfig {
                echo_services: Vec::new(),
                metadata_url: None,
                override_ip: Some(Ipv4Addr::new(203, 0, 113, 9)),
                ..PublicIpConfig::default()
            },
            client_dns: Vec::new(),
            route_cidr: "0.0.0.0/0".into(),
        }
    }

    #[derive(Default)]
    struct CapturingEngine {
        applied: Mutex<Vec<TunnelConfig>>,
    }

    #[async_trait]
    impl TunnelEngine for CapturingEngine {
        async fn apply(&self, config: &TunnelConfig) -> Result<(), CoreError> {
            self.applied.lock().unwrap().push(config.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn first_boot_provisions_and_applies() {
        let config = config();
        let ns = &config.namespace;
        let store = MemoryStore::with_params([
            (ns.user_status("alice"), "active"),
            (ns.user_public_key("alice"), "pk-alice"),
            (ns.user_status("bob"), "inactive"),
            (ns.user_public_key("bob"), "pk-bob"),
        ]);
        let resolver = PublicAddressResolver::new(config.public_ip.clone()).unwrap();
        let engine = CapturingEngine::default();

        let report = Orchestrator::new(&store, &config, &resolver)
            .with_engine(&engine)
            .run()
            .await
            .unwrap();

        assert!(report.tunnel_applied);
        assert_eq!(report.peers.len(), 1);
        assert_eq!(report.inactive, vec!["bob"]);
        assert!(matches!(report.dns, DnsOutcome::Skipped { .. }));
        assert!(store.get(&ns.master_api_key()).await.is_ok());

        let applied = engine.applied.lock().unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].peers, report.peers);
        assert_eq!(applied[0].address, Ipv4Addr::new(10, 77, 0, 1));
    }

    #[tokio::test]
    async fn dry_run_skips_engine() {
        let config = config();
        let store = MemoryStore::new();
        let resolver = PublicAddressResolver::new(config.public_ip.clone()).unwrap();

        let report = Orchestrator::new(&store, &config, &resolver)
            .run()
            .await
            .unwrap();
        assert!(!report.tunnel_applied);
        assert!(report.peers.is_empty());
    }

    #[tokio::test]
    async fn store_outage_aborts_startup() {
        let config = config();
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let resolver = PublicAddressResolver::new(config.public_ip.clone()).unwrap();
        let engine = CapturingEngine::default();

        let result = Orchestrator::new(&store, &config, &resolver)
            .with_engine(&engine)
            .run()
            .await;
        assert!(matches!(result, Err(CoreError::StoreUnavailable { .. })));
        assert!(engine.applied.lock().unwrap().is_empty());
    }

    #[test]
    fn api_environment_carries_node_settings() {
        let mut config = config();
        config.dns.name = Some("vpn.example.com".into());
        let env = api_environment(&config);
        assert_eq!(
            env,
            vec![
                ("SSM_PREFIX", "/ephem-vpn".to_owned()),
                ("AWS_REGION", "eu-west-1".to_owned()),
                ("API_PORT", "8000".to_owned()),
                ("WG_LISTEN_PORT", "51820".to_owned()),
                ("DNS_NAME", "vpn.example.com".to_owned()),
            ]
        );
    }
}
