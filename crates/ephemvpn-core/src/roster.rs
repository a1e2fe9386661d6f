// ── Peer roster reconciliation ──
//
// Rebuilds the set of authorized peers from the client records in the
// parameter store. Nothing is persisted: the roster is recomputed on
// every pass and handed to the tunnel engine as part of `TunnelConfig`.

use std::collections::{BTreeSet, HashMap};
use std::net::Ipv4Addr;

use chrono::{DateTime, NaiveDateTime, Utc};
use ephemvpn_store::ParameterStore;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::addressing::PeerSubnet;
use crate::error::CoreError;
use crate::model::{ClientStatus, Namespace, PeerAssignment, SkipReason, SkippedClient};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RosterReport {
    /// Active peers, ordered by client identifier.
    pub peers: Vec<PeerAssignment>,
    /// Clients present in the store but not active.
    pub inactive: Vec<String>,
    /// Active clients that could not be emitted.
    pub skipped: Vec<SkippedClient>,
}

/// An active client with a key, before an address is granted.
struct Candidate {
    client_id: String,
    public_key: String,
    created_at: Option<DateTime<Utc>>,
}

/// Accepts RFC 3339 and the zone-less ISO form the API writes (UTC).
fn parse_created_at(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").map(|t| t.and_utc())
        })
        .ok()
}

pub struct RosterReconciler<'a> {
    store: &'a dyn ParameterStore,
    namespace: &'a Namespace,
    subnet: PeerSubnet,
}

impl<'a> RosterReconciler<'a> {
    pub fn new(store: &'a dyn ParameterStore, namespace: &'a Namespace, subnet: PeerSubnet) -> Self {
        Self {
            store,
            namespace,
            subnet,
        }
    }

    /// Distinct client identifiers with at least one stored parameter.
    pub async fn client_ids(&self) -> Result<BTreeSet<String>, CoreError> {
        let names = self.store.list_names(&self.namespace.users_root()).await?;
        Ok(names
            .iter()
            .filter_map(|name| self.namespace.client_id_of(name))
            .map(str::to_owned)
            .collect())
    }

    /// Compute the peer roster.
    ///
    /// When two active clients reduce to the same address, the one
    /// provisioned first (by `created-at`) keeps it and the other is
    /// reported as skipped. Clients without a readable timestamp rank
    /// after those with one; ties fall back to identifier order.
    pub async fn reconcile(&self) -> Result<RosterReport, CoreError> {
        let ids = self.client_ids().await?;
        debug!(clients = ids.len(), "reconciling peer roster");

        let mut report = RosterReport::default();
        let mut candidates = Vec::new();

        for client_id in ids {
            let status = self
                .store
                .get_optional(&self.namespace.user_status(&client_id))
                .await?;
            if !ClientStatus::from_stored(status.as_deref()).is_active() {
                report.inactive.push(client_id);
                continue;
            }

            let Some(public_key) = self
                .store
                .get_optional(&self.namespace.user_public_key(&client_id))
                .await?
                .filter(|k| !k.trim().is_empty())
            else {
                warn!(%client_id, "active client has no public key, skipping");
                report.skipped.push(SkippedClient {
                    client_id,
                    reason: SkipReason::MissingPublicKey,
                });
                continue;
            };

            let created_at = self
                .store
                .get_optional(&self.namespace.user_created_at(&client_id))
                .await?
                .as_deref()
                .and_then(parse_created_at);
            candidates.push(Candidate {
                client_id,
                public_key: public_key.trim().to_owned(),
                created_at,
            });
        }

        // Stable sort: ids are already in order for equal keys.
        candidates.sort_by_key(|c| (c.created_at.is_none(), c.created_at));

        let mut taken: HashMap<Ipv4Addr, String> = HashMap::new();
        for Candidate {
            client_id,
            public_key,
            ..
        } in candidates
        {
            let address = self.subnet.address_for(&client_id);
            if let Some(owner) = taken.get(&address) {
                warn!(
                    %client_id,
                    %address,
                    owner = owner.as_str(),
                    "address collision, skipping client"
                );
                report.skipped.push(SkippedClient {
                    client_id,
                    reason: SkipReason::AddressCollision {
                        with: owner.clone(),
                    },
                });
                continue;
            }

            taken.insert(address, client_id.clone());
            report.peers.push(PeerAssignment {
                client_id,
                address,
                public_key,
            });
        }
        report.peers.sort_by(|a, b| a.client_id.cmp(&b.client_id));

        info!(
            peers = report.peers.len(),
            inactive = report.inactive.len(),
            skipped = report.skipped.len(),
            "peer roster reconciled"
        );
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ephemvpn_store::MemoryStore;
    use pretty_assertions::assert_eq;

    use super::*;

    fn client(ns: &Namespace, id: &str, status: Option<&str>, key: Option<&str>) -> Vec<(String, String)> {
        created(ns, id, "2024-01-01T00:00:00Z", status, key)
    }

    fn created(
        ns: &Namespace,
        id: &str,
        at: &str,
        status: Option<&str>,
        key: Option<&str>,
    ) -> Vec<(String, String)> {
        let mut params = vec![(ns.user_created_at(id), at.to_owned())];
        if let Some(status) = status {
            params.push((ns.user_status(id), status.to_owned()));
        }
        if let Some(key) = key {
            params.push((ns.user_public_key(id), key.to_owned()));
        }
        params
    }

    fn ids(report: &RosterReport) -> Vec<&str> {
        report.peers.iter().map(|p| p.client_id.as_str()).collect()
    }

    #[tokio::test]
    async fn only_active_clients_are_emitted() {
        let ns = Namespace::default();
        let mut params = client(&ns, "alice", Some("active"), Some("pk-alice"));
        params.extend(client(&ns, "bob", Some("inactive"), Some("pk-bob")));
        params.extend(client(&ns, "carol", Some("active"), Some("pk-carol")));
        params.extend(client(&ns, "dave", None, Some("pk-dave")));
        let store = MemoryStore::with_params(params);

        let report = RosterReconciler::new(&store, &ns, PeerSubnet::DEFAULT)
            .reconcile()
            .await
            .unwrap();

        assert_eq!(ids(&report), vec!["alice", "carol"]);
        assert_eq!(report.inactive, vec!["bob", "dave"]);
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn addresses_follow_the_shared_formula() {
        let ns = Namespace::default();
        let store = MemoryStore::with_params(client(&ns, "user1", Some("active"), Some("pk")));

        let report = RosterReconciler::new(&store, &ns, PeerSubnet::DEFAULT)
            .reconcile()
            .await
            .unwrap();

        assert_eq!(report.peers.len(), 1);
        assert_eq!(report.peers[0].allowed_ip(), "10.77.0.110/32");
        assert_eq!(report.peers[0].public_key, "pk");
    }

    #[tokio::test]
    async fn clients_without_key_are_skipped() {
        let ns = Namespace::default();
        let mut params = client(&ns, "alice", Some("active"), None);
        params.extend(client(&ns, "carol", Some("active"), Some("   ")));
        let store = MemoryStore::with_params(params);

        let report = RosterReconciler::new(&store, &ns, PeerSubnet::DEFAULT)
            .reconcile()
            .await
            .unwrap();

        assert!(report.peers.is_empty());
        assert_eq!(report.skipped.len(), 2);
        assert!(
            report
                .skipped
                .iter()
                .all(|s| s.reason == SkipReason::MissingPublicKey)
        );
    }

    #[tokio::test]
    async fn colliding_addresses_keep_the_earliest_client() {
        let ns = Namespace::default();
        // Both reduce to 10.77.0.91; peer-13 sorts first but was added later.
        let mut params = created(
            &ns,
            "peer-16",
            "2024-01-01T00:00:00Z",
            Some("active"),
            Some("pk-16"),
        );
        params.extend(created(
            &ns,
            "peer-13",
            "2024-03-01T09:30:00.123456",
            Some("active"),
            Some("pk-13"),
        ));
        let store = MemoryStore::with_params(params);

        let report = RosterReconciler::new(&store, &ns, PeerSubnet::DEFAULT)
            .reconcile()
            .await
            .unwrap();

        assert_eq!(ids(&report), vec!["peer-16"]);
        assert_eq!(report.peers[0].address, Ipv4Addr::new(10, 77, 0, 91));
        assert_eq!(
            report.skipped,
            vec![SkippedClient {
                client_id: "peer-13".into(),
                reason: SkipReason::AddressCollision {
                    with: "peer-16".into()
                },
            }]
        );
    }

    #[tokio::test]
    async fn collision_ties_fall_back_to_identifier_order() {
        let ns = Namespace::default();
        let mut params = client(&ns, "peer-16", Some("active"), Some("pk-16"));
        params.extend(client(&ns, "peer-13", Some("active"), Some("pk-13")));
        let store = MemoryStore::with_params(params);

        let report = RosterReconciler::new(&store, &ns, PeerSubnet::DEFAULT)
            .reconcile()
            .await
            .unwrap();

        assert_eq!(ids(&report), vec!["peer-13"]);
    }

    #[tokio::test]
    async fn timestamped_client_outranks_one_without() {
        let ns = Namespace::default();
        let mut params = created(
            &ns,
            "peer-16",
            "2025-06-01T00:00:00Z",
            Some("active"),
            Some("pk-16"),
        );
        params.extend(created(&ns, "peer-13", "not a date", Some("active"), Some("pk-13")));
        let store = MemoryStore::with_params(params);

        let report = RosterReconciler::new(&store, &ns, PeerSubnet::DEFAULT)
            .reconcile()
            .await
            .unwrap();

        assert_eq!(ids(&report), vec!["peer-16"]);
    }

    #[test]
    fn created_at_accepts_both_timestamp_forms() {
        assert!(parse_created_at("2024-01-01T00:00:00Z").is_some());
        assert!(parse_created_at("2024-01-01T00:00:00.123456").is_some());
        assert!(parse_created_at("2024-01-01T00:00:00+02:00").is_some());
        assert!(parse_created_at("yesterday").is_none());
    }

    #[tokio::test]
    async fn emitted_addresses_are_unique_and_in_subnet() {
        let ns = Namespace::default();
        let mut params = Vec::new();
        for i in 0..60 {
            params.extend(client(&ns, &format!("peer-{i}"), Some("active"), Some("pk")));
        }
        let store = MemoryStore::with_params(params);
        let subnet = PeerSubnet::DEFAULT;

        let report = RosterReconciler::new(&store, &ns, subnet)
            .reconcile()
            .await
            .unwrap();

        let unique: BTreeSet<_> = report.peers.iter().map(|p| p.address).collect();
        assert_eq!(unique.len(), report.peers.len());
        assert!(report.peers.iter().all(|p| subnet.contains(p.address)));
        assert_eq!(report.peers.len() + report.skipped.len(), 60);
    }

    #[tokio::test]
    async fn unavailable_store_propagates() {
        let ns = Namespace::default();
        let store = MemoryStore::new();
        store.set_unavailable(true);

        let result = RosterReconciler::new(&store, &ns, PeerSubnet::DEFAULT)
            .reconcile()
            .await;
        assert!(matches!(result, Err(CoreError::StoreUnavailable { .. })));
    }
}
