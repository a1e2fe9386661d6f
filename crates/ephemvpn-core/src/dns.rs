// ── DNS publication ──
//
// Best-effort: detect the node's public IPv4 address and upsert an `A`
// record for it. Every failure ends up in a `DnsOutcome`; nothing here
// can stop the node from starting.

use std::fmt;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use aws_sdk_route53::Client;
use aws_sdk_route53::error::DisplayErrorContext;
use aws_sdk_route53::types::{
    Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet, RrType,
};
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{DnsTarget, PublicIpConfig};
use crate::error::CoreError;

// ── Public address detection ────────────────────────────────────────

/// Where a detected address came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSource {
    Echo(String),
    InstanceMetadata,
    Override,
}

impl fmt::Display for AddressSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Echo(host) => write!(f, "echo service {host}"),
            Self::InstanceMetadata => f.write_str("instance metadata"),
            Self::Override => f.write_str("configured override"),
        }
    }
}

/// Extract an IPv4 address from an echo service response.
///
/// Accepts `{"ip": "..."}`, `{"origin": "a, b"}` (first entry wins), or a
/// bare dotted quad.
pub fn parse_echo_body(body: &str) -> Option<Ipv4Addr> {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(ip) = map.get("ip").and_then(serde_json::Value::as_str) {
            return ip.trim().parse().ok();
        }
        if let Some(origin) = map.get("origin").and_then(serde_json::Value::as_str) {
            return origin.split(',').next()?.trim().parse().ok();
        }
        return None;
    }
    body.trim().parse().ok()
}

pub struct PublicAddressResolver {
    http: reqwest::Client,
    config: PublicIpConfig,
}

impl PublicAddressResolver {
    pub fn new(config: PublicIpConfig) -> Result<Self, CoreError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("ephemvpn/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CoreError::Dns {
                message: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self { http, config })
    }

    /// Try echo services, then instance metadata, then the override.
    pub async fn resolve(&self) -> Option<(Ipv4Addr, AddressSource)> {
        for service in &self.config.echo_services {
            if let Some(ip) = self.fetch(service).await {
                let host = service.host_str().unwrap_or_default().to_owned();
                return Some((ip, AddressSource::Echo(host)));
            }
        }

        if let Some(ref metadata) = self.config.metadata_url {
            if let Some(ip) = self.fetch(metadata).await {
                return Some((ip, AddressSource::InstanceMetadata));
            }
        }

        self.config
            .override_ip
            .map(|ip| (ip, AddressSource::Override))
    }

    async fn fetch(&self, url: &Url) -> Option<Ipv4Addr> {
        debug!("querying {url} for public address");
        let response = match self.http.get(url.clone()).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                debug!(status = %resp.status(), "{url} answered with an error");
                return None;
            }
            Err(e) => {
                debug!(error = %e, "{url} unreachable");
                return None;
            }
        };
        let body = response.text().await.ok()?;
        let parsed = parse_echo_body(&body);
        if parsed.is_none() {
            debug!("{url} returned no usable address");
        }
        parsed
    }
}

// ── Record publication ──────────────────────────────────────────────

/// Something that can point a DNS name at an address.
#[async_trait]
pub trait DnsRecordPublisher: Send + Sync {
    async fn upsert_a(&self, target: &DnsTarget, address: Ipv4Addr) -> Result<(), CoreError>;
}

/// Route 53 record publisher.
#[derive(Debug, Clone)]
pub struct Route53Publisher {
    client: Client,
}

impl Route53Publisher {
    pub async fn connect(region: &str) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_owned()))
            .load()
            .await;
        Self {
            client: Client::new(&sdk_config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn build_error(e: impl fmt::Display) -> CoreError {
    CoreError::Dns {
        message: e.to_string(),
    }
}

#[async_trait]
impl DnsRecordPublisher for Route53Publisher {
    async fn upsert_a(&self, target: &DnsTarget, address: Ipv4Addr) -> Result<(), CoreError> {
        let record = ResourceRecord::builder()
            .value(address.to_string())
            .build()
            .map_err(build_error)?;
        let record_set = ResourceRecordSet::builder()
            .name(&target.name)
            .r#type(RrType::A)
            .ttl(target.ttl)
            .resource_records(record)
            .build()
            .map_err(build_error)?;
        let change = Change::builder()
            .action(ChangeAction::Upsert)
            .resource_record_set(record_set)
            .build()
            .map_err(build_error)?;
        let batch = ChangeBatch::builder()
            .comment("ephemvpn node startup")
            .changes(change)
            .build()
            .map_err(build_error)?;

        self.client
            .change_resource_record_sets()
            .hosted_zone_id(&target.hosted_zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(|e| CoreError::Dns {
                message: DisplayErrorContext(&e).to_string(),
            })?;
        Ok(())
    }
}

// ── Orchestration ───────────────────────────────────────────────────

/// Result of a publication attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DnsOutcome {
    Published {
        name: String,
        address: Ipv4Addr,
        source: AddressSource,
    },
    Skipped {
        reason: String,
    },
    Failed {
        reason: String,
    },
}

impl DnsOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }
}

impl fmt::Display for DnsOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Published {
                name,
                address,
                source,
            } => write!(f, "{name} -> {address} (via {source})"),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Detect the public address and publish it. Never fails.
pub async fn publish_node_address(
    resolver: &PublicAddressResolver,
    records: Option<&dyn DnsRecordPublisher>,
    target: Option<&DnsTarget>,
) -> DnsOutcome {
    let Some(target) = target else {
        debug!("no DNS name or hosted zone configured, skipping publication");
        return DnsOutcome::Skipped {
            reason: "DNS_NAME and HOSTED_ZONE_ID are not both set".into(),
        };
    };
    let Some(records) = records else {
        return DnsOutcome::Skipped {
            reason: "no record publisher available".into(),
        };
    };

    let Some((address, source)) = resolver.resolve().await else {
        warn!(name = %target.name, "could not determine public address, DNS not updated");
        return DnsOutcome::Failed {
            reason: "public address could not be determined".into(),
        };
    };

    match records.upsert_a(target, address).await {
        Ok(()) => {
            info!(name = %target.name, %address, %source, "DNS record published");
            DnsOutcome::Published {
                name: target.name.clone(),
                address,
                source,
            }
        }
        Err(e) => {
            warn!(name = %target.name, error = %e, "DNS publication failed");
            DnsOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn parses_echo_body_shapes() {
        let expected = Some(Ipv4Addr::new(203, 0, 113, 7));
        assert_eq!(parse_echo_body(r#"{"ip": "203.0.113.7"}"#), expected);
        assert_eq!(
            parse_echo_body(r#"{"origin": "203.0.113.7, 10.0.0.1"}"#),
            expected
        );
        assert_eq!(parse_echo_body("203.0.113.7\n"), expected);
        assert_eq!(parse_echo_body(r#"{"ip": "not-an-ip"}"#), None);
        assert_eq!(parse_echo_body(r#"{"country": "NL"}"#), None);
        assert_eq!(parse_echo_body("<html>"), None);
    }

    fn config(server: &MockServer, services: &[&str]) -> PublicIpConfig {
        PublicIpConfig {
            echo_services: services
                .iter()
                .map(|p| Url::parse(&format!("{}{p}", server.uri())).unwrap())
                .collect(),
            metadata_url: Some(Url::parse(&format!("{}/meta", server.uri())).unwrap()),
            override_ip: None,
            timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn falls_through_failing_services() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/first"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/second"))
            .respond_with(ResponseTemplate::new(200).set_body_string("garbage"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/third"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"origin": "198.51.100.4"}"#),
            )
            .mount(&server)
            .await;

        let resolver =
            PublicAddressResolver::new(config(&server, &["/first", "/second", "/third"])).unwrap();
        let (ip, source) = resolver.resolve().await.unwrap();
        assert_eq!(ip, Ipv4Addr::new(198, 51, 100, 4));
        assert!(matches!(source, AddressSource::Echo(_)));
    }

    #[tokio::test]
    async fn uses_metadata_then_override() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/meta"))
            .respond_with(ResponseTemplate::new(200).set_body_string("192.0.2.10"))
            .mount(&server)
            .await;

        let resolver = PublicAddressResolver::new(config(&server, &["/missing"])).unwrap();
        assert_eq!(
            resolver.resolve().await,
            Some((Ipv4Addr::new(192, 0, 2, 10), AddressSource::InstanceMetadata))
        );

        let mut cfg = config(&server, &["/missing"]);
        cfg.metadata_url = None;
        cfg.override_ip = Some(Ipv4Addr::new(192, 0, 2, 99));
        let resolver = PublicAddressResolver::new(cfg).unwrap();
        assert_eq!(
            resolver.resolve().await,
            Some((Ipv4Addr::new(192, 0, 2, 99), AddressSource::Override))
        );
    }

    #[derive(Default)]
    struct RecordingPublisher {
        calls: Mutex<Vec<(String, Ipv4Addr)>>,
        fail: bool,
    }

    #[async_trait]
    impl DnsRecordPublisher for RecordingPublisher {
        async fn upsert_a(&self, target: &DnsTarget, address: Ipv4Addr) -> Result<(), CoreError> {
            if self.fail {
                return Err(CoreError::Dns {
                    message: "zone not found".into(),
                });
            }
            self.calls
                .lock()
                .unwrap()
                .push((target.name.clone(), address));
            Ok(())
        }
    }

    fn target() -> DnsTarget {
        DnsTarget {
            name: "vpn.example.com".into(),
            hosted_zone_id: "Z123".into(),
            ttl: 60,
        }
    }

    #[tokio::test]
    async fn publishes_detected_address() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ip"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ip":"203.0.113.7"}"#))
            .mount(&server)
            .await;
        let resolver = PublicAddressResolver::new(config(&server, &["/ip"])).unwrap();
        let publisher = RecordingPublisher::default();

        let outcome = publish_node_address(&resolver, Some(&publisher), Some(&target())).await;

        assert!(outcome.is_published());
        assert_eq!(
            *publisher.calls.lock().unwrap(),
            vec![("vpn.example.com".to_owned(), Ipv4Addr::new(203, 0, 113, 7))]
        );
    }

    #[tokio::test]
    async fn failures_become_outcomes() {
        let server = MockServer::start().await;
        let mut cfg = config(&server, &["/nothing"]);
        cfg.metadata_url = None;
        let resolver = PublicAddressResolver::new(cfg).unwrap();
        let publisher = RecordingPublisher::default();

        let outcome = publish_node_address(&resolver, Some(&publisher), Some(&target())).await;
        assert!(matches!(outcome, DnsOutcome::Failed { .. }));

        let outcome = publish_node_address(&resolver, Some(&publisher), None).await;
        assert!(matches!(outcome, DnsOutcome::Skipped { .. }));

        let mut cfg = config(&server, &[]);
        cfg.metadata_url = None;
        cfg.override_ip = Some(Ipv4Addr::new(192, 0, 2, 1));
        let resolver = PublicAddressResolver::new(cfg).unwrap();
        let failing = RecordingPublisher {
            fail: true,
            ..Default::default()
        };
        let outcome = publish_node_address(&resolver, Some(&failing), Some(&target())).await;
        assert_eq!(
            outcome,
            DnsOutcome::Failed {
                reason: "DNS publication failed: zone not found".into()
            }
        );
    }
}
