#![allow(clippy::unwrap_used)]
// Integration tests for `SsmStore` against a wiremock stand-in for the
// SSM JSON protocol.

use aws_sdk_ssm::config::retry::RetryConfig;
use aws_sdk_ssm::config::{BehaviorVersion, Credentials, Region};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ephemvpn_store::{Confidentiality, Error, ParameterStore, PutOutcome, SsmStore};

// ── Helpers ─────────────────────────────────────────────────────────

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

async fn setup() -> (MockServer, SsmStore) {
    let server = MockServer::start().await;
    let config = aws_sdk_ssm::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(Credentials::new("AKIDTEST", "secret", None, None, "test"))
        .retry_config(RetryConfig::disabled())
        .endpoint_url(server.uri())
        .build();
    let store = SsmStore::from_client(aws_sdk_ssm::Client::from_conf(config));
    (server, store)
}

fn target(operation: &str) -> String {
    format!("AmazonSSM.{operation}")
}

fn ok_json(body: &serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", CONTENT_TYPE)
        .set_body_string(body.to_string())
}

fn service_error(status: u16, kind: &str) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .insert_header("content-type", CONTENT_TYPE)
        .set_body_string(json!({ "__type": kind, "message": kind }).to_string())
}

// ── GetParameter ────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_parameter() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .and(header("x-amz-target", target("GetParameter").as_str()))
        .and(body_partial_json(json!({
            "Name": "/ephem-vpn/master-api-key",
            "WithDecryption": true
        })))
        .respond_with(ok_json(&json!({
            "Parameter": {
                "Name": "/ephem-vpn/master-api-key",
                "Type": "SecureString",
                "Value": "s3cret",
                "Version": 1
            }
        })))
        .mount(&server)
        .await;

    let value = store.get("/ephem-vpn/master-api-key").await.unwrap();
    assert_eq!(value, "s3cret");
}

#[tokio::test]
async fn test_get_missing_parameter_is_not_found() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .and(header("x-amz-target", target("GetParameter").as_str()))
        .respond_with(service_error(400, "ParameterNotFound"))
        .mount(&server)
        .await;

    let result = store.get("/ephem-vpn/wg/server-private-key").await;
    assert!(
        matches!(result, Err(Error::NotFound { .. })),
        "expected NotFound, got: {result:?}"
    );
}

#[tokio::test]
async fn test_server_error_is_unavailable() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .and(header("x-amz-target", target("GetParameter").as_str()))
        .respond_with(service_error(500, "InternalServerError"))
        .mount(&server)
        .await;

    let result = store.get("/ephem-vpn/wg/server-private-key").await;
    assert!(
        matches!(result, Err(Error::Unavailable { .. })),
        "expected Unavailable, got: {result:?}"
    );
}

// ── PutParameter ────────────────────────────────────────────────────

#[tokio::test]
async fn test_put_secret_overwrites() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .and(header("x-amz-target", target("PutParameter").as_str()))
        .and(body_partial_json(json!({
            "Name": "/ephem-vpn/master-api-key",
            "Type": "SecureString",
            "Overwrite": true
        })))
        .respond_with(ok_json(&json!({ "Version": 2, "Tier": "Standard" })))
        .expect(1)
        .mount(&server)
        .await;

    store
        .put("/ephem-vpn/master-api-key", "token", Confidentiality::Secret)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_put_if_absent_reports_existing() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .and(header("x-amz-target", target("PutParameter").as_str()))
        .and(body_partial_json(json!({ "Overwrite": false })))
        .respond_with(service_error(400, "ParameterAlreadyExists"))
        .mount(&server)
        .await;

    let outcome = store
        .put_if_absent("/ephem-vpn/wg/server-private-key", "k", Confidentiality::Secret)
        .await
        .unwrap();
    assert_eq!(outcome, PutOutcome::AlreadyExists);
}

// ── DescribeParameters ──────────────────────────────────────────────

#[tokio::test]
async fn test_list_names_follows_pagination() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .and(header("x-amz-target", target("DescribeParameters").as_str()))
        .and(body_partial_json(json!({ "NextToken": "page-2" })))
        .respond_with(ok_json(&json!({
            "Parameters": [{ "Name": "/ephem-vpn/users/alice/status" }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(header("x-amz-target", target("DescribeParameters").as_str()))
        .respond_with(ok_json(&json!({
            "Parameters": [
                { "Name": "/ephem-vpn/users/bob/status" },
                { "Name": "/ephem-vpn/users/alice/wg-public-key" }
            ],
            "NextToken": "page-2"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let names = store.list_names("/ephem-vpn/users/").await.unwrap();
    assert_eq!(
        names,
        vec![
            "/ephem-vpn/users/alice/status",
            "/ephem-vpn/users/alice/wg-public-key",
            "/ephem-vpn/users/bob/status",
        ]
    );
}
