//! End-to-end client tests against a mock OpusDNS API

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use opusdns::http::ReqwestTransport;
use opusdns::{
    ClientConfig, LookupError, OpusDnsClient, OpusDnsError, PropagationConfig, Quorum,
    RetryPolicy, TxtLookup,
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serves whatever TXT values were last published
#[derive(Default)]
struct PublishedRecords {
    values: Mutex<Vec<String>>,
}

impl PublishedRecords {
    fn publish(&self, value: &str) {
        self.values.lock().unwrap().push(value.to_string());
    }
}

#[async_trait]
impl TxtLookup for PublishedRecords {
    async fn lookup_txt(
        &self,
        _fqdn: &str,
        _resolver: SocketAddr,
        _timeout: Duration,
    ) -> Result<Vec<String>, LookupError> {
        Ok(self.values.lock().unwrap().clone())
    }
}

async fn mount_zone_listing(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/v1/dns"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"name": "example.com"}, {"name": "sub.example.com"}],
            "pagination": {"total_pages": 1, "current_page": 1, "has_next_page": false}
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn create_client(server: &MockServer, lookup: Arc<PublishedRecords>) -> OpusDnsClient {
    let config = ClientConfig::new("test-key")
        .with_endpoint(server.uri())
        .with_retry_policy(
            RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(5)).unwrap(),
        )
        .with_propagation(
            PropagationConfig::default()
                .with_resolvers(vec!["10.0.0.1:53".parse().unwrap()])
                .with_interval(Duration::from_millis(10))
                .with_timeout(Duration::from_millis(200))
                .with_quorum(Quorum::All),
        );
    let transport = ReqwestTransport::new(
        server.uri(),
        "test-key",
        &config.user_agent,
        Duration::from_secs(5),
    )
    .unwrap();

    OpusDnsClient::with_components(config, Arc::new(transport), lookup).unwrap()
}

#[tokio::test]
async fn test_upsert_and_remove_txt_record() {
    let server = MockServer::start().await;
    mount_zone_listing(&server, 1).await;

    Mock::given(method("PATCH"))
        .and(path("/v1/dns/sub.example.com/rrsets"))
        .and(body_json(json!({"ops": [{"op": "upsert", "rrset": {
            "name": "_acme-challenge",
            "type": "TXT",
            "ttl": 60,
            "records": [{"rdata": "\"challenge-token\""}]
        }}]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/v1/dns/sub.example.com/rrsets"))
        .and(body_json(json!({"ops": [{"op": "remove", "rrset": {
            "name": "_acme-challenge",
            "type": "TXT",
            "ttl": 60,
            "records": []
        }}]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_client(&server, Arc::new(PublishedRecords::default()));

    client
        .upsert_txt_record("_acme-challenge.sub.example.com.", "challenge-token")
        .await
        .unwrap();
    // second lookup is served from the zone cache
    client
        .remove_txt_record("_acme-challenge.sub.example.com")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_upsert_and_wait_confirms_propagation() {
    let server = MockServer::start().await;
    mount_zone_listing(&server, 1).await;

    Mock::given(method("PATCH"))
        .and(path("/v1/dns/example.com/rrsets"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let records = Arc::new(PublishedRecords::default());
    records.publish("\"challenge-token\"");
    let client = create_client(&server, records);

    let report = client
        .upsert_txt_record_and_wait("_acme-challenge.example.com", "challenge-token")
        .await
        .unwrap();
    assert_eq!(report.rounds, 1);
    assert_eq!(report.fqdn, "_acme-challenge.example.com.");
}

#[tokio::test]
async fn test_unpublished_record_times_out() {
    let server = MockServer::start().await;
    let client = create_client(&server, Arc::new(PublishedRecords::default()));

    let err = client
        .wait_for_propagation("_acme-challenge.example.com", "missing")
        .await
        .unwrap_err();
    match err {
        OpusDnsError::PropagationTimeout(timeout) => {
            assert!(timeout.rounds >= 2);
            assert_eq!(timeout.pending, vec!["10.0.0.1:53".to_string()]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_zone_is_reported() {
    let server = MockServer::start().await;
    mount_zone_listing(&server, 1).await;
    let client = create_client(&server, Arc::new(PublishedRecords::default()));

    let err = client
        .upsert_txt_record("_acme-challenge.nomatch.org", "token")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OpusDnsError::ZoneNotFound {
            zones_considered: 2,
            ..
        }
    ));
}

#[tokio::test]
async fn test_missing_zone_drops_cache() {
    let server = MockServer::start().await;
    mount_zone_listing(&server, 2).await;

    Mock::given(method("PATCH"))
        .and(path("/v1/dns/example.com/rrsets"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Zone not found"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_client(&server, Arc::new(PublishedRecords::default()));

    let err = client
        .upsert_txt_record("_acme-challenge.example.com", "token")
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    // the zone listing is fetched again after the 404
    client.resolve_zone("www.example.com").await.unwrap();
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/dns"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "internal"
        })))
        .expect(3)
        .mount(&server)
        .await;

    let client = create_client(&server, Arc::new(PublishedRecords::default()));
    let err = client.resolve_zone("www.example.com").await.unwrap_err();

    assert!(matches!(
        err,
        OpusDnsError::RetriesExhausted { attempts: 3, .. }
    ));
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn test_cancelled_client_stops_work() {
    let server = MockServer::start().await;
    let client = create_client(&server, Arc::new(PublishedRecords::default()));

    client.cancellation_token().cancel();
    let err = client.resolve_zone("www.example.com").await.unwrap_err();
    assert!(err.is_cancelled());
}
