//! Tests for the HTTP module

use super::*;
use crate::error::Error;
use crate::types::Method;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Transport that replays a fixed list of statuses, repeating the last one
struct ScriptedTransport {
    statuses: Mutex<VecDeque<u16>>,
    calls: Mutex<Vec<Instant>>,
}

impl ScriptedTransport {
    fn new(statuses: &[u16]) -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(statuses.iter().copied().collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        _method: Method,
        _endpoint: &str,
        _body: Option<&Value>,
    ) -> crate::Result<RawResponse> {
        self.calls.lock().unwrap().push(Instant::now());
        let mut statuses = self.statuses.lock().unwrap();
        let status = if statuses.len() > 1 {
            statuses.pop_front().unwrap()
        } else {
            *statuses.front().unwrap()
        };
        Ok(RawResponse::new(status, r#"{"ok":true}"#))
    }
}

/// Paused-clock timers fire on millisecond ticks
fn assert_close(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual < expected + Duration::from_millis(20),
        "expected ~{expected:?}, got {actual:?}"
    );
}

// ============================================================================
// Outcome Tests
// ============================================================================

#[test]
fn test_outcome_classification() {
    assert_eq!(Outcome::classify(200), Outcome::Success);
    assert_eq!(Outcome::classify(429), Outcome::RateLimited);
    assert_eq!(Outcome::classify(504), Outcome::UpstreamTimeout);
    assert_eq!(Outcome::classify(403), Outcome::Fatal(403));
    assert_eq!(Outcome::classify(500), Outcome::Fatal(500));
    assert_eq!(Outcome::classify(201), Outcome::Fatal(201));

    assert!(Outcome::RateLimited.is_retriable());
    assert!(Outcome::UpstreamTimeout.is_retriable());
    assert!(!Outcome::Fatal(503).is_retriable());
    assert!(!Outcome::Success.is_retriable());
}

// ============================================================================
// Backoff Policy Tests
// ============================================================================

#[test]
fn test_backoff_default_schedule() {
    let policy = BackoffPolicy::default();
    assert_eq!(policy.max_attempts, 5);
    assert_eq!(
        policy.delays(),
        vec![
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8),
            Duration::from_secs(16),
            Duration::from_secs(32),
        ]
    );
    assert_eq!(policy.worst_case_wait(), Duration::from_secs(62));
}

#[test]
fn test_backoff_max_delay_caps_each_sleep() {
    let policy = BackoffPolicy::new(4, Duration::from_millis(500), 3.0)
        .with_max_delay(Duration::from_secs(2));
    assert_eq!(
        policy.delays(),
        vec![
            Duration::from_millis(500),
            Duration::from_millis(1500),
            Duration::from_secs(2),
            Duration::from_secs(2),
        ]
    );
}

#[test]
fn test_backoff_new_sanitizes_inputs() {
    let policy = BackoffPolicy::new(0, Duration::from_secs(1), -2.0);
    assert_eq!(policy.max_attempts, 1);
    assert_eq!(policy.delay_for(3), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_always_rate_limited_exhausts_attempts() {
    let transport = ScriptedTransport::new(&[429]);
    let client = HttpClient::with_transport(transport.clone(), BackoffPolicy::default());

    let start = Instant::now();
    let err = client
        .execute_raw(Method::POST, "/api/supporters/search", None)
        .await
        .unwrap_err();

    let calls = transport.call_times();
    assert_eq!(calls.len(), 5);
    let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
    for (gap, secs) in gaps.iter().zip([2, 4, 8, 16]) {
        assert_close(*gap, Duration::from_secs(secs));
    }
    assert_close(start.elapsed(), Duration::from_secs(62));

    match err {
        Error::RetriesExhausted {
            endpoint,
            status,
            attempts,
        } => {
            assert_eq!(endpoint, "/api/supporters/search");
            assert_eq!(status, 429);
            assert_eq!(attempts, 5);
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_backoff_fatal_short_circuits() {
    let transport = ScriptedTransport::new(&[403]);
    let client = HttpClient::with_transport(transport.clone(), BackoffPolicy::default());

    let start = Instant::now();
    let err = client
        .execute_raw(Method::GET, "/api/metrics", None)
        .await
        .unwrap_err();

    assert_eq!(transport.call_times().len(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert!(matches!(
        err,
        Error::HttpStatus { status: 403, ref endpoint, .. } if endpoint == "/api/metrics"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_recovers_after_transient_statuses() {
    let transport = ScriptedTransport::new(&[429, 504, 200]);
    let client = HttpClient::with_transport(transport.clone(), BackoffPolicy::default());

    let start = Instant::now();
    let body: Value = client
        .execute::<Value, Value>(Method::GET, "/api/metrics", None)
        .await
        .unwrap();

    assert_eq!(body, json!({"ok": true}));
    assert_eq!(transport.call_times().len(), 3);
    assert_close(start.elapsed(), Duration::from_secs(6));
}

#[tokio::test]
async fn test_backoff_transport_error_is_not_retried() {
    let policy = BackoffPolicy::new(5, Duration::from_millis(1), 2.0);
    let mut calls = 0;
    let result = policy
        .run("/api/x", |_| {
            calls += 1;
            async { Err(Error::Other("connection reset".to_string())) }
        })
        .await;

    assert!(result.is_err());
    assert_eq!(calls, 1);
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_http_client_config_default() {
    let config = HttpClientConfig::default();
    assert_eq!(config.timeout, Duration::from_secs(30));
    assert_eq!(config.auth_header, "authToken");
    assert_eq!(config.backoff, BackoffPolicy::default());
    assert!(config.base_url.is_none());
    assert!(config.rate_limit.is_none());
    assert!(!config.log_bodies);
}

#[test]
fn test_http_client_config_builder() {
    let config = HttpClientConfig::builder()
        .base_url("https://api.example.com")
        .token("secret")
        .auth_header("X-Auth")
        .timeout(Duration::from_secs(60))
        .backoff(BackoffPolicy::new(3, Duration::from_millis(200), 1.5))
        .rate_limit(RateLimiterConfig::per_minute(300))
        .header("X-Custom", "value")
        .user_agent("test-agent/1.0")
        .log_bodies(true)
        .build();

    assert_eq!(config.base_url, Some("https://api.example.com".to_string()));
    assert_eq!(config.token, Some("secret".to_string()));
    assert_eq!(config.auth_header, "X-Auth");
    assert_eq!(config.timeout, Duration::from_secs(60));
    assert_eq!(config.backoff.max_attempts, 3);
    assert_eq!(config.rate_limit, Some(RateLimiterConfig::per_minute(300)));
    assert_eq!(
        config.default_headers.get("X-Custom"),
        Some(&"value".to_string())
    );
    assert_eq!(config.user_agent, "test-agent/1.0");
    assert!(config.log_bodies);
}

#[test]
fn test_http_client_rejects_invalid_base_url() {
    let config = HttpClientConfig::builder().base_url("not a url").build();
    assert!(matches!(HttpClient::new(config), Err(Error::InvalidUrl(_))));
}

// ============================================================================
// Reqwest Transport Tests
// ============================================================================

fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy::new(3, Duration::from_millis(5), 2.0)
}

#[tokio::test]
async fn test_execute_posts_body_with_auth_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/supporters/search"))
        .and(header("authToken", "tok-123"))
        .and(body_json(json!({"payload": {"offset": 0, "count": 0}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "payload": {"total": 250}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = HttpClientConfig::builder()
        .base_url(mock_server.uri())
        .token("tok-123")
        .backoff(fast_backoff())
        .build();
    let client = HttpClient::new(config).unwrap();

    let body = json!({"payload": {"offset": 0, "count": 0}});
    let response: Value = client
        .execute(Method::POST, "/api/supporters/search", Some(&body))
        .await
        .unwrap();

    assert_eq!(response["payload"]["total"], 250);
}

#[tokio::test]
async fn test_execute_retries_429_then_succeeds() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/metrics"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 42})))
        .mount(&mock_server)
        .await;

    let config = HttpClientConfig::builder()
        .base_url(mock_server.uri())
        .backoff(fast_backoff())
        .build();
    let client = HttpClient::new(config).unwrap();

    let data: Value = client
        .execute::<Value, _>(Method::GET, "/api/metrics", None)
        .await
        .unwrap();
    assert_eq!(data["value"], 42);
}

#[tokio::test]
async fn test_execute_fatal_status_carries_endpoint() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/forbidden"))
        .respond_with(ResponseTemplate::new(403).set_body_string("nope"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = HttpClientConfig::builder()
        .base_url(mock_server.uri())
        .backoff(fast_backoff())
        .build();
    let client = HttpClient::new(config).unwrap();

    let err = client
        .execute::<Value, Value>(Method::GET, "/api/forbidden", None)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "HTTP 403 from /api/forbidden: nope");
}

#[tokio::test]
async fn test_execute_undecodable_body_is_decode_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/garbage"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&mock_server)
        .await;

    let config = HttpClientConfig::builder()
        .base_url(mock_server.uri())
        .log_bodies(true)
        .build();
    let client = HttpClient::new(config).unwrap();

    let err = client
        .execute::<Value, Value>(Method::GET, "/api/garbage", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Decode { .. }));
}

#[test]
fn test_reqwest_transport_build_url() {
    let transport = ReqwestTransport::new(
        Some("https://api.example.com/".to_string()),
        std::collections::HashMap::new(),
        Duration::from_secs(5),
        "test",
    )
    .unwrap();

    assert_eq!(
        transport.build_url("/api/metrics"),
        "https://api.example.com/api/metrics"
    );
    assert_eq!(
        transport.build_url("https://other.example.com/x"),
        "https://other.example.com/x"
    );
}
