//! Resilient client tests against a wiremock backend.

use std::sync::Arc;
use std::time::Duration;

use finance_gateway::backend::{ClientSettings, ResilientClient};
use finance_gateway::error::{AuthError, ErrorCode, GatewayError};
use finance_gateway::observability::{GatewayObserver, NoopAlertSink, Telemetry};
use parking_lot::Mutex;
use rust_common::{CircuitBreakerConfig, CircuitState, HttpConfig, RetryConfig, Transition};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct TransitionLog {
    transitions: Mutex<Vec<(String, Transition)>>,
}

impl GatewayObserver for TransitionLog {
    fn record_call(&self, _tool: &str, _outcome: &str, _latency: Duration) {}

    fn record_transition(&self, backend: &str, transition: Transition) {
        self.transitions.lock().push((backend.to_string(), transition));
    }
}

fn settings(max_retries: u32, breaker: CircuitBreakerConfig) -> ClientSettings {
    ClientSettings {
        http: HttpConfig::default().with_timeout(Duration::from_millis(100)),
        circuit_breaker: breaker,
        retry: RetryConfig::default()
            .with_max_retries(max_retries)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5))
            .without_jitter(),
    }
}

fn client(server: &MockServer, settings: ClientSettings, telemetry: Telemetry) -> ResilientClient {
    ResilientClient::new(
        "account-service",
        Url::parse(&server.uri()).unwrap(),
        settings,
        telemetry,
    )
    .unwrap()
}

fn default_client(server: &MockServer, max_retries: u32) -> ResilientClient {
    client(
        server,
        settings(max_retries, CircuitBreakerConfig::default()),
        Telemetry::noop(),
    )
}

#[tokio::test]
async fn get_sends_bearer_and_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accounts"))
        .and(query_param("owner_id", "cust-1"))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "acc-1"}])))
        .expect(1)
        .mount(&server)
        .await;

    let value = default_client(&server, 0)
        .get(
            &["accounts"],
            &[("owner_id", "cust-1")],
            Some("tok-123"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(value[0]["id"], "acc-1");
}

#[tokio::test]
async fn post_and_put_send_json_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transactions/tx-1/reverse"))
        .and(body_json(json!({"reason": "duplicate"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"status": "reversed"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/accounts/acc-1"))
        .and(body_json(json!({"status": "frozen"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "frozen"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = default_client(&server, 0);
    let cancel = CancellationToken::new();
    let reversed = client
        .post(&["transactions", "tx-1", "reverse"], &json!({"reason": "duplicate"}), None, &cancel)
        .await
        .unwrap();
    assert_eq!(reversed["status"], "reversed");

    let updated = client
        .put(&["accounts", "acc-1"], &json!({"status": "frozen"}), None, &cancel)
        .await
        .unwrap();
    assert_eq!(updated["status"], "frozen");
}

#[tokio::test]
async fn empty_success_body_is_null() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/accounts/acc-9"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let value = default_client(&server, 0)
        .delete(&["accounts", "acc-9"], None, &CancellationToken::new())
        .await
        .unwrap();
    assert!(value.is_null());
}

#[tokio::test]
async fn server_errors_are_retried_up_to_the_cap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = default_client(&server, 2);
    let err = client
        .get(&["accounts", "acc-1"], &[], None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Service);
    assert_eq!(client.circuit_snapshot().failure_count, 3);
}

#[tokio::test]
async fn transient_failure_then_success_recovers_within_one_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "acc-1"})))
        .mount(&server)
        .await;

    let client = default_client(&server, 3);
    let value = client
        .get(&["accounts", "acc-1"], &[], None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(value["id"], "acc-1");
    // One failure counted, then decremented by the success
    assert_eq!(client.circuit_snapshot().failure_count, 0);
}

#[tokio::test]
async fn client_errors_are_classified_and_never_retried() {
    let cases = [
        (400, ErrorCode::Validation),
        (401, ErrorCode::Authentication),
        (403, ErrorCode::Authorization),
        (404, ErrorCode::NotFound),
        (409, ErrorCode::Conflict),
        (422, ErrorCode::Validation),
        (429, ErrorCode::RateLimited),
    ];

    for (status, code) in cases {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(json!({"detail": "backend said no"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = default_client(&server, 3);
        let err = client
            .get(&["accounts", "acc-1"], &[], None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), code, "status {status}");
        assert_eq!(client.circuit_state(), CircuitState::Closed);
        assert_eq!(client.circuit_snapshot().failure_count, 0, "status {status}");
    }
}

#[tokio::test]
async fn backend_401_is_a_rejection_not_a_token_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = default_client(&server, 0)
        .get(&["accounts"], &[], Some("tok"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Authentication {
            reason: AuthError::Rejected(_)
        }
    ));
}

#[tokio::test]
async fn repeated_timeouts_open_the_circuit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .expect(5)
        .mount(&server)
        .await;

    let log = Arc::new(TransitionLog::default());
    let telemetry = Telemetry::new(log.clone(), Arc::new(NoopAlertSink));
    let client = client(
        &server,
        settings(
            0,
            CircuitBreakerConfig::default()
                .with_failure_threshold(5)
                .with_recovery_timeout(Duration::from_secs(60)),
        ),
        telemetry,
    );
    let cancel = CancellationToken::new();

    for _ in 0..5 {
        let err = client
            .get(&["accounts", "acc-1"], &[], None, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Timeout);
    }
    assert_eq!(client.circuit_state(), CircuitState::Open);

    // Sixth call fails fast without reaching the backend
    let err = client
        .get(&["accounts", "acc-1"], &[], None, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::CircuitOpen);
    assert!(err.retry_after().is_some_and(|d| d <= Duration::from_secs(60)));

    let transitions = log.transitions.lock().clone();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].0, "account-service");
    assert_eq!(transitions[0].1.to, CircuitState::Open);
}

#[tokio::test]
async fn half_open_trial_success_closes_the_circuit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let log = Arc::new(TransitionLog::default());
    let client = client(
        &server,
        settings(
            0,
            CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_success_threshold(1)
                .with_half_open_max_calls(1)
                .with_recovery_timeout(Duration::from_millis(50)),
        ),
        Telemetry::new(log.clone(), Arc::new(NoopAlertSink)),
    );
    let cancel = CancellationToken::new();

    assert!(client.get(&["health"], &[], None, &cancel).await.is_err());
    assert_eq!(client.circuit_state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(80)).await;
    let value = client.get(&["health"], &[], None, &cancel).await.unwrap();
    assert_eq!(value["ok"], true);
    assert_eq!(client.circuit_state(), CircuitState::Closed);

    let states: Vec<_> = log.transitions.lock().iter().map(|(_, t)| t.to).collect();
    assert_eq!(
        states,
        vec![CircuitState::Open, CircuitState::HalfOpen, CircuitState::Closed]
    );
}

#[tokio::test]
async fn cancellation_during_backoff_stops_retrying() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let mut slow_retry = settings(5, CircuitBreakerConfig::default());
    slow_retry.retry = RetryConfig::default()
        .with_max_retries(5)
        .with_initial_delay(Duration::from_secs(10))
        .with_max_delay(Duration::from_secs(10))
        .without_jitter();
    let client = client(&server, slow_retry, Telemetry::noop());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = client
        .get(&["accounts"], &[], None, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn unreachable_backend_is_a_service_error() {
    // Nothing listens on the discard port
    let client = ResilientClient::new(
        "transaction-service",
        Url::parse("http://127.0.0.1:9").unwrap(),
        settings(1, CircuitBreakerConfig::default()),
        Telemetry::noop(),
    )
    .unwrap();

    let err = client
        .get(&["transactions"], &[], None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err.code(),
        ErrorCode::Service | ErrorCode::Timeout
    ));
    assert_eq!(client.circuit_snapshot().failure_count, 2);
}
