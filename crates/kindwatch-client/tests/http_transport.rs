use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kindwatch_client::{BackendClient, CircuitState, HttpTransport};
use kindwatch_core::{
    BackendSettings, KindwatchConfig, NoopObserver, SubmitReply, Transport, TransportError,
    TransportRequest,
};
use kindwatch_types::{ExistenceVerdict, Operation, TaskPhase};

fn settings(server: &MockServer) -> BackendSettings {
    BackendSettings {
        base_url: server.uri(),
        api_token: Some("secret".to_string()),
        breaker_max_failures: 2,
        breaker_cooldown_ms: 60_000,
        ..BackendSettings::default()
    }
}

fn config(server: &MockServer) -> KindwatchConfig {
    let mut config = KindwatchConfig {
        backend: settings(server),
        ..KindwatchConfig::default()
    };
    config.oracle.probe_timeout_ms = 500;
    config.oracle.overall_budget_ms = 2_000;
    config
}

#[tokio::test]
async fn sends_token_headers_and_decodes_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tasks/t1"))
        .and(header("x-kindwatch-token", "secret"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "t1",
            "status": "running",
            "progress": 30
        })))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&settings(&server)).expect("transport");
    let value = transport
        .request(TransportRequest::get("/api/tasks/t1", Duration::from_secs(2)))
        .await
        .expect("response");
    assert_eq!(value["progress"], 30);
}

#[tokio::test]
async fn maps_http_errors_and_timeouts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/cluster/demo/details"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"detail": "Cluster demo not found"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/garbled"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&settings(&server)).expect("transport");

    let err = transport
        .request(TransportRequest::get(
            "/api/cluster/demo/details",
            Duration::from_secs(2),
        ))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = transport
        .request(TransportRequest::get("/slow", Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "{err:?}");

    let err = transport
        .request(TransportRequest::get("/garbled", Duration::from_secs(2)))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Decode { .. }));
}

#[tokio::test]
async fn breaker_opens_after_repeated_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&settings(&server)).expect("transport");
    for _ in 0..2 {
        let err = transport
            .request(TransportRequest::get("/health", Duration::from_secs(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Http { status: 503, .. }));
    }
    assert_eq!(transport.circuit_state("/health"), CircuitState::Open);

    let err = transport
        .request(TransportRequest::get("/health", Duration::from_secs(2)))
        .await
        .unwrap_err();
    assert_eq!(err, TransportError::CircuitOpen);
    assert_eq!(server.received_requests().await.map(|r| r.len()), Some(2));
}

#[tokio::test]
async fn open_breaker_is_scoped_to_its_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tasks/t1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/clusters/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"clusters": []}
        })))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&settings(&server)).expect("transport");
    for _ in 0..3 {
        let _ = transport
            .request(TransportRequest::get("/api/tasks/t1", Duration::from_secs(2)))
            .await;
    }
    assert_eq!(transport.circuit_state("/api/tasks/t1"), CircuitState::Open);
    assert_eq!(transport.circuit_state("/api/clusters/list"), CircuitState::Closed);

    let value = transport
        .request(TransportRequest::get("/api/clusters/list", Duration::from_secs(2)))
        .await
        .expect("list stays reachable");
    assert_eq!(value["status"], "success");
}

#[tokio::test]
async fn submit_extracts_the_task_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/cluster/create"))
        .and(body_partial_json(json!({"name": "demo", "worker_nodes": 1})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "accepted",
            "message": "Cluster creation started",
            "data": {"task_id": "abc123"}
        })))
        .mount(&server)
        .await;

    let client = BackendClient::connect(config(&server)).expect("client");
    let reply = client
        .submit(&Operation::create("demo").with_param("worker_nodes", 1))
        .await
        .expect("submit");
    assert_eq!(reply, SubmitReply::Task("abc123".to_string()));
}

#[tokio::test]
async fn reconciles_a_create_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/cluster/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "accepted",
            "data": {"task_id": "abc123"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tasks/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "abc123",
            "status": "completed",
            "completed": true,
            "success": true,
            "progress": 100,
            "message": "Cluster demo created"
        })))
        .mount(&server)
        .await;

    let client = BackendClient::connect(config(&server)).expect("client");
    let status = client.task_status("abc123").await.expect("status");
    assert_eq!(status.phase, TaskPhase::Completed);

    let outcome = client
        .reconciler()
        .run(
            Operation::create("demo").with_param("worker_nodes", 1),
            Arc::new(NoopObserver),
        )
        .await
        .expect("outcome");
    assert!(outcome.success);
    assert!(!outcome.overridden);
    assert_eq!(outcome.message, "Cluster demo created");
}

#[tokio::test]
async fn oracle_uses_backend_probes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/cluster/status"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/clusters/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"clusters": [{"name": "demo", "status": "Running"}], "count": 1}
        })))
        .mount(&server)
        .await;

    let client = BackendClient::connect(config(&server)).expect("client");
    let report = client.oracle().check("demo").await;
    assert_eq!(report.verdict, ExistenceVerdict::Found);
    assert_eq!(report.results.len(), 2);
    assert!(report.results[0].error.is_some());
}

#[tokio::test]
async fn failing_task_endpoint_does_not_block_existence_checks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/cluster/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "accepted",
            "data": {"task_id": "t1"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tasks/t1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/cluster/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"clusters": [{"name": "demo", "status": "Running"}]}
        })))
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.poller.lifecycle.max_attempts = 8;
    config.poller.lifecycle.attempt_timeout_ms = 1_000;
    config.poller.lifecycle.backoff.base_ms = 20;
    config.poller.lifecycle.backoff.max_interval_ms = 20;
    config.poller.lifecycle.backoff.max_jitter_ms = 0;

    let client = BackendClient::connect(config).expect("client");
    let outcome = client
        .reconciler()
        .run(
            Operation::create("demo").with_param("worker_nodes", 1),
            Arc::new(NoopObserver),
        )
        .await
        .expect("outcome");

    assert!(outcome.success, "{outcome:?}");
    assert!(outcome.overridden);
    assert_eq!(outcome.verdict, Some(ExistenceVerdict::Found));
    assert_eq!(outcome.probes[0].error, None);
    assert_eq!(client.transport().circuit_state("/api/tasks/t1"), CircuitState::Open);
}
