//! Integration tests for the agent API endpoints

use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
    Router,
};
use hostports_lib::{
    api::{create_router, AppState},
    health::{AppliedRuleset, Component, HealthRegistry},
    observability::AgentMetrics,
};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    let metrics = AgentMetrics::new();
    let state = Arc::new(AppState::new(health_registry, metrics));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn json_body(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn text_body(response: Response<Body>) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let response = get(app, "/healthz").await;

    assert_eq!(response.status(), StatusCode::OK);
    let health = json_body(response).await;
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_ok_while_runtime_disconnected() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_degraded(Component::RuntimeClient, "connection refused")
        .await;

    let response = get(app, "/healthz").await;

    // The agent keeps retrying, so a lost runtime is not a liveness failure
    assert_eq!(response.status(), StatusCode::OK);
    let health = json_body(response).await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(
        health["components"]["runtime_client"]["message"],
        "connection refused"
    );
}

#[tokio::test]
async fn test_healthz_returns_503_when_nft_failed() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(Component::RuleApplier, "nft exited with status 1")
        .await;

    let response = get(app, "/healthz").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let health = json_body(response).await;
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_returns_503_before_first_reconcile() {
    let (app, _state) = setup_test_app().await;

    let response = get(app, "/readyz").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let readiness = json_body(response).await;
    assert_eq!(readiness["ready"], false);
    assert_eq!(readiness["reason"], "No ruleset reconciled yet");
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .record_applied(AppliedRuleset::new("e3b0c44298fc1c14", 1, 0))
        .await;

    let response = get(app, "/readyz").await;

    assert_eq!(response.status(), StatusCode::OK);
    let readiness = json_body(response).await;
    assert_eq!(readiness["ready"], true);
    assert_eq!(readiness["ruleset"]["fingerprint"], "e3b0c44298fc1c14");
    assert_eq!(readiness["ruleset"]["tcp_ports"], 1);
}

#[tokio::test]
async fn test_readyz_returns_503_when_ready_but_unhealthy() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .record_applied(AppliedRuleset::new("e3b0c44298fc1c14", 1, 0))
        .await;
    state
        .health_registry
        .set_unhealthy(Component::RuleApplier, "Failed")
        .await;

    let response = get(app, "/readyz").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;

    state.metrics.observe_cycle_duration(0.003);
    state.metrics.inc_cycle("applied");
    state.metrics.record_apply(3, 1);
    state.metrics.set_runtime_connected(true);

    let response = get(app, "/metrics").await;

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let metrics_text = text_body(response).await;
    assert!(metrics_text.contains("cri_hostports_cycles_total"));
    assert!(metrics_text.contains("cri_hostports_rule_applies_total"));
    assert!(metrics_text.contains("cri_hostports_forwarded_ports"));
    assert!(metrics_text.contains("cri_hostports_runtime_connected"));
}

#[tokio::test]
async fn test_metrics_contains_histogram_buckets() {
    let (app, state) = setup_test_app().await;

    state.metrics.observe_cycle_duration(0.001);
    state.metrics.observe_cycle_duration(0.02);

    let metrics_text = text_body(get(app, "/metrics").await).await;

    assert!(metrics_text.contains("cri_hostports_cycle_duration_seconds_bucket"));
    assert!(metrics_text.contains("cri_hostports_cycle_duration_seconds_count"));
    assert!(metrics_text.contains("cri_hostports_cycle_duration_seconds_sum"));
}

#[tokio::test]
async fn test_healthz_includes_component_details() {
    let (app, _state) = setup_test_app().await;

    let health = json_body(get(app, "/healthz").await).await;

    assert!(health["components"].is_object());
    assert!(health["components"]["runtime_client"].is_object());
    assert!(health["components"]["rule_applier"].is_object());
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let (app, _state) = setup_test_app().await;

    let response = get(app, "/nope").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
