//! Status API tests.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use domain_generator::server::{create_router, ServerState};
use domain_generator::ConsumerState;

fn state(consumer: Arc<ConsumerState>) -> Arc<ServerState> {
    Arc::new(ServerState {
        consumer,
        watched_categories: vec!["minor".to_string(), "major".to_string()],
        metrics: None,
    })
}

async fn get_json(state: Arc<ServerState>, uri: &str) -> (StatusCode, Value) {
    let response = create_router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_health() {
    let (status, body) = get_json(state(Arc::new(ConsumerState::new())), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "domain-generator");
}

#[tokio::test]
async fn test_status_reflects_consumer_state() {
    let consumer = Arc::new(ConsumerState::new());
    consumer.set_running(true);

    let (status, body) = get_json(state(consumer.clone()), "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "consuming");
    assert_eq!(body["consumer"]["running"], true);
    assert_eq!(body["consumer"]["messages_acked"], 0);
    assert_eq!(body["watched_categories"][1], "major");

    consumer.set_running(false);
    let (_, body) = get_json(state(consumer), "/status").await;
    assert_eq!(body["status"], "stopped");
}

#[tokio::test]
async fn test_metrics_without_recorder() {
    let (status, _) = get_json(state(Arc::new(ConsumerState::new())), "/metrics").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
