mod common;

use axum::Router;
use axum::body::Body;
use common::{Harness, widget_order};
use http::{Request, StatusCode};
use orders_service::api::build_app;
use orders_service::utils::ErrorBody;
use orders_service::{AppState, StoreFault};
use serde_json::{Value, json};
use shared::{Order, OrderCreate};
use tower::ServiceExt;

async fn seeded() -> (Harness, Router) {
    let h = Harness::new();
    let order =
        OrderCreate::from_slice(&serde_json::to_vec(&widget_order("ORD-1")).unwrap()).unwrap();
    h.processor.process(&order).await.unwrap();
    let app = build_app(AppState::new(h.processor.clone()));
    (h, app)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn put_status(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_get_order_returns_snapshot() {
    let (h, app) = seeded().await;

    let (status, bytes) = send(app, get("/orders/ORD-1")).await;

    assert_eq!(status, StatusCode::OK);
    let order: Order = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(order.order_id, "ORD-1");
    assert_eq!(order.items.len(), 1);
    assert_eq!(h.processor.stats().cache_hits, 1);
}

#[tokio::test]
async fn test_get_unknown_order_is_404() {
    let (_h, app) = seeded().await;

    let (status, bytes) = send(app, get("/orders/UNKNOWN")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: ErrorBody = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error.code, "E0003");
    assert!(error.message.contains("UNKNOWN"));
}

#[tokio::test]
async fn test_store_outage_is_503_without_details() {
    let (h, app) = seeded().await;
    h.store.fail_with(StoreFault::Unavailable);

    let (status, bytes) = send(app, get("/orders/ORD-2")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let error: ErrorBody = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error.code, "E9002");
    assert!(!error.message.contains("injected"));
}

#[tokio::test]
async fn test_put_status_updates_and_invalidates() {
    let (h, app) = seeded().await;

    let (status, bytes) = send(
        app.clone(),
        put_status("/orders/ORD-1/status", json!({"status": "shipped"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let order: Order = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(order.status, "shipped");
    assert!(!h.cache.contains("order:ORD-1"));

    let (_, bytes) = send(app, get("/orders/ORD-1")).await;
    let order: Order = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(order.status, "shipped");
}

#[tokio::test]
async fn test_put_blank_status_is_400() {
    let (_h, app) = seeded().await;

    let (status, bytes) = send(
        app,
        put_status("/orders/ORD-1/status", json!({"status": "  "})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorBody = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error.code, "E0002");
}

#[tokio::test]
async fn test_put_status_of_unknown_order_is_404() {
    let (_h, app) = seeded().await;

    let (status, _) = send(
        app,
        put_status("/orders/NOPE/status", json!({"status": "shipped"})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_reports_stats() {
    let (_h, app) = seeded().await;

    let (status, bytes) = send(app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health["status"], "ok");
    assert!(health["stats"]["cache_hits"].is_u64());
}
