// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::Config;
use crate::exporter::test_helpers::seeded_store;
use crate::plugins::ExportPluginRegistry;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::time::Duration;
use tower::ServiceExt;


/// Router over a seeded store: flow F:1 on client C.1 with two file
/// records, plus the `export-robot` bypass principal.
fn test_app() -> Router {
    test_app_with(Config::default())
}

fn test_app_with(mut config: Config) -> Router {
    config
        .approval
        .bypass_principals
        .push("export-robot".to_string());
    let exporter = FlowExporter::new(
        config,
        seeded_store(),
        ExportPluginRegistry::with_defaults(),
    )
    .unwrap();
    let config = exporter.get_config();
    create_router(exporter, config)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_cors_enabled() {
    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = test_app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers().contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn test_authentication_with_api_key() {
    let mut config = Config::default();
    config.server.api.api_key = Some("test-secret-key".to_string());
    let app = test_app_with(config);

    // Without the key
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // With the right key
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("X-Api-Key", "test-secret-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // With a wrong key
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("X-Api-Key", "wrong-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_authentication_disabled_by_default() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_openapi_json_endpoint() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;

    assert!(json["openapi"].as_str().unwrap().starts_with("3."));
    assert_eq!(json["info"]["title"], "flow-export REST API");

    let paths = json["paths"].as_object().unwrap();
    assert!(paths.contains_key("/approvals"));
    assert!(paths.contains_key("/clients/{client}/flows/{flow}/export"));
    assert!(paths.contains_key("/jobs/{id}"));
    assert!(paths.contains_key("/health"));

    let schemas = json["components"]["schemas"].as_object().unwrap();
    for expected in ["JobInfo", "ApiError", "ResultRecord", "UserNotification"] {
        assert!(schemas.contains_key(expected), "missing schema {expected}");
    }
}

#[tokio::test]
async fn test_swagger_ui_enabled() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/swagger-ui/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.status(),
        StatusCode::OK,
        "Swagger UI should be accessible when enabled"
    );
}

#[tokio::test]
async fn test_swagger_ui_disabled() {
    let mut config = Config::default();
    config.server.api.swagger_ui = false;
    let app = test_app_with(config);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/swagger-ui/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.status(),
        StatusCode::NOT_FOUND,
        "Swagger UI should not be accessible when disabled"
    );
}

#[tokio::test]
async fn test_api_server_binds_and_serves_health() {
    let mut config = Config::default();
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let exporter = FlowExporter::new(
        config,
        seeded_store(),
        ExportPluginRegistry::with_defaults(),
    )
    .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(exporter.clone(), exporter.get_config());
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body = response.json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["status"], "ok");

    server_handle.abort();
}
