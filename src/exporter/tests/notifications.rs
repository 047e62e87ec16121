//! Webhook delivery tests against a local mock HTTP server.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::{Config, WebhookConfig, WebhookEvent};
use crate::exporter::test_helpers::{FailingTransform, collect_chunks, flow_ref, seeded_store};
use crate::exporter::{ExportRequest, FlowExporter};
use crate::plugins::ExportPluginRegistry;
use crate::types::{Event, ExportTarget};

fn webhook(url: String, events: Vec<WebhookEvent>, auth_header: Option<String>) -> WebhookConfig {
    WebhookConfig {
        url,
        events,
        auth_header,
        timeout: Duration::from_secs(5),
    }
}

fn exporter_with_webhook(hook: WebhookConfig) -> FlowExporter {
    let mut registry = ExportPluginRegistry::with_defaults();
    registry
        .register(Arc::new(FailingTransform {
            chunks_before_failure: 1,
        }))
        .unwrap();
    let mut config = Config::default();
    config
        .approval
        .bypass_principals
        .push("export-robot".to_string());
    config.notifications.webhooks.push(hook);
    FlowExporter::new(config, seeded_store(), registry).unwrap()
}

async fn wait_for_requests(server: &MockServer, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let received = server.received_requests().await.unwrap_or_default();
            if received.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("webhook must be delivered");
}

#[tokio::test]
async fn completion_webhook_is_posted_with_auth_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("Authorization", "Bearer hook-token"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let exporter = exporter_with_webhook(webhook(
        format!("{}/hook", server.uri()),
        vec![WebhookEvent::OnComplete],
        Some("Bearer hook-token".to_string()),
    ));

    let handle = exporter
        .start_export(ExportRequest::archive("export-robot", flow_ref()))
        .await
        .unwrap();
    let (chunks, error) = collect_chunks(handle.chunks.unwrap()).await;
    assert_eq!(chunks.len(), 2);
    assert!(error.is_none());

    wait_for_requests(&server, 1).await;
    let received = server.received_requests().await.unwrap();
    let payload: serde_json::Value = received[0].body_json().unwrap();
    assert_eq!(payload["event"], "export_complete");
    assert_eq!(payload["requester"], "export-robot");
    assert_eq!(payload["resource"], "C.1/F:1");
}

#[tokio::test]
async fn failure_webhook_carries_the_job_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let exporter = exporter_with_webhook(webhook(
        format!("{}/hook", server.uri()),
        vec![WebhookEvent::OnFailed],
        None,
    ));

    let handle = exporter
        .start_export(ExportRequest {
            requester: "export-robot".to_string(),
            resource: flow_ref(),
            target: ExportTarget::Plugin("failing".to_string()),
            params: Default::default(),
        })
        .await
        .unwrap();
    let job_id = handle.job.id;
    let (_, error) = collect_chunks(handle.chunks.unwrap()).await;
    assert!(error.is_some());

    wait_for_requests(&server, 1).await;
    let received = server.received_requests().await.unwrap();
    let payload: serde_json::Value = received[0].body_json().unwrap();
    assert_eq!(payload["event"], "export_failed");
    assert_eq!(payload["job_id"], job_id.get());
}

#[tokio::test]
async fn failed_delivery_surfaces_on_the_event_bus() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let exporter = exporter_with_webhook(webhook(
        format!("{}/hook", server.uri()),
        vec![WebhookEvent::OnComplete],
        None,
    ));
    let mut events = exporter.subscribe();

    let handle = exporter
        .start_export(ExportRequest::archive("export-robot", flow_ref()))
        .await
        .unwrap();
    let _ = collect_chunks(handle.chunks.unwrap()).await;

    let failure = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Event::NotificationFailed { url, error } = events.recv().await.unwrap() {
                return (url, error);
            }
        }
    })
    .await
    .expect("delivery failure must be reported");
    assert!(failure.0.ends_with("/hook"));
    assert!(failure.1.contains("500"));
}

#[tokio::test]
async fn webhooks_only_fire_for_subscribed_events() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    // Subscribed to failures only; a successful export must stay silent
    let exporter = exporter_with_webhook(webhook(
        format!("{}/hook", server.uri()),
        vec![WebhookEvent::OnFailed],
        None,
    ));

    let handle = exporter
        .start_export(ExportRequest::archive("export-robot", flow_ref()))
        .await
        .unwrap();
    let (chunks, error) = collect_chunks(handle.chunks.unwrap()).await;
    assert_eq!(chunks.len(), 2);
    assert!(error.is_none());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}
