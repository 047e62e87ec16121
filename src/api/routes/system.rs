//! System handlers: health, plugins, notifications, OpenAPI, events,
//! shutdown.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use utoipa::ToSchema;

use crate::api::state::AppState;
use crate::types::UserNotification;

/// Registered export plugins
#[derive(Debug, Serialize, ToSchema)]
pub struct PluginListResponse {
    /// Plugin ids usable as the `target` query parameter, sorted
    pub plugins: Vec<String>,
}

/// GET /health - Health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy")
    )
)]
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /plugins - Registered export plugins
#[utoipa::path(
    get,
    path = "/plugins",
    tag = "system",
    responses(
        (status = 200, description = "Registered plugin ids", body = PluginListResponse)
    )
)]
pub async fn list_plugins(State(state): State<AppState>) -> Json<PluginListResponse> {
    Json(PluginListResponse {
        plugins: state.exporter.plugin_ids(),
    })
}

/// GET /notifications - Recorded user notifications
///
/// With an `X-Requester` header only that requester's notifications are
/// returned; without one the whole retained inbox is.
#[utoipa::path(
    get,
    path = "/notifications",
    tag = "system",
    responses(
        (status = 200, description = "Notifications, oldest first", body = [UserNotification])
    )
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<Vec<UserNotification>> {
    let notifications = match headers.get("x-requester").and_then(|v| v.to_str().ok()) {
        Some(requester) if !requester.trim().is_empty() => {
            state.exporter.notifications_for(requester.trim())
        }
        _ => state.exporter.all_notifications(),
    };
    Json(notifications)
}

/// GET /openapi.json - OpenAPI specification
#[utoipa::path(
    get,
    path = "/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI specification in JSON format")
    )
)]
pub async fn openapi_spec() -> impl IntoResponse {
    use crate::api::openapi::ApiDoc;
    use utoipa::OpenApi;

    Json(ApiDoc::openapi())
}

/// GET /events - Server-sent events stream
///
/// Emits every lifecycle event (jobs, approvals, bypass audit) as a named
/// SSE event with a JSON payload.
#[utoipa::path(
    get,
    path = "/events",
    tag = "system",
    responses(
        (status = 200, description = "Server-sent events stream (text/event-stream)", content_type = "text/event-stream"),
    )
)]
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.exporter.subscribe();
    let stream = BroadcastStream::new(receiver);

    let sse_stream = stream.filter_map(|result| match result {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(json_data) => Some(Ok(SseEvent::default().event(event.name()).data(json_data))),
            Err(e) => {
                tracing::warn!("Failed to serialize event to JSON: {}", e);
                None
            }
        },
        Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!("SSE client lagged, skipped {} events", skipped);
            Some(Ok(SseEvent::default().event("error").data(format!(
                r#"{{"error":"lagged","skipped":{}}}"#,
                skipped
            ))))
        }
    });

    Sse::new(sse_stream).keep_alive(KeepAlive::default())
}

/// POST /shutdown - Graceful shutdown
///
/// Stops admitting new exports and cancels jobs still streaming. The
/// embedder observes the terminal `shutdown` event on the event stream.
#[utoipa::path(
    post,
    path = "/shutdown",
    tag = "system",
    responses(
        (status = 202, description = "Shutdown initiated"),
    )
)]
pub async fn shutdown(State(state): State<AppState>) -> impl IntoResponse {
    // Run the shutdown sequence in a background task so the response goes
    // out first
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        state.exporter.shutdown().await;
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({"status": "shutdown initiated"})),
    )
}
