//! Export trigger endpoints: the streaming download and the availability
//! check.
//!
//! The download endpoint waits for the first item on the job's chunk
//! channel before committing to a response. An error as the first item
//! becomes an ordinary JSON error response; a chunk commits the response to
//! a byte stream, and any later failure can only truncate it.

use std::collections::HashMap;

use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;
use utoipa::ToSchema;

use super::requester_from;
use crate::api::state::AppState;
use crate::exporter::ExportRequest;
use crate::types::{ClientId, ExportTarget, FlowId, JobInfo, ResourceRef};

/// Response for a duplicate trigger: the job is already running
#[derive(Debug, Serialize, ToSchema)]
pub struct AlreadyRunningResponse {
    /// Always `already_running`
    pub status: String,
    /// The job currently producing this export
    pub job: JobInfo,
}

/// Response for the availability check
#[derive(Debug, Serialize, ToSchema)]
pub struct ExportAvailableResponse {
    /// Whether triggering an export for this flow can produce output
    pub available: bool,
}

/// Stream a flow's export.
///
/// Query parameters: `target` selects the container (`archive` by default,
/// or a registered plugin id); all other parameters are passed through to
/// the plugin.
#[utoipa::path(
    get,
    path = "/clients/{client}/flows/{flow}/export",
    tag = "exports",
    params(
        ("client" = String, Path, description = "Client id, e.g. C.1000"),
        ("flow" = String, Path, description = "Flow id, e.g. F:AB12"),
        ("target" = Option<String>, Query, description = "Export container: archive (default) or a plugin id"),
    ),
    responses(
        (status = 200, description = "Export byte stream", content_type = "application/octet-stream"),
        (status = 400, description = "Unknown plugin or missing X-Requester header"),
        (status = 403, description = "No valid approval"),
        (status = 404, description = "Unknown resource or nothing to export"),
        (status = 409, description = "An identical export is already running", body = AlreadyRunningResponse),
        (status = 422, description = "Missing plugin parameter"),
        (status = 500, description = "Generation failed before streaming started"),
        (status = 503, description = "Shutdown in progress"),
    )
)]
pub async fn download_export(
    State(state): State<AppState>,
    Path((client, flow)): Path<(String, String)>,
    Query(mut query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let requester = match requester_from(&headers) {
        Ok(requester) => requester,
        Err(response) => return response,
    };
    let target = query
        .remove("target")
        .and_then(|s| s.parse::<ExportTarget>().ok())
        .unwrap_or(ExportTarget::Archive);
    let resource = ResourceRef::flow(ClientId::from(client.as_str()), FlowId::from(flow.as_str()));
    let request = ExportRequest {
        requester,
        resource,
        target,
        params: query,
    };

    let handle = match state.exporter.start_export(request).await {
        Ok(handle) => handle,
        Err(err) => return err.into_response(),
    };

    let Some(mut chunks) = handle.chunks else {
        // Duplicate trigger; the original caller keeps the stream
        let body = AlreadyRunningResponse {
            status: "already_running".to_string(),
            job: handle.job.info(),
        };
        return (StatusCode::CONFLICT, Json(body)).into_response();
    };

    // First channel item decides between a JSON error and a byte stream
    match chunks.recv().await {
        Some(Ok(first)) => {
            let rest = ReceiverStream::new(chunks).map(|item| item.map(Bytes::from));
            let stream = futures::stream::once(async move { Ok(Bytes::from(first)) }).chain(rest);
            let response_headers = [
                (header::CONTENT_TYPE, handle.content_type.clone()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", handle.filename),
                ),
            ];
            (response_headers, Body::from_stream(stream)).into_response()
        }
        Some(Err(err)) => err.into_response(),
        // Closed without a single item: the transform produced no output
        None => {
            let response_headers = [
                (header::CONTENT_TYPE, handle.content_type.clone()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", handle.filename),
                ),
            ];
            (response_headers, Body::empty()).into_response()
        }
    }
}

/// Whether an export of this flow would produce output.
///
/// Backs the UI affordance: false for unknown resources, empty collections,
/// and record kinds that cannot be archived.
#[utoipa::path(
    get,
    path = "/clients/{client}/flows/{flow}/export/available",
    tag = "exports",
    params(
        ("client" = String, Path, description = "Client id"),
        ("flow" = String, Path, description = "Flow id"),
    ),
    responses(
        (status = 200, description = "Availability flag", body = ExportAvailableResponse),
    )
)]
pub async fn export_available(
    State(state): State<AppState>,
    Path((client, flow)): Path<(String, String)>,
) -> Response {
    let resource = ResourceRef::flow(ClientId::from(client.as_str()), FlowId::from(flow.as_str()));
    match state.exporter.export_available(&resource).await {
        Ok(available) => Json(ExportAvailableResponse { available }).into_response(),
        Err(err) => err.into_response(),
    }
}
