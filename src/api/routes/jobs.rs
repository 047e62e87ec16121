//! Export job status endpoints.

use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};

use crate::api::state::AppState;
use crate::types::{ExportJobId, JobInfo};

/// List all known export jobs, oldest first.
///
/// Terminal jobs stay listed for the lifetime of the process.
#[utoipa::path(
    get,
    path = "/jobs",
    tag = "jobs",
    responses(
        (status = 200, description = "Job snapshots", body = [JobInfo]),
    )
)]
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobInfo>> {
    Json(state.exporter.list_jobs().await)
}

/// Status snapshot for one export job.
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    tag = "jobs",
    params(("id" = i64, Path, description = "Export job id")),
    responses(
        (status = 200, description = "Job snapshot", body = JobInfo),
        (status = 404, description = "No such job"),
    )
)]
pub async fn get_job(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.exporter.job(ExportJobId::new(id)).await {
        Ok(info) => Json(info).into_response(),
        Err(err) => err.into_response(),
    }
}
