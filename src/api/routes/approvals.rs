//! Approval workflow endpoints: request, grant, status, revoke.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::{requester_from, resource_ref};
use crate::api::state::AppState;
use crate::approval::{ApprovalRequest, CheckResult};

/// Request body for creating an approval request
#[derive(Debug, Deserialize, ToSchema)]
pub struct RequestApprovalBody {
    /// Client the access is requested for
    pub client: String,

    /// Optional flow; approvals are recorded at client granularity either way
    #[serde(default)]
    pub flow: Option<String>,

    /// Identities allowed to grant the request
    pub approvers: Vec<String>,
}

/// An approval request as returned by the API
#[derive(Debug, Serialize, ToSchema)]
pub struct ApprovalRequestResponse {
    /// Unique request id, used to grant
    pub request_id: i64,
    /// The identity asking for access
    pub requester: String,
    /// Resource key the request covers
    pub resource: String,
    /// Identities allowed to grant
    pub approvers: Vec<String>,
    /// When the request was created
    pub created_at: DateTime<Utc>,
}

impl From<ApprovalRequest> for ApprovalRequestResponse {
    fn from(request: ApprovalRequest) -> Self {
        Self {
            request_id: request.id,
            requester: request.requester,
            resource: request.resource.key(),
            approvers: request.approvers.into_iter().collect(),
            created_at: request.created_at,
        }
    }
}

/// Outcome of recording a grant
#[derive(Debug, Serialize, ToSchema)]
pub struct GrantResponse {
    /// The request the grant was recorded on
    pub request_id: i64,
    /// Whether the quorum is now met
    pub satisfied: bool,
    /// When the authorization expires, once satisfied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Query parameters addressing a resource
#[derive(Debug, Deserialize, IntoParams)]
pub struct ResourceQuery {
    /// Client id, e.g. `C.1000`
    pub client: String,
    /// Optional flow id, e.g. `F:AB12`
    pub flow: Option<String>,
}

/// Current authorization state for a requester/resource pair
#[derive(Debug, Serialize, ToSchema)]
pub struct ApprovalStatusResponse {
    /// Whether the requester may export the resource right now
    pub authorized: bool,
    /// When the authorization lapses, if authorized
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Outcome of a revocation
#[derive(Debug, Serialize, ToSchema)]
pub struct RevokeResponse {
    /// Whether any grant was actually revoked
    pub revoked: bool,
}

/// Create an approval request.
///
/// The requester comes from `X-Requester`; the named approvers are notified
/// through the inbox and any configured webhook.
#[utoipa::path(
    post,
    path = "/approvals",
    tag = "approvals",
    request_body = RequestApprovalBody,
    responses(
        (status = 201, description = "Approval request created", body = ApprovalRequestResponse),
        (status = 400, description = "Missing X-Requester header"),
        (status = 409, description = "Requester already holds a valid approval"),
        (status = 422, description = "No approvers named"),
    )
)]
pub async fn request_approval(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RequestApprovalBody>,
) -> Response {
    let requester = match requester_from(&headers) {
        Ok(requester) => requester,
        Err(response) => return response,
    };
    let resource = resource_ref(&body.client, body.flow.as_deref());
    match state
        .exporter
        .request_approval(&requester, &resource, body.approvers)
        .await
    {
        Ok(request) => (
            StatusCode::CREATED,
            Json(ApprovalRequestResponse::from(request)),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

/// Record a grant on an approval request.
///
/// The granting identity comes from `X-Requester` and must be in the
/// request's approver set.
#[utoipa::path(
    post,
    path = "/approvals/{id}/grant",
    tag = "approvals",
    params(("id" = i64, Path, description = "Approval request id")),
    responses(
        (status = 200, description = "Grant recorded", body = GrantResponse),
        (status = 403, description = "Grantor is not an approver"),
        (status = 404, description = "No such approval request"),
        (status = 409, description = "Request already satisfied"),
    )
)]
pub async fn grant_approval(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let approver = match requester_from(&headers) {
        Ok(approver) => approver,
        Err(response) => return response,
    };
    match state.exporter.grant_approval(id, &approver).await {
        Ok(outcome) => Json(GrantResponse {
            request_id: outcome.request_id,
            satisfied: outcome.satisfied,
            expires_at: outcome.expires_at,
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

/// Check whether the caller currently holds a valid approval for a resource.
#[utoipa::path(
    get,
    path = "/approvals/status",
    tag = "approvals",
    params(ResourceQuery),
    responses(
        (status = 200, description = "Authorization state", body = ApprovalStatusResponse),
        (status = 400, description = "Missing X-Requester header"),
    )
)]
pub async fn approval_status(
    State(state): State<AppState>,
    Query(query): Query<ResourceQuery>,
    headers: HeaderMap,
) -> Response {
    let requester = match requester_from(&headers) {
        Ok(requester) => requester,
        Err(response) => return response,
    };
    let resource = resource_ref(&query.client, query.flow.as_deref());
    match state.exporter.check_approval(&requester, &resource).await {
        Ok(CheckResult::Authorized { expires_at }) => Json(ApprovalStatusResponse {
            authorized: true,
            expires_at: Some(expires_at),
        })
        .into_response(),
        Ok(CheckResult::Unauthorized) => Json(ApprovalStatusResponse {
            authorized: false,
            expires_at: None,
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

/// Revoke the caller's grants for a resource.
///
/// Idempotent; `revoked: false` means there was nothing to revoke.
#[utoipa::path(
    delete,
    path = "/approvals",
    tag = "approvals",
    params(ResourceQuery),
    responses(
        (status = 200, description = "Revocation outcome", body = RevokeResponse),
        (status = 400, description = "Missing X-Requester header"),
    )
)]
pub async fn revoke_approval(
    State(state): State<AppState>,
    Query(query): Query<ResourceQuery>,
    headers: HeaderMap,
) -> Response {
    let requester = match requester_from(&headers) {
        Ok(requester) => requester,
        Err(response) => return response,
    };
    let resource = resource_ref(&query.client, query.flow.as_deref());
    match state.exporter.revoke_approval(&requester, &resource).await {
        Ok(revoked) => Json(RevokeResponse { revoked }).into_response(),
        Err(err) => err.into_response(),
    }
}
