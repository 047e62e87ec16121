//! OpenAPI documentation and schema generation
//!
//! Defines the OpenAPI specification for the flow-export REST API using
//! utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the flow-export REST API
///
/// The spec can be accessed via:
/// - `/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "flow-export REST API",
        version = "0.1.0",
        description = "Approval-gated, streaming export of collected flow results",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6789", description = "Local development server")
    ),
    paths(
        // Approvals
        crate::api::routes::request_approval,
        crate::api::routes::grant_approval,
        crate::api::routes::approval_status,
        crate::api::routes::revoke_approval,

        // Exports
        crate::api::routes::download_export,
        crate::api::routes::export_available,

        // Jobs
        crate::api::routes::list_jobs,
        crate::api::routes::get_job,

        // System
        crate::api::routes::health_check,
        crate::api::routes::list_plugins,
        crate::api::routes::list_notifications,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
        crate::api::routes::shutdown,
    ),
    components(
        schemas(
            crate::api::routes::RequestApprovalBody,
            crate::api::routes::ApprovalRequestResponse,
            crate::api::routes::GrantResponse,
            crate::api::routes::ApprovalStatusResponse,
            crate::api::routes::RevokeResponse,
            crate::api::routes::AlreadyRunningResponse,
            crate::api::routes::ExportAvailableResponse,
            crate::api::routes::PluginListResponse,
            crate::error::ApiError,
            crate::error::ErrorDetail,
            crate::types::ClientId,
            crate::types::FlowId,
            crate::types::ResourceRef,
            crate::types::ExportJobId,
            crate::types::JobState,
            crate::types::JobInfo,
            crate::types::RecordKind,
            crate::types::ResultRecord,
            crate::types::UserNotification,
            crate::types::Event,
        )
    ),
    tags(
        (name = "approvals", description = "Approval workflow: request, grant, check, revoke"),
        (name = "exports", description = "Export triggering and streaming download"),
        (name = "jobs", description = "Export job status"),
        (name = "system", description = "Health, plugins, notifications, events, shutdown"),
    )
)]
pub struct ApiDoc;
