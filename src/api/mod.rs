//! REST API server
//!
//! A self-contained axum server over [`FlowExporter`], with optional API key
//! authentication, CORS, and a Swagger UI. Caller identity on principal-
//! scoped endpoints comes from the `X-Requester` header.

use crate::{Config, FlowExporter, Result};
use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;
#[cfg(test)]
mod tests;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Approvals
/// - `POST /approvals` - Create an approval request
/// - `POST /approvals/:id/grant` - Record a grant
/// - `GET /approvals/status` - Check the caller's authorization for a resource
/// - `DELETE /approvals` - Revoke the caller's grants for a resource
///
/// ## Exports
/// - `GET /clients/:client/flows/:flow/export` - Stream a flow's export
/// - `GET /clients/:client/flows/:flow/export/available` - Availability check
///
/// ## Jobs
/// - `GET /jobs` - List export jobs
/// - `GET /jobs/:id` - Get one job's status
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /plugins` - Registered export plugins
/// - `GET /notifications` - Recorded user notifications
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /events` - Server-sent events stream
/// - `POST /shutdown` - Graceful shutdown
pub fn create_router(exporter: FlowExporter, config: Arc<Config>) -> Router {
    let state = AppState::new(exporter, config.clone());

    // Build the router with all routes
    let router = Router::new()
        // Approvals
        .route("/approvals", post(routes::request_approval))
        .route("/approvals", delete(routes::revoke_approval))
        .route("/approvals/:id/grant", post(routes::grant_approval))
        .route("/approvals/status", get(routes::approval_status))
        // Exports
        .route(
            "/clients/:client/flows/:flow/export",
            get(routes::download_export),
        )
        .route(
            "/clients/:client/flows/:flow/export/available",
            get(routes::export_available),
        )
        // Jobs
        .route("/jobs", get(routes::list_jobs))
        .route("/jobs/:id", get(routes::get_job))
        // System
        .route("/health", get(routes::health_check))
        .route("/plugins", get(routes::list_plugins))
        .route("/notifications", get(routes::list_notifications))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream))
        .route("/shutdown", post(routes::shutdown));

    // Merge Swagger UI routes if enabled in config (before applying state)
    // Note: SwaggerUi will use the existing /openapi.json endpoint we already defined
    let router = if config.server.api.swagger_ui {
        router.merge(
            SwaggerUi::new("/swagger-ui")
                .config(utoipa_swagger_ui::Config::from("/openapi.json")),
        )
    } else {
        router
    };

    // Add state to all routes
    let router = router.with_state(state);

    // Apply authentication middleware if an API key is configured
    let router = if config.server.api.api_key.is_some() {
        router.layer(middleware::from_fn_with_state(
            config.server.api.api_key.clone(),
            auth::require_api_key,
        ))
    } else {
        router
    };

    // Apply CORS middleware if enabled in config
    if config.server.api.cors_enabled {
        let cors = build_cors_layer(&config.server.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// Supports "*" for any origin; otherwise only the listed origins are
/// allowed, with all methods and headers.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        // Allow all origins (default for local development)
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Creates a TCP listener, binds it to the configured address, and serves
/// the API router until the server stops.
///
/// # Example
///
/// ```no_run
/// use flow_export::{Config, FlowExporter};
/// use flow_export::plugins::ExportPluginRegistry;
/// use flow_export::results::InMemoryResultStore;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default();
/// let store = Arc::new(InMemoryResultStore::new());
/// let exporter = FlowExporter::new(config, store, ExportPluginRegistry::with_defaults())?;
///
/// // Start API server (blocks until shutdown)
/// flow_export::api::start_api_server(exporter).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(exporter: FlowExporter) -> Result<()> {
    let config = exporter.get_config();
    let bind_address = config.server.api.bind_address;

    tracing::info!(
        address = %bind_address,
        "Starting API server"
    );

    let app = create_router(exporter, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %bind_address,
        "API server listening"
    );

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))
}
