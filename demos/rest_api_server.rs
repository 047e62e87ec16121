//! REST API server example
//!
//! Runs flow-export with the REST API enabled, allowing control via HTTP.
//!
//! After starting, you can:
//! - View Swagger UI at http://localhost:6789/swagger-ui
//! - Request an approval via POST http://localhost:6789/approvals
//! - Stream an export via GET http://localhost:6789/clients/C.1000/flows/F:AB12/export
//! - Watch events via GET http://localhost:6789/events

use std::net::SocketAddr;
use std::sync::Arc;

use flow_export::api::start_api_server;
use flow_export::config::{ApiConfig, Config, ServerIntegrationConfig};
use flow_export::plugins::ExportPluginRegistry;
use flow_export::results::InMemoryResultStore;
use flow_export::types::{ClientId, FlowId, RecordKind, ResultRecord};
use flow_export::{FlowExporter, run_with_shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    // Configure the API
    let api_config = ApiConfig {
        bind_address: "127.0.0.1:6789".parse::<SocketAddr>()?,
        api_key: None, // No authentication for local use
        cors_enabled: true,
        cors_origins: vec!["*".to_string()],
        swagger_ui: true,
    };

    let config = Config {
        server: ServerIntegrationConfig { api: api_config },
        ..Default::default()
    };

    // Seed a store so there is something to export
    let store = Arc::new(InMemoryResultStore::new());
    let collection = store.add_flow(
        ClientId::from("C.1000"),
        FlowId::from("F:AB12"),
        RecordKind::File,
        Vec::new(),
    );
    collection.append(ResultRecord::new(
        "/etc/hosts",
        RecordKind::File,
        serde_json::json!({"size": 221}),
    ));

    let exporter = FlowExporter::new(config, store, ExportPluginRegistry::with_defaults())?;

    println!("API server on http://127.0.0.1:6789 (Swagger UI at /swagger-ui)");
    tokio::spawn(start_api_server(exporter.clone()));

    // Block until SIGTERM/SIGINT, then shut the pipeline down
    run_with_shutdown(exporter).await;
    Ok(())
}
