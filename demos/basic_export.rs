//! Basic export example
//!
//! Demonstrates the core flow-export workflow:
//! - Seeding an in-memory result store
//! - Requesting and granting an approval
//! - Triggering an export and draining the chunk stream
//! - Watching lifecycle events

use std::sync::Arc;

use flow_export::plugins::ExportPluginRegistry;
use flow_export::results::InMemoryResultStore;
use flow_export::types::{ClientId, FlowId, RecordKind, ResourceRef, ResultRecord};
use flow_export::{Config, Event, ExportRequest, FlowExporter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    // Seed a store with one flow's collected files
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
        serde_json::json!({"size": 221, "mode": "0644"}),
    ));
    collection.append(ResultRecord::new(
        "/etc/passwd",
        RecordKind::File,
        serde_json::json!({"size": 1803, "mode": "0644"}),
    ));

    let exporter = FlowExporter::new(
        Config::default(),
        store,
        ExportPluginRegistry::with_defaults(),
    )?;

    // Subscribe to events
    let mut events = exporter.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::JobCreated { id, resource, .. } => {
                    println!("job {id} created for {resource}");
                }
                Event::JobComplete { id, bytes_emitted } => {
                    println!("job {id} complete, {bytes_emitted} bytes");
                }
                Event::JobFailed { id, error, .. } => {
                    println!("job {id} failed: {error}");
                }
                other => println!("event: {other:?}"),
            }
        }
    });

    // alice asks for access, bob grants it
    let resource = ResourceRef::flow(ClientId::from("C.1000"), FlowId::from("F:AB12"));
    let request = exporter
        .request_approval("alice", &resource, vec!["bob".to_string()])
        .await?;
    println!("approval request {} created", request.id);
    let outcome = exporter.grant_approval(request.id, "bob").await?;
    println!("granted, satisfied: {}", outcome.satisfied);

    // Trigger the export and drain the stream
    let handle = exporter
        .start_export(ExportRequest::archive("alice", resource))
        .await?;
    println!("downloading {}", handle.filename);

    let mut total = 0usize;
    if let Some(mut chunks) = handle.chunks {
        while let Some(chunk) = chunks.recv().await {
            let bytes = chunk?;
            total += bytes.len();
        }
    }
    println!("received {total} bytes");

    Ok(())
}
