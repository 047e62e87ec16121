//! # flow-export
//!
//! Approval-gated, streaming export pipeline for collected flow results.
//!
//! ## Design Philosophy
//!
//! flow-export is designed to be:
//! - **Approval-first** - Exports of collected data pass an explicit,
//!   auditable authorization gate before a single byte flows
//! - **Streaming** - Archives are produced chunk by chunk with
//!   backpressure; nothing is buffered to disk
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding;
//!   an optional REST API server is included
//! - **Event-driven** - Consumers subscribe to lifecycle events, no
//!   polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use flow_export::{Config, ExportRequest, FlowExporter};
//! use flow_export::plugins::ExportPluginRegistry;
//! use flow_export::results::InMemoryResultStore;
//! use flow_export::types::{ClientId, FlowId, ResourceRef};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryResultStore::new());
//!     let exporter = FlowExporter::new(
//!         Config::default(),
//!         store,
//!         ExportPluginRegistry::with_defaults(),
//!     )?;
//!
//!     // Subscribe to events
//!     let mut events = exporter.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Request an approval, have it granted, then trigger an export:
//!     let resource = ResourceRef::flow(ClientId::from("C.1000"), FlowId::from("F:AB12"));
//!     let request = exporter
//!         .request_approval("alice", &resource, vec!["bob".to_string()])
//!         .await?;
//!     exporter.grant_approval(request.id, "bob").await?;
//!
//!     let handle = exporter
//!         .start_export(ExportRequest::archive("alice", resource))
//!         .await?;
//!     if let Some(mut chunks) = handle.chunks {
//!         while let Some(chunk) = chunks.recv().await {
//!             let bytes = chunk?;
//!             // write bytes somewhere
//!             let _ = bytes;
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Approval workflow engine
pub mod approval;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// The export pipeline: dispatch, job table, generation, notifications
pub mod exporter;
/// Export transform plugins and their registry
pub mod plugins;
/// Result collections and the backing store abstraction
pub mod results;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use approval::{Approval, ApprovalPolicyEngine, ApprovalRequest, CheckResult, GrantOutcome};
pub use config::{ApprovalConfig, Config, ExportConfig, NotificationConfig, WebhookConfig};
pub use error::{
    ApiError, ApprovalError, Error, ErrorDetail, GenerationError, Result, ToHttpStatus,
};
pub use exporter::{ChunkReceiver, ExportHandle, ExportRequest, FlowExporter};
pub use types::{
    ClientId, Event, ExportJobId, ExportTarget, FlowId, JobInfo, JobState, RecordKind,
    ResourceRef, ResultRecord, UserNotification,
};

/// Run the exporter until a termination signal arrives, then shut it down.
///
/// - **Unix:** waits on SIGTERM and SIGINT, degrading to whichever handler
///   could be registered.
/// - **Windows/other:** waits on Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use flow_export::{Config, FlowExporter, run_with_shutdown};
/// use flow_export::plugins::ExportPluginRegistry;
/// use flow_export::results::InMemoryResultStore;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let exporter = FlowExporter::new(
///         Config::default(),
///         Arc::new(InMemoryResultStore::new()),
///         ExportPluginRegistry::with_defaults(),
///     )?;
///
///     // Serve the REST API until a signal arrives
///     tokio::spawn(flow_export::api::start_api_server(exporter.clone()));
///     run_with_shutdown(exporter).await;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(exporter: FlowExporter) {
    wait_for_signal().await;
    exporter.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Handler registration can fail in sandboxed environments
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("SIGTERM received, shutting down");
                }
                _ = sigint.recv() => {
                    tracing::info!("SIGINT received, shutting down");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, listening for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("SIGINT received, shutting down");
            } else {
                tracing::error!("No signal handlers could be registered, falling back to ctrl_c");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "SIGINT handler unavailable, listening for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("SIGTERM received, shutting down");
            } else {
                tracing::error!("No signal handlers could be registered, falling back to ctrl_c");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Ctrl+C received, shutting down");
        }
        Err(e) => {
            tracing::error!(error = %e, "Unable to listen for Ctrl+C");
        }
    }
}
