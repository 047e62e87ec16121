//! Application state for the API server

use crate::{Config, FlowExporter};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned per request; both fields are cheap shared handles.
#[derive(Clone)]
pub struct AppState {
    /// The export pipeline instance
    pub exporter: FlowExporter,

    /// Configuration (read access)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(exporter: FlowExporter, config: Arc<Config>) -> Self {
        Self { exporter, config }
    }
}
