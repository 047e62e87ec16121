//! Export transforms and the plugin registry.
//!
//! A transform turns one result collection into a container byte stream.
//! The default archive transform ships in [`json_lines`]; additional
//! container formats are registered as plugins and selected per request by
//! id. Registration happens once at startup, before the registry is shared;
//! after that the registry is read-only.

mod csv_zip;
mod json_lines;

pub use csv_zip::CsvZipTransform;
pub use json_lines::JsonLinesTransform;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::exporter::ChunkSink;
use crate::results::ResultCollection;

/// A container format for exported result records.
///
/// `generate` consumes the collection exactly once and emits the container
/// bytes through the sink in order. Implementations should emit
/// incrementally where the format allows; buffering formats use
/// [`ChunkSink::chunk_size`] to split their output.
#[async_trait]
pub trait ExportTransform: Send + Sync {
    /// Registry id, unique per process.
    fn name(&self) -> &str;

    /// MIME type of the produced byte stream.
    fn content_type(&self) -> &str {
        "application/octet-stream"
    }

    /// Filename extension suggested for downloads.
    fn file_extension(&self) -> &str {
        "bin"
    }

    /// Parameter keys that must be present in the export request.
    fn required_params(&self) -> &[&str] {
        &[]
    }

    /// Produce the container bytes for one collection.
    async fn generate(
        &self,
        collection: Arc<dyn ResultCollection>,
        params: &HashMap<String, String>,
        sink: &mut ChunkSink,
    ) -> Result<()>;
}

impl std::fmt::Debug for dyn ExportTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportTransform")
            .field("name", &self.name())
            .finish()
    }
}

/// Registry of export transforms, keyed by plugin id.
pub struct ExportPluginRegistry {
    transforms: HashMap<String, Arc<dyn ExportTransform>>,
}

impl ExportPluginRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            transforms: HashMap::new(),
        }
    }

    /// Registry with the built-in plugins (currently `csv-zip`).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        // Fresh registry, the builtin id cannot collide
        let _ = registry.register(Arc::new(CsvZipTransform::new()));
        registry
    }

    /// Register a transform under its own name.
    ///
    /// Ids are first-come-first-served: a second registration under an
    /// already-taken id is rejected and the existing transform stays.
    pub fn register(&mut self, transform: Arc<dyn ExportTransform>) -> Result<()> {
        let name = transform.name().to_string();
        if self.transforms.contains_key(&name) {
            return Err(Error::DuplicatePlugin(name));
        }
        self.transforms.insert(name, transform);
        Ok(())
    }

    /// Look up a transform by id.
    pub fn get(&self, id: &str) -> Result<Arc<dyn ExportTransform>> {
        self.transforms
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownPlugin(id.to_string()))
    }

    /// Look up a transform and check the request's parameters against its
    /// required set. Both failure modes reject before any job is created.
    pub fn resolve(
        &self,
        id: &str,
        params: &HashMap<String, String>,
    ) -> Result<Arc<dyn ExportTransform>> {
        let transform = self.get(id)?;
        validate_params(transform.as_ref(), params)?;
        Ok(transform)
    }

    /// Registered plugin ids, sorted.
    pub fn plugin_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.transforms.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for ExportPluginRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Check a parameter map against a transform's required keys, failing on
/// the first missing one.
pub fn validate_params(
    transform: &dyn ExportTransform,
    params: &HashMap<String, String>,
) -> Result<()> {
    for key in transform.required_params() {
        if !params.contains_key(*key) {
            return Err(Error::InvalidPluginParams {
                plugin: transform.name().to_string(),
                missing: (*key).to_string(),
            });
        }
    }
    Ok(())
}
