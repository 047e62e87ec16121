//! Export request dispatch: authorization, admission, and job start.
//!
//! Every trigger walks the same gate order: resource lookup, approval check
//! (or audited bypass), collection exportability, target resolution, then
//! the atomic dedup admission. Nothing before admission creates a job, so a
//! rejected request leaves no trace in the job table.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

use crate::error::{Error, GenerationError, Result};
use crate::exporter::FlowExporter;
use crate::exporter::generator::ChunkReceiver;
use crate::exporter::jobs::{Admission, ExportJob};
use crate::types::{Event, ExportTarget, ResourceRef};

/// A request to start (or re-trigger) an export.
#[derive(Clone, Debug)]
pub struct ExportRequest {
    /// Identity of the caller
    pub requester: String,
    /// The flow whose results are exported
    pub resource: ResourceRef,
    /// Target container
    pub target: ExportTarget,
    /// Target-specific parameters
    pub params: HashMap<String, String>,
}

impl ExportRequest {
    /// Request the built-in archive for a flow, with no parameters.
    pub fn archive(requester: impl Into<String>, resource: ResourceRef) -> Self {
        Self {
            requester: requester.into(),
            resource,
            target: ExportTarget::Archive,
            params: HashMap::new(),
        }
    }
}

/// Handle returned by [`FlowExporter::start_export`].
#[derive(Debug)]
pub struct ExportHandle {
    /// The admitted job, or the already-running one on a duplicate trigger
    pub job: Arc<ExportJob>,
    /// Whether this call created the job
    pub created: bool,
    /// MIME type of the produced stream
    pub content_type: String,
    /// Suggested download filename
    pub filename: String,
    /// Chunk channel to drain; present only when `created`
    pub chunks: Option<ChunkReceiver>,
}

impl FlowExporter {
    /// Start an export, returning the chunk channel to drain.
    ///
    /// A duplicate trigger for a key with a non-terminal job returns that
    /// job with `created: false` and no chunk channel; the original caller
    /// keeps the stream.
    pub async fn start_export(&self, request: ExportRequest) -> Result<ExportHandle> {
        if !self.accepting_new.load(Ordering::Acquire) {
            return Err(Error::ShuttingDown);
        }
        let ExportRequest {
            requester,
            resource,
            target,
            params,
        } = request;

        if !self.store.resource_exists(&resource).await? {
            return Err(Error::InvalidResource(resource.to_string()));
        }

        if self.approvals.is_bypass(&requester) {
            // Audited in the log and on the event bus; never silent
            warn!(
                requester = %requester,
                resource = %resource,
                target = %target,
                "approval check bypassed"
            );
            self.emit_event(Event::BypassUsed {
                requester: requester.clone(),
                resource: resource.key(),
                target: target.as_str().to_string(),
            });
        } else if !self.approvals.check(&requester, &resource).await?.is_authorized() {
            return Err(Error::AccessDenied {
                requester,
                resource: resource.to_string(),
            });
        }

        let collection = self.store.flow_results(&resource).await?;
        if !collection.is_exportable() || collection.count().await? == 0 {
            return Err(GenerationError::NothingToExport {
                resource: resource.to_string(),
            }
            .into());
        }

        // Resolve the transform before admission so an unknown plugin or a
        // missing parameter never creates a job.
        let transform = match &target {
            ExportTarget::Archive => self.archive_transform.clone(),
            ExportTarget::Plugin(id) => self.plugins.resolve(id, &params)?,
        };
        let content_type = transform.content_type().to_string();
        let filename = download_filename(&resource, &target, transform.file_extension());

        let job = match self.jobs.admit(&requester, &resource, &target).await {
            Admission::Existing(job) => {
                debug!(job_id = %job.id, "duplicate export trigger, job already running");
                return Ok(ExportHandle {
                    job,
                    created: false,
                    content_type,
                    filename,
                    chunks: None,
                });
            }
            Admission::Created(job) => job,
        };

        info!(
            job_id = %job.id,
            requester = %job.requester,
            resource = %resource,
            target = %target,
            "export job admitted"
        );
        self.emit_event(Event::JobCreated {
            id: job.id,
            resource: resource.key(),
            target: target.as_str().to_string(),
            requester: job.requester.clone(),
        });

        let chunks = self.generator.spawn(job.clone(), collection, transform, params);
        Ok(ExportHandle {
            job,
            created: true,
            content_type,
            filename,
            chunks: Some(chunks),
        })
    }

    /// Whether the resource has anything to export.
    ///
    /// The UI affordance check: false for unknown resources, empty
    /// collections, and record kinds that cannot be archived.
    pub async fn export_available(&self, resource: &ResourceRef) -> Result<bool> {
        if !self.store.resource_exists(resource).await? {
            return Ok(false);
        }
        let collection = match self.store.flow_results(resource).await {
            Ok(collection) => collection,
            Err(Error::InvalidResource(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        Ok(collection.is_exportable() && collection.count().await? > 0)
    }
}

fn download_filename(resource: &ResourceRef, target: &ExportTarget, extension: &str) -> String {
    let sanitize = |s: &str| -> String {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    };
    format!(
        "{}_{}.{}",
        sanitize(&resource.key()),
        sanitize(target.as_str()),
        extension
    )
}
