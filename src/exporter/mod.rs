//! The export pipeline facade.
//!
//! [`FlowExporter`] wires the approval engine, result store, plugin
//! registry, generator and notifier together behind one embeddable handle.
//! It is cheap to clone; all state lives behind shared references.

mod dispatch;
pub(crate) mod generator;
pub(crate) mod jobs;
mod notifications;
#[cfg(test)]
pub(crate) mod test_helpers;
#[cfg(test)]
mod tests;

pub use dispatch::{ExportHandle, ExportRequest};
pub use generator::{ChunkReceiver, ChunkSink};
pub use jobs::ExportJob;
pub use notifications::Notifier;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tracing::info;

use crate::approval::{ApprovalPolicyEngine, ApprovalRequest, CheckResult, GrantOutcome};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::exporter::generator::ArchiveGenerator;
use crate::exporter::jobs::JobTable;
use crate::plugins::{ExportPluginRegistry, ExportTransform, JsonLinesTransform};
use crate::results::ResultStore;
use crate::types::{Event, ExportJobId, JobInfo, ResourceRef, UserNotification};

/// Main entry point: the approval-gated export pipeline.
#[derive(Clone)]
pub struct FlowExporter {
    config: Arc<Config>,
    pub(crate) store: Arc<dyn ResultStore>,
    pub(crate) approvals: Arc<ApprovalPolicyEngine>,
    pub(crate) plugins: Arc<ExportPluginRegistry>,
    pub(crate) archive_transform: Arc<dyn ExportTransform>,
    pub(crate) generator: Arc<ArchiveGenerator>,
    pub(crate) jobs: Arc<JobTable>,
    notifier: Arc<Notifier>,
    event_tx: broadcast::Sender<Event>,
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl FlowExporter {
    /// Create an exporter over a result store.
    ///
    /// Validates the configuration up front; the registry is frozen from
    /// here on, so all plugin registration happens before this call.
    pub fn new(
        config: Config,
        store: Arc<dyn ResultStore>,
        plugins: ExportPluginRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let (event_tx, _) = broadcast::channel(256);
        let approvals = Arc::new(ApprovalPolicyEngine::new(
            &config.approval,
            store.clone(),
            event_tx.clone(),
        ));
        let notifier = Arc::new(Notifier::new(config.clone(), event_tx.clone()));
        let generator = Arc::new(ArchiveGenerator::new(
            config.clone(),
            event_tx.clone(),
            notifier.clone(),
        ));

        Ok(Self {
            config,
            store,
            approvals,
            plugins: Arc::new(plugins),
            archive_transform: Arc::new(JsonLinesTransform::new()),
            generator,
            jobs: Arc::new(JobTable::new()),
            notifier,
            event_tx,
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Subscribe to lifecycle events (jobs, approvals, bypass audit).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // Absence of subscribers is not an error
        self.event_tx.send(event).ok();
    }

    /// The active configuration
    pub fn get_config(&self) -> Arc<Config> {
        self.config.clone()
    }

    /// Registered export plugin ids, sorted
    pub fn plugin_ids(&self) -> Vec<String> {
        self.plugins.plugin_ids()
    }

    /// Create an approval request and notify the named approvers.
    pub async fn request_approval(
        &self,
        requester: &str,
        resource: &ResourceRef,
        approvers: Vec<String>,
    ) -> Result<ApprovalRequest> {
        let request = self
            .approvals
            .request_approval(requester, resource, approvers)
            .await?;
        self.notifier.approval_requested(&request);
        Ok(request)
    }

    /// Record a grant on an approval request.
    pub async fn grant_approval(&self, request_id: i64, approver: &str) -> Result<GrantOutcome> {
        self.approvals.grant(request_id, approver).await
    }

    /// Whether the requester currently holds a valid approval for the
    /// resource's owning client.
    pub async fn check_approval(
        &self,
        requester: &str,
        resource: &ResourceRef,
    ) -> Result<CheckResult> {
        self.approvals.check(requester, resource).await
    }

    /// Revoke the requester's grants for the resource's owning client.
    pub async fn revoke_approval(&self, requester: &str, resource: &ResourceRef) -> Result<bool> {
        self.approvals.revoke(requester, resource).await
    }

    /// Notifications addressed to one requester, oldest first
    pub fn notifications_for(&self, requester: &str) -> Vec<UserNotification> {
        self.notifier.notifications_for(requester)
    }

    /// All retained notifications, oldest first
    pub fn all_notifications(&self) -> Vec<UserNotification> {
        self.notifier.all_notifications()
    }

    /// Status snapshot for one job
    pub async fn job(&self, id: ExportJobId) -> Result<JobInfo> {
        self.jobs
            .get(id)
            .await
            .map(|job| job.info())
            .ok_or(Error::JobNotFound(id))
    }

    /// Status snapshots for all known jobs, oldest first
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        self.jobs.list().await
    }

    /// Graceful shutdown: stop admitting new exports and cancel the
    /// generation tasks of jobs still streaming.
    pub async fn shutdown(&self) {
        info!("shutting down, cancelling active export jobs");
        self.accepting_new.store(false, Ordering::Release);
        for job in self.jobs.active().await {
            job.cancel.cancel();
        }
        self.emit_event(Event::Shutdown);
    }
}
