//! Export job records and the active-job table.
//!
//! The job table is the dedup point for duplicate triggers: admission is a
//! single atomic check-and-insert keyed on (requester, resource, target),
//! so two near-simultaneous requests can never both create a job.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

use crate::types::{ExportJobId, ExportTarget, JobInfo, JobState, ResourceRef};

/// One in-flight or completed generation attempt.
///
/// State transitions are `Init → Streaming → {Complete | Failed}`; terminal
/// states are final and later transition attempts are ignored. A transform
/// that succeeds without emitting any chunk skips Streaming and completes
/// straight from Init; the download surface serves such a job as an empty
/// body with the usual content headers.
#[derive(Debug)]
pub struct ExportJob {
    /// Unique job identifier
    pub id: ExportJobId,
    /// The resource being exported
    pub resource: ResourceRef,
    /// Identity of the requester that started the job
    pub requester: String,
    /// Target container
    pub target: ExportTarget,
    /// When the job was admitted
    pub created_at: DateTime<Utc>,
    /// Cancelled when the exporter shuts down
    pub(crate) cancel: CancellationToken,

    state: std::sync::Mutex<JobState>,
    error: std::sync::Mutex<Option<String>>,
    chunks_emitted: AtomicU64,
    bytes_emitted: AtomicU64,
}

impl ExportJob {
    pub(crate) fn new(
        id: ExportJobId,
        resource: ResourceRef,
        requester: String,
        target: ExportTarget,
    ) -> Self {
        Self {
            id,
            resource,
            requester,
            target,
            created_at: Utc::now(),
            cancel: CancellationToken::new(),
            state: std::sync::Mutex::new(JobState::Init),
            error: std::sync::Mutex::new(None),
            chunks_emitted: AtomicU64::new(0),
            bytes_emitted: AtomicU64::new(0),
        }
    }

    /// Current state
    pub fn state(&self) -> JobState {
        self.state.lock().map(|s| *s).unwrap_or(JobState::Failed)
    }

    /// Chunks emitted so far
    pub fn chunks_emitted(&self) -> u64 {
        self.chunks_emitted.load(Ordering::Acquire)
    }

    /// Bytes emitted so far
    pub fn bytes_emitted(&self) -> u64 {
        self.bytes_emitted.load(Ordering::Acquire)
    }

    /// Transition Init → Streaming. Returns true on the first call only.
    pub(crate) fn begin_streaming(&self) -> bool {
        if let Ok(mut state) = self.state.lock() {
            if *state == JobState::Init {
                *state = JobState::Streaming;
                return true;
            }
        }
        false
    }

    /// Transition to Complete, unless already terminal.
    ///
    /// Reachable from Init as well as Streaming: a transform may finish
    /// successfully with zero output, in which case the caller drains an
    /// empty channel and the job records no chunks.
    pub(crate) fn complete(&self) {
        if let Ok(mut state) = self.state.lock() {
            if !state.is_terminal() {
                *state = JobState::Complete;
            }
        }
    }

    /// Transition to Failed with an error message, unless already terminal.
    pub(crate) fn fail(&self, message: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            if !state.is_terminal() {
                *state = JobState::Failed;
                if let Ok(mut error) = self.error.lock() {
                    *error = Some(message.into());
                }
            }
        }
    }

    /// Account one delivered chunk.
    pub(crate) fn record_chunk(&self, len: usize) {
        self.chunks_emitted.fetch_add(1, Ordering::AcqRel);
        self.bytes_emitted.fetch_add(len as u64, Ordering::AcqRel);
    }

    /// Snapshot for the UI status surface.
    pub fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id,
            resource: self.resource.clone(),
            requester: self.requester.clone(),
            target: self.target.as_str().to_string(),
            state: self.state(),
            chunks_emitted: self.chunks_emitted(),
            bytes_emitted: self.bytes_emitted(),
            created_at: self.created_at,
            error: self.error.lock().ok().and_then(|e| e.clone()),
        }
    }
}

/// Key identifying at most one non-terminal job at a time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct JobKey {
    requester: String,
    resource: String,
    target: String,
}

/// Outcome of an admission attempt.
pub(crate) enum Admission {
    /// A new job was created; the caller must start its generation task.
    Created(Arc<ExportJob>),
    /// A non-terminal job already exists for the key; no new job created.
    Existing(Arc<ExportJob>),
}

/// Index of export jobs, current and recent.
///
/// Jobs stay queryable by id after reaching a terminal state; a terminal
/// job no longer blocks admission for its key.
pub(crate) struct JobTable {
    inner: tokio::sync::Mutex<JobTableInner>,
    next_id: AtomicI64,
}

struct JobTableInner {
    by_key: HashMap<JobKey, Arc<ExportJob>>,
    by_id: HashMap<ExportJobId, Arc<ExportJob>>,
}

impl JobTable {
    pub(crate) fn new() -> Self {
        Self {
            inner: tokio::sync::Mutex::new(JobTableInner {
                by_key: HashMap::new(),
                by_id: HashMap::new(),
            }),
            next_id: AtomicI64::new(1),
        }
    }

    /// Atomic check-and-insert for (requester, resource, target).
    ///
    /// Held under one lock so two near-simultaneous triggers cannot both
    /// pass the "no existing job" check.
    pub(crate) async fn admit(
        &self,
        requester: &str,
        resource: &ResourceRef,
        target: &ExportTarget,
    ) -> Admission {
        let key = JobKey {
            requester: requester.to_string(),
            resource: resource.key(),
            target: target.as_str().to_string(),
        };

        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.by_key.get(&key) {
            if !existing.state().is_terminal() {
                return Admission::Existing(existing.clone());
            }
        }

        let id = ExportJobId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let job = Arc::new(ExportJob::new(
            id,
            resource.clone(),
            requester.to_string(),
            target.clone(),
        ));
        inner.by_key.insert(key, job.clone());
        inner.by_id.insert(id, job.clone());
        Admission::Created(job)
    }

    pub(crate) async fn get(&self, id: ExportJobId) -> Option<Arc<ExportJob>> {
        self.inner.lock().await.by_id.get(&id).cloned()
    }

    pub(crate) async fn list(&self) -> Vec<JobInfo> {
        let inner = self.inner.lock().await;
        let mut jobs: Vec<JobInfo> = inner.by_id.values().map(|j| j.info()).collect();
        jobs.sort_by_key(|j| j.id);
        jobs
    }

    pub(crate) async fn active(&self) -> Vec<Arc<ExportJob>> {
        let inner = self.inner.lock().await;
        inner
            .by_id
            .values()
            .filter(|j| !j.state().is_terminal())
            .cloned()
            .collect()
    }
}
