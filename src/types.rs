//! Core types for flow-export

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Unique identifier for a monitored client (the owning resource of a flow)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    /// Create a new ClientId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Unique identifier for a flow (one unit of collection work) on a client
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct FlowId(pub String);

impl FlowId {
    /// Create a new FlowId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FlowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FlowId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Reference to the entity an export pertains to: a client, and optionally
/// one specific flow on that client.
///
/// Immutable once constructed. Approvals are recorded against the client;
/// exports are started against a (client, flow) pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct ResourceRef {
    /// The owning client
    pub client: ClientId,

    /// The specific flow, when the reference targets one flow's results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<FlowId>,
}

impl ResourceRef {
    /// Reference a client as a whole (the granularity approvals are granted at)
    pub fn client(client: ClientId) -> Self {
        Self { client, flow: None }
    }

    /// Reference one flow's results on a client
    pub fn flow(client: ClientId, flow: FlowId) -> Self {
        Self {
            client,
            flow: Some(flow),
        }
    }

    /// The client-level reference for this resource.
    ///
    /// Approval checks are evaluated at client granularity, so a flow-level
    /// reference authorizes against its owning client.
    pub fn owner(&self) -> ResourceRef {
        ResourceRef::client(self.client.clone())
    }

    /// Stable string key for indexing (job tables, approval grants)
    pub fn key(&self) -> String {
        match &self.flow {
            Some(flow) => format!("{}/{}", self.client, flow),
            None => self.client.to_string(),
        }
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.flow {
            Some(flow) => write!(f, "flow {} on client {}", flow, self.client),
            None => write!(f, "client {}", self.client),
        }
    }
}

/// Unique identifier for an export job
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct ExportJobId(pub i64);

impl ExportJobId {
    /// Create a new ExportJobId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ExportJobId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ExportJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ExportJobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Export job state machine: `Init → Streaming → {Complete | Failed}`
///
/// Terminal states are final; a job never resumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Admitted, no chunk produced yet
    Init,
    /// At least one chunk has been produced
    Streaming,
    /// All chunks delivered
    Complete,
    /// Generation failed or the caller disconnected
    Failed,
}

impl JobState {
    /// Whether this state is terminal (Complete or Failed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Init => "init",
            JobState::Streaming => "streaming",
            JobState::Complete => "complete",
            JobState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Target container for an export: the built-in archive, or a registered plugin
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExportTarget {
    /// The built-in streaming archive (deterministic record serialization)
    Archive,
    /// A registered export plugin, e.g. `csv-zip`
    Plugin(String),
}

impl ExportTarget {
    /// The wire name of this target ("archive" or the plugin id)
    pub fn as_str(&self) -> &str {
        match self {
            ExportTarget::Archive => "archive",
            ExportTarget::Plugin(id) => id,
        }
    }
}

impl std::fmt::Display for ExportTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ExportTarget {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s == "archive" {
            Ok(ExportTarget::Archive)
        } else {
            Ok(ExportTarget::Plugin(s.to_string()))
        }
    }
}

impl Serialize for ExportTarget {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ExportTarget {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        // FromStr is infallible for targets
        Ok(s.parse().unwrap_or(ExportTarget::Archive))
    }
}

/// Type descriptor of a result record, used to decide exportability
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A collected file (stat entry plus referenced contents)
    File,
    /// A log line produced during collection
    Log,
    /// An observed network connection (metadata only, nothing to archive)
    NetworkConnection,
}

impl RecordKind {
    /// Whether records of this kind can be packaged into an export
    pub fn is_exportable(&self) -> bool {
        match self {
            RecordKind::File | RecordKind::Log => true,
            RecordKind::NetworkConnection => false,
        }
    }

    /// Stable wire name for the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::File => "file",
            RecordKind::Log => "log",
            RecordKind::NetworkConnection => "network_connection",
        }
    }
}

/// One unit of collected data, produced by the task-execution engine.
///
/// The export core only reads these, never mutates them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResultRecord {
    /// Entry name within the export (e.g. a collected file path)
    pub name: String,

    /// Type descriptor used to decide exportability
    pub kind: RecordKind,

    /// Record payload, opaque to the export core
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
}

impl ResultRecord {
    /// Create a new result record
    pub fn new(name: impl Into<String>, kind: RecordKind, data: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            kind,
            data,
        }
    }
}

/// Snapshot of an export job, the queryable UI status surface.
///
/// The front end uses `state` to disable a duplicate-trigger control and
/// `error` to show failure text.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobInfo {
    /// Unique job identifier
    pub id: ExportJobId,

    /// The resource the export pertains to
    pub resource: ResourceRef,

    /// Identity of the requester that started the job
    pub requester: String,

    /// Target container ("archive" or a plugin id)
    pub target: String,

    /// Current state
    pub state: JobState,

    /// Chunks emitted so far
    pub chunks_emitted: u64,

    /// Bytes emitted so far
    pub bytes_emitted: u64,

    /// When the job was admitted
    pub created_at: DateTime<Utc>,

    /// Failure text, present once the job is Failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A recorded user notification (out-of-band failure/completion reporting)
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct UserNotification {
    /// The requester the notification is addressed to
    pub requester: String,

    /// Human-readable description of the resource involved
    pub resource: String,

    /// Notification text
    pub message: String,

    /// When the notification was recorded
    pub timestamp: DateTime<Utc>,
}

/// Event emitted during the export and approval lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An export job was admitted
    JobCreated {
        /// Job ID
        id: ExportJobId,
        /// Resource key ("client/flow")
        resource: String,
        /// Target container name
        target: String,
        /// Requester identity
        requester: String,
    },

    /// A job produced its first chunk and entered Streaming
    JobStreaming {
        /// Job ID
        id: ExportJobId,
    },

    /// A job delivered all chunks
    JobComplete {
        /// Job ID
        id: ExportJobId,
        /// Total bytes delivered
        bytes_emitted: u64,
    },

    /// A job failed (before or after its first chunk)
    JobFailed {
        /// Job ID
        id: ExportJobId,
        /// Error message
        error: String,
        /// Chunks that had already reached the caller
        chunks_emitted: u64,
    },

    /// An approval request was created
    ApprovalRequested {
        /// Approval request ID
        request_id: i64,
        /// Requester identity
        requester: String,
        /// Resource key
        resource: String,
    },

    /// An approver recorded a grant
    ApprovalGranted {
        /// Approval request ID
        request_id: i64,
        /// Approver identity
        approver: String,
        /// Whether the quorum is now met
        satisfied: bool,
    },

    /// A grant was revoked
    ApprovalRevoked {
        /// Requester identity
        requester: String,
        /// Resource key
        resource: String,
    },

    /// A privileged caller skipped the approval check (audit record)
    BypassUsed {
        /// Requester identity
        requester: String,
        /// Resource key
        resource: String,
        /// Target container name
        target: String,
    },

    /// Webhook notification delivery failed
    NotificationFailed {
        /// Webhook URL
        url: String,
        /// Error message
        error: String,
    },

    /// Graceful shutdown initiated
    Shutdown,
}

impl Event {
    /// Stable wire name for the event, used as the SSE event type
    pub fn name(&self) -> &'static str {
        match self {
            Event::JobCreated { .. } => "job_created",
            Event::JobStreaming { .. } => "job_streaming",
            Event::JobComplete { .. } => "job_complete",
            Event::JobFailed { .. } => "job_failed",
            Event::ApprovalRequested { .. } => "approval_requested",
            Event::ApprovalGranted { .. } => "approval_granted",
            Event::ApprovalRevoked { .. } => "approval_revoked",
            Event::BypassUsed { .. } => "bypass_used",
            Event::NotificationFailed { .. } => "notification_failed",
            Event::Shutdown => "shutdown",
        }
    }
}

/// Payload sent to notification webhooks
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct NotificationPayload {
    /// Event type (failed, complete, approval_requested)
    pub event: String,

    /// Requester identity the notification concerns
    pub requester: String,

    /// Human-readable description of the resource
    pub resource: String,

    /// Notification text
    pub message: String,

    /// Export job ID, when the notification concerns a job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<ExportJobId>,

    /// Timestamp of the event (Unix timestamp in seconds)
    pub timestamp: i64,
}
