//! Error types for flow-export
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Approval, Generation, plugin lookup, etc.)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::ExportJobId;

/// Result type alias for flow-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for flow-export
///
/// Authorization and validation errors are surfaced immediately to the
/// caller and never downgraded to a notification. Generation errors follow
/// the two-phase rule: before any bytes flow, the call fails; after bytes
/// have flowed, the failure is reported out-of-band only.
#[derive(Debug, Error)]
pub enum Error {
    /// The requester holds no valid approval for the resource
    #[error("access denied: {requester} is not authorized for {resource}")]
    AccessDenied {
        /// The requester identity that was checked
        requester: String,
        /// Human-readable description of the resource
        resource: String,
    },

    /// The referenced resource does not exist
    #[error("invalid resource: {0}")]
    InvalidResource(String),

    /// No plugin registered under the requested id
    #[error("unknown export plugin: {0}")]
    UnknownPlugin(String),

    /// A plugin was already registered under this id
    #[error("duplicate export plugin: {0}")]
    DuplicatePlugin(String),

    /// A transform's required parameter was not supplied
    #[error("invalid parameters for plugin {plugin}: missing {missing}")]
    InvalidPluginParams {
        /// The plugin id the parameters were for
        plugin: String,
        /// The required parameter that was absent
        missing: String,
    },

    /// Approval workflow error
    #[error("approval error: {0}")]
    Approval(#[from] ApprovalError),

    /// Archive/export generation error
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "approval.quorum")
        key: Option<String>,
    },

    /// Export job not found
    #[error("export job not found: {0}")]
    JobNotFound(ExportJobId),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network error (webhook delivery)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Shutdown in progress - not accepting new export jobs
    #[error("shutdown in progress: not accepting new export jobs")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Approval-workflow errors
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// The approval request does not exist
    #[error("approval request {request_id} not found")]
    RequestNotFound {
        /// The request id that was not found
        request_id: i64,
    },

    /// The grantor is not in the request's configured approver set
    #[error("{approver} is not an approver on request {request_id}")]
    NotAnApprover {
        /// The identity that attempted to grant
        approver: String,
        /// The request the grant was attempted on
        request_id: i64,
    },

    /// The request already has a quorum of grants
    #[error("approval request {request_id} is already satisfied")]
    AlreadySatisfied {
        /// The satisfied request id
        request_id: i64,
    },

    /// The requester already holds a valid grant for the resource
    #[error("{requester} already holds a valid approval for {resource}")]
    AlreadyApproved {
        /// The requester that asked again
        requester: String,
        /// Human-readable description of the resource
        resource: String,
    },

    /// An approval request needs at least one approver
    #[error("approval request for {resource} names no approvers")]
    NoApprovers {
        /// Human-readable description of the resource
        resource: String,
    },
}

/// Export-generation errors, split along the two-phase failure boundary
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The collection is empty or its record type is not exportable;
    /// no job is admitted and the generator never leaves Init
    #[error("nothing to export for {resource}")]
    NothingToExport {
        /// Human-readable description of the resource
        resource: String,
    },

    /// The transform failed before any bytes were emitted.
    ///
    /// Surfaced synchronously to the caller; the job transitions to Failed.
    #[error("export generation failed before streaming started: {reason}")]
    PreStream {
        /// The failed job
        job_id: ExportJobId,
        /// The underlying failure
        reason: String,
    },

    /// The transform failed after bytes had already been streamed.
    ///
    /// The caller's stream is truncated; the failure is observable only via
    /// the notification sink.
    #[error("export generation failed after {chunks_emitted} chunk(s): {reason}")]
    MidStream {
        /// The failed job
        job_id: ExportJobId,
        /// Chunks that had already reached the caller
        chunks_emitted: u64,
        /// The underlying failure
        reason: String,
    },

    /// The caller disconnected while the job was streaming
    #[error("caller disconnected while streaming export job {job_id}")]
    CallerDisconnected {
        /// The abandoned job
        job_id: ExportJobId,
    },
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "access_denied",
///     "message": "access denied: alice is not authorized for client C.1000",
///     "details": {
///       "requester": "alice"
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "access_denied", "unknown_plugin")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 403 Forbidden - authorization failed, never retried automatically
            Error::AccessDenied { .. } => 403,
            Error::Approval(ApprovalError::NotAnApprover { .. }) => 403,

            // 404 Not Found
            Error::InvalidResource(_) => 404,
            Error::JobNotFound(_) => 404,
            Error::Approval(ApprovalError::RequestNotFound { .. }) => 404,
            Error::Generation(GenerationError::NothingToExport { .. }) => 404,

            // 409 Conflict - already in the requested state
            Error::DuplicatePlugin(_) => 409,
            Error::Approval(ApprovalError::AlreadySatisfied { .. }) => 409,
            Error::Approval(ApprovalError::AlreadyApproved { .. }) => 409,

            // 400/422 - caller errors
            Error::UnknownPlugin(_) => 400,
            Error::InvalidPluginParams { .. } => 422,
            Error::Approval(ApprovalError::NoApprovers { .. }) => 422,
            Error::Config { .. } => 400,

            // 500 Internal Server Error
            Error::Generation(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            // 502 Bad Gateway - external service errors
            Error::Network(_) => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::AccessDenied { .. } => "access_denied",
            Error::InvalidResource(_) => "invalid_resource",
            Error::UnknownPlugin(_) => "unknown_plugin",
            Error::DuplicatePlugin(_) => "duplicate_plugin",
            Error::InvalidPluginParams { .. } => "invalid_plugin_params",
            Error::Approval(e) => match e {
                ApprovalError::RequestNotFound { .. } => "approval_request_not_found",
                ApprovalError::NotAnApprover { .. } => "not_an_approver",
                ApprovalError::AlreadySatisfied { .. } => "already_satisfied",
                ApprovalError::AlreadyApproved { .. } => "already_approved",
                ApprovalError::NoApprovers { .. } => "no_approvers",
            },
            Error::Generation(e) => match e {
                GenerationError::NothingToExport { .. } => "nothing_to_export",
                GenerationError::PreStream { .. } => "pre_stream_failure",
                GenerationError::MidStream { .. } => "mid_stream_failure",
                GenerationError::CallerDisconnected { .. } => "caller_disconnected",
            },
            Error::Config { .. } => "config_error",
            Error::JobNotFound(_) => "job_not_found",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Network(_) => "network_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        // Add contextual details for specific error types
        let details = match &error {
            Error::AccessDenied {
                requester,
                resource,
            } => Some(serde_json::json!({
                "requester": requester,
                "resource": resource,
            })),
            Error::InvalidPluginParams { plugin, missing } => Some(serde_json::json!({
                "plugin": plugin,
                "missing": missing,
            })),
            Error::JobNotFound(id) => Some(serde_json::json!({
                "job_id": id,
            })),
            Error::Approval(ApprovalError::NotAnApprover {
                approver,
                request_id,
            }) => Some(serde_json::json!({
                "approver": approver,
                "request_id": request_id,
            })),
            Error::Approval(ApprovalError::AlreadySatisfied { request_id }) => {
                Some(serde_json::json!({
                    "request_id": request_id,
                }))
            }
            Error::Generation(GenerationError::MidStream {
                job_id,
                chunks_emitted,
                ..
            }) => Some(serde_json::json!({
                "job_id": job_id,
                "chunks_emitted": chunks_emitted,
            })),
            Error::Generation(GenerationError::PreStream { job_id, .. }) => {
                Some(serde_json::json!({
                    "job_id": job_id,
                }))
            }
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
