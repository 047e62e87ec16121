//! API route handlers
//!
//! Handlers are grouped by concern: approvals, exports, jobs, and system.
//! Caller identity comes from the `X-Requester` header on every endpoint
//! that acts on behalf of a principal.

mod approvals;
mod exports;
mod jobs;
mod system;

pub use approvals::*;
pub use exports::*;
pub use jobs::*;
pub use system::*;

use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::types::{ClientId, FlowId, ResourceRef};

/// Extract the caller identity from the `X-Requester` header.
///
/// Authentication (the API key) says the caller may talk to the server at
/// all; this header says who the call is on behalf of, which is what the
/// approval engine checks.
pub(crate) fn requester_from(headers: &HeaderMap) -> Result<String, Response> {
    match headers.get("x-requester").and_then(|v| v.to_str().ok()) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ApiError::validation("missing X-Requester header").into_response()),
    }
}

/// Build a resource reference from a client id and an optional flow id.
pub(crate) fn resource_ref(client: &str, flow: Option<&str>) -> ResourceRef {
    match flow {
        Some(flow) => ResourceRef::flow(ClientId::from(client), FlowId::from(flow)),
        None => ResourceRef::client(ClientId::from(client)),
    }
}
