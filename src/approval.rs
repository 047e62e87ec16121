//! Approval policy engine
//!
//! Holds approval state for (requester, resource) pairs and answers whether
//! a caller is currently authorized for a resource. Approvals are granted at
//! client granularity: a flow-level [`ResourceRef`] authorizes against its
//! owning client.
//!
//! `check` is evaluated fresh on every export-triggering call — grants can
//! expire or be revoked between calls, so nothing is cached beyond the
//! validity window recorded on the grant itself.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::ApprovalConfig;
use crate::error::{ApprovalError, Error, Result};
use crate::results::ResultStore;
use crate::types::{Event, ResourceRef};

/// An approval request: a requester asking for access to a resource,
/// to be granted by a quorum of the named approvers.
///
/// Never mutated after creation; grants are recorded separately.
#[derive(Clone, Debug)]
pub struct ApprovalRequest {
    /// Unique request id
    pub id: i64,
    /// The identity asking for access
    pub requester: String,
    /// The resource access is requested for (client granularity)
    pub resource: ResourceRef,
    /// Identities allowed to grant this request
    pub approvers: BTreeSet<String>,
    /// When the request was created
    pub created_at: DateTime<Utc>,
}

/// One recorded grant on an approval request. Append-only.
#[derive(Clone, Debug)]
pub struct Approval {
    /// The identity that granted
    pub approver: String,
    /// When the grant was recorded
    pub granted_at: DateTime<Utc>,
}

/// Outcome of recording a grant
#[derive(Clone, Debug)]
pub struct GrantOutcome {
    /// The request the grant was recorded on
    pub request_id: i64,
    /// Whether the quorum is now met
    pub satisfied: bool,
    /// When the resulting authorization expires, once satisfied
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of an authorization check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckResult {
    /// The requester holds a satisfied, unexpired, unrevoked grant
    Authorized {
        /// When the grant expires; the requester must be re-checked after
        expires_at: DateTime<Utc>,
    },
    /// No valid grant exists
    Unauthorized,
}

impl CheckResult {
    /// Whether this result authorizes the call
    pub fn is_authorized(&self) -> bool {
        matches!(self, CheckResult::Authorized { .. })
    }
}

struct RequestState {
    request: ApprovalRequest,
    approvals: Vec<Approval>,
    satisfied_at: Option<DateTime<Utc>>,
    revoked: bool,
}

impl RequestState {
    fn expires_at(&self, validity: Duration) -> Option<DateTime<Utc>> {
        let satisfied_at = self.satisfied_at?;
        let window = chrono::Duration::from_std(validity)
            .unwrap_or_else(|_| chrono::Duration::days(365_000));
        Some(satisfied_at + window)
    }
}

/// Holds approval records and evaluates authorization, quorum and expiry.
pub struct ApprovalPolicyEngine {
    quorum: usize,
    validity: Duration,
    allow_self_approval: bool,
    bypass_principals: HashSet<String>,
    store: Arc<dyn ResultStore>,
    event_tx: tokio::sync::broadcast::Sender<Event>,
    requests: RwLock<HashMap<i64, RequestState>>,
    next_id: AtomicI64,
}

impl ApprovalPolicyEngine {
    /// Create an engine from configuration.
    ///
    /// `store` is consulted for resource existence; `event_tx` carries
    /// approval lifecycle and bypass audit events.
    pub fn new(
        config: &ApprovalConfig,
        store: Arc<dyn ResultStore>,
        event_tx: tokio::sync::broadcast::Sender<Event>,
    ) -> Self {
        Self {
            quorum: config.quorum,
            validity: config.validity_window,
            allow_self_approval: config.allow_self_approval,
            bypass_principals: config.bypass_principals.iter().cloned().collect(),
            store,
            event_tx,
            requests: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Whether the requester is a privileged/automated caller exempt from
    /// interactive approval checks.
    ///
    /// Callers of this predicate must still record the bypass for audit;
    /// [`FlowExporter::start_export`](crate::FlowExporter::start_export)
    /// does so via [`Event::BypassUsed`] and the tracing log.
    pub fn is_bypass(&self, requester: &str) -> bool {
        self.bypass_principals.contains(requester)
    }

    /// Create an approval request.
    ///
    /// Fails with [`Error::InvalidResource`] if the owning client does not
    /// exist and with [`ApprovalError::AlreadyApproved`] if the requester
    /// already holds a valid grant.
    pub async fn request_approval(
        &self,
        requester: &str,
        resource: &ResourceRef,
        approvers: Vec<String>,
    ) -> Result<ApprovalRequest> {
        let owner = resource.owner();
        if approvers.is_empty() {
            return Err(ApprovalError::NoApprovers {
                resource: owner.to_string(),
            }
            .into());
        }
        if !self.store.resource_exists(&owner).await? {
            return Err(Error::InvalidResource(owner.to_string()));
        }
        if self.check(requester, resource).await?.is_authorized() {
            return Err(ApprovalError::AlreadyApproved {
                requester: requester.to_string(),
                resource: owner.to_string(),
            }
            .into());
        }

        let request = ApprovalRequest {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            requester: requester.to_string(),
            resource: owner.clone(),
            approvers: approvers.into_iter().collect(),
            created_at: Utc::now(),
        };

        let mut requests = self.requests.write().await;
        requests.insert(
            request.id,
            RequestState {
                request: request.clone(),
                approvals: Vec::new(),
                satisfied_at: None,
                revoked: false,
            },
        );
        drop(requests);

        tracing::info!(
            request_id = request.id,
            requester = %request.requester,
            resource = %owner,
            "approval requested"
        );
        self.event_tx
            .send(Event::ApprovalRequested {
                request_id: request.id,
                requester: request.requester.clone(),
                resource: owner.key(),
            })
            .ok();

        Ok(request)
    }

    /// Record a grant by `approver` on the request.
    ///
    /// A repeated grant by the same approver is a no-op. Once the quorum of
    /// distinct approvers is met the request is satisfied and the grant is
    /// valid until the configured validity window elapses.
    pub async fn grant(&self, request_id: i64, approver: &str) -> Result<GrantOutcome> {
        let mut requests = self.requests.write().await;
        let state = requests
            .get_mut(&request_id)
            .ok_or(ApprovalError::RequestNotFound { request_id })?;

        if state.satisfied_at.is_some() {
            return Err(ApprovalError::AlreadySatisfied { request_id }.into());
        }
        if !state.request.approvers.contains(approver) {
            return Err(ApprovalError::NotAnApprover {
                approver: approver.to_string(),
                request_id,
            }
            .into());
        }
        if !self.allow_self_approval && approver == state.request.requester {
            return Err(ApprovalError::NotAnApprover {
                approver: approver.to_string(),
                request_id,
            }
            .into());
        }

        if !state.approvals.iter().any(|a| a.approver == approver) {
            state.approvals.push(Approval {
                approver: approver.to_string(),
                granted_at: Utc::now(),
            });
        }

        let satisfied = state.approvals.len() >= self.quorum;
        if satisfied {
            state.satisfied_at = Some(Utc::now());
        }
        let expires_at = state.expires_at(self.validity);
        let requester = state.request.requester.clone();
        drop(requests);

        tracing::info!(
            request_id,
            approver = %approver,
            requester = %requester,
            satisfied,
            "approval granted"
        );
        self.event_tx
            .send(Event::ApprovalGranted {
                request_id,
                approver: approver.to_string(),
                satisfied,
            })
            .ok();

        Ok(GrantOutcome {
            request_id,
            satisfied,
            expires_at: if satisfied { expires_at } else { None },
        })
    }

    /// Answer whether `requester` currently holds a valid grant for the
    /// resource's owning client.
    ///
    /// Evaluated fresh on every call: expiry and revocation take effect
    /// immediately on the next check.
    pub async fn check(&self, requester: &str, resource: &ResourceRef) -> Result<CheckResult> {
        let owner_key = resource.owner().key();
        let now = Utc::now();
        let requests = self.requests.read().await;

        let best = requests
            .values()
            .filter(|s| {
                !s.revoked
                    && s.request.requester == requester
                    && s.request.resource.key() == owner_key
            })
            .filter_map(|s| s.expires_at(self.validity))
            .filter(|expires_at| *expires_at > now)
            .max();

        Ok(match best {
            Some(expires_at) => CheckResult::Authorized { expires_at },
            None => CheckResult::Unauthorized,
        })
    }

    /// Revoke every satisfied grant `requester` holds for the resource's
    /// owning client. Returns whether any grant was revoked.
    pub async fn revoke(&self, requester: &str, resource: &ResourceRef) -> Result<bool> {
        let owner_key = resource.owner().key();
        let mut revoked_any = false;

        let mut requests = self.requests.write().await;
        for state in requests.values_mut() {
            if !state.revoked
                && state.satisfied_at.is_some()
                && state.request.requester == requester
                && state.request.resource.key() == owner_key
            {
                state.revoked = true;
                revoked_any = true;
            }
        }
        drop(requests);

        if revoked_any {
            tracing::info!(requester = %requester, resource = %owner_key, "approval revoked");
            self.event_tx
                .send(Event::ApprovalRevoked {
                    requester: requester.to_string(),
                    resource: owner_key,
                })
                .ok();
        }
        Ok(revoked_any)
    }

    /// Snapshot of a request's recorded approvals (for inspection/tests)
    pub async fn approvals_for(&self, request_id: i64) -> Result<Vec<Approval>> {
        let requests = self.requests.read().await;
        let state = requests
            .get(&request_id)
            .ok_or(ApprovalError::RequestNotFound { request_id })?;
        Ok(state.approvals.clone())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::InMemoryResultStore;
    use crate::types::{ClientId, FlowId};

    fn engine_with(config: ApprovalConfig) -> ApprovalPolicyEngine {
        let store = Arc::new(InMemoryResultStore::new());
        store.add_client(ClientId::from("C.1"));
        let (event_tx, _rx) = tokio::sync::broadcast::channel(64);
        ApprovalPolicyEngine::new(&config, store, event_tx)
    }

    fn client_ref() -> ResourceRef {
        ResourceRef::client(ClientId::from("C.1"))
    }

    #[tokio::test]
    async fn single_approver_quorum_grants_access() {
        let engine = engine_with(ApprovalConfig::default());
        let request = engine
            .request_approval("alice", &client_ref(), vec!["bob".into()])
            .await
            .unwrap();

        assert!(
            !engine
                .check("alice", &client_ref())
                .await
                .unwrap()
                .is_authorized(),
            "unsatisfied request must not authorize"
        );

        let outcome = engine.grant(request.id, "bob").await.unwrap();
        assert!(outcome.satisfied);
        assert!(outcome.expires_at.is_some());

        let result = engine.check("alice", &client_ref()).await.unwrap();
        assert!(result.is_authorized());
    }

    #[tokio::test]
    async fn quorum_of_two_requires_distinct_approvers() {
        let config = ApprovalConfig {
            quorum: 2,
            ..Default::default()
        };
        let engine = engine_with(config);
        let request = engine
            .request_approval("alice", &client_ref(), vec!["bob".into(), "carol".into()])
            .await
            .unwrap();

        let outcome = engine.grant(request.id, "bob").await.unwrap();
        assert!(!outcome.satisfied, "one grant of two must not satisfy");

        // Repeated grant by the same approver does not advance the quorum
        let outcome = engine.grant(request.id, "bob").await.unwrap();
        assert!(!outcome.satisfied);
        assert_eq!(engine.approvals_for(request.id).await.unwrap().len(), 1);

        let outcome = engine.grant(request.id, "carol").await.unwrap();
        assert!(outcome.satisfied);
        assert!(
            engine
                .check("alice", &client_ref())
                .await
                .unwrap()
                .is_authorized()
        );
    }

    #[tokio::test]
    async fn grant_by_non_approver_is_rejected() {
        let engine = engine_with(ApprovalConfig::default());
        let request = engine
            .request_approval("alice", &client_ref(), vec!["bob".into()])
            .await
            .unwrap();

        let err = engine.grant(request.id, "mallory").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            Error::from(ApprovalError::NotAnApprover {
                approver: "mallory".into(),
                request_id: request.id,
            })
            .to_string()
        );
    }

    #[tokio::test]
    async fn self_approval_is_rejected_by_default() {
        let engine = engine_with(ApprovalConfig::default());
        let request = engine
            .request_approval("alice", &client_ref(), vec!["alice".into(), "bob".into()])
            .await
            .unwrap();

        assert!(engine.grant(request.id, "alice").await.is_err());
        assert!(engine.grant(request.id, "bob").await.is_ok());
    }

    #[tokio::test]
    async fn grant_after_quorum_fails_with_already_satisfied() {
        let engine = engine_with(ApprovalConfig::default());
        let request = engine
            .request_approval("alice", &client_ref(), vec!["bob".into(), "carol".into()])
            .await
            .unwrap();
        engine.grant(request.id, "bob").await.unwrap();

        let err = engine.grant(request.id, "carol").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Approval(ApprovalError::AlreadySatisfied { .. })
        ));
    }

    #[tokio::test]
    async fn request_for_unknown_client_fails_with_invalid_resource() {
        let engine = engine_with(ApprovalConfig::default());
        let missing = ResourceRef::client(ClientId::from("C.9"));
        let err = engine
            .request_approval("alice", &missing, vec!["bob".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidResource(_)));
    }

    #[tokio::test]
    async fn second_request_while_grant_valid_fails_with_already_approved() {
        let engine = engine_with(ApprovalConfig::default());
        let request = engine
            .request_approval("alice", &client_ref(), vec!["bob".into()])
            .await
            .unwrap();
        engine.grant(request.id, "bob").await.unwrap();

        let err = engine
            .request_approval("alice", &client_ref(), vec!["bob".into()])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Approval(ApprovalError::AlreadyApproved { .. })
        ));
    }

    #[tokio::test]
    async fn request_with_no_approvers_is_rejected() {
        let engine = engine_with(ApprovalConfig::default());
        let err = engine
            .request_approval("alice", &client_ref(), vec![])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Approval(ApprovalError::NoApprovers { .. })
        ));
    }

    #[tokio::test]
    async fn expired_grant_no_longer_authorizes() {
        let config = ApprovalConfig {
            validity_window: Duration::ZERO,
            ..Default::default()
        };
        let engine = engine_with(config);
        let request = engine
            .request_approval("alice", &client_ref(), vec!["bob".into()])
            .await
            .unwrap();
        engine.grant(request.id, "bob").await.unwrap();

        // A zero validity window expires immediately; the next fresh check
        // must come back Unauthorized.
        let result = engine.check("alice", &client_ref()).await.unwrap();
        assert_eq!(result, CheckResult::Unauthorized);
    }

    #[tokio::test]
    async fn revoked_grant_no_longer_authorizes() {
        let engine = engine_with(ApprovalConfig::default());
        let request = engine
            .request_approval("alice", &client_ref(), vec!["bob".into()])
            .await
            .unwrap();
        engine.grant(request.id, "bob").await.unwrap();
        assert!(
            engine
                .check("alice", &client_ref())
                .await
                .unwrap()
                .is_authorized()
        );

        assert!(engine.revoke("alice", &client_ref()).await.unwrap());
        assert_eq!(
            engine.check("alice", &client_ref()).await.unwrap(),
            CheckResult::Unauthorized
        );
        // Nothing left to revoke
        assert!(!engine.revoke("alice", &client_ref()).await.unwrap());
    }

    #[tokio::test]
    async fn flow_level_reference_authorizes_against_owning_client() {
        let engine = engine_with(ApprovalConfig::default());
        let flow_ref = ResourceRef::flow(ClientId::from("C.1"), FlowId::from("F:1"));
        let request = engine
            .request_approval("alice", &flow_ref, vec!["bob".into()])
            .await
            .unwrap();
        assert!(
            request.resource.flow.is_none(),
            "requests are recorded at client granularity"
        );
        engine.grant(request.id, "bob").await.unwrap();

        assert!(engine.check("alice", &flow_ref).await.unwrap().is_authorized());
        assert!(
            engine
                .check("alice", &client_ref())
                .await
                .unwrap()
                .is_authorized()
        );
    }

    #[tokio::test]
    async fn bypass_predicate_matches_configured_principals() {
        let config = ApprovalConfig {
            bypass_principals: vec!["export-robot".into()],
            ..Default::default()
        };
        let engine = engine_with(config);
        assert!(engine.is_bypass("export-robot"));
        assert!(!engine.is_bypass("alice"));
    }
}
