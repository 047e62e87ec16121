//! Out-of-band notification delivery.
//!
//! Two channels: a bounded in-process inbox of [`UserNotification`]s that a
//! UI can poll (the only way a requester learns about a mid-stream failure,
//! since the download connection is already gone), and fire-and-forget
//! webhook POSTs for external integrations.

use std::collections::VecDeque;
use std::sync::Arc;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::approval::ApprovalRequest;
use crate::config::{Config, WebhookConfig, WebhookEvent};
use crate::exporter::jobs::ExportJob;
use crate::types::{Event, NotificationPayload, UserNotification};

/// Delivers user notifications and webhook callbacks.
pub struct Notifier {
    config: Arc<Config>,
    event_tx: broadcast::Sender<Event>,
    inbox: std::sync::Mutex<VecDeque<UserNotification>>,
}

impl Notifier {
    pub(crate) fn new(config: Arc<Config>, event_tx: broadcast::Sender<Event>) -> Self {
        Self {
            config,
            event_tx,
            inbox: std::sync::Mutex::new(VecDeque::new()),
        }
    }

    /// Record a notification in the inbox, dropping the oldest entry when
    /// the configured capacity is reached.
    pub fn record(&self, notification: UserNotification) {
        if let Ok(mut inbox) = self.inbox.lock() {
            let cap = self.config.notifications.inbox_capacity;
            while inbox.len() >= cap {
                inbox.pop_front();
            }
            inbox.push_back(notification);
        }
    }

    /// Notifications addressed to one requester, oldest first.
    pub fn notifications_for(&self, requester: &str) -> Vec<UserNotification> {
        self.inbox
            .lock()
            .map(|inbox| {
                inbox
                    .iter()
                    .filter(|n| n.requester == requester)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All retained notifications, oldest first.
    pub fn all_notifications(&self) -> Vec<UserNotification> {
        self.inbox
            .lock()
            .map(|inbox| inbox.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// A job failed. Records an inbox notification for the requester and
    /// fires `OnFailed` webhooks.
    pub(crate) fn job_failed(&self, job: &ExportJob, reason: &str) {
        let message = format!("Archive generation failed for {}: {}", job.resource, reason);
        self.record(UserNotification {
            requester: job.requester.clone(),
            resource: job.resource.to_string(),
            message: message.clone(),
            timestamp: Utc::now(),
        });
        self.dispatch(
            WebhookEvent::OnFailed,
            NotificationPayload {
                event: "export_failed".to_string(),
                requester: job.requester.clone(),
                resource: job.resource.key(),
                message,
                job_id: Some(job.id),
                timestamp: Utc::now().timestamp(),
            },
        );
    }

    /// A job completed. Fires `OnComplete` webhooks; no inbox entry, the
    /// requester already has the bytes.
    pub(crate) fn job_complete(&self, job: &ExportJob) {
        self.dispatch(
            WebhookEvent::OnComplete,
            NotificationPayload {
                event: "export_complete".to_string(),
                requester: job.requester.clone(),
                resource: job.resource.key(),
                message: format!("Export complete for {}", job.resource),
                job_id: Some(job.id),
                timestamp: Utc::now().timestamp(),
            },
        );
    }

    /// An approval request was created. Records an inbox notification per
    /// approver and fires `OnApprovalRequested` webhooks.
    pub(crate) fn approval_requested(&self, request: &ApprovalRequest) {
        let message = format!(
            "{} requests export approval for {}",
            request.requester, request.resource
        );
        for approver in &request.approvers {
            self.record(UserNotification {
                requester: approver.clone(),
                resource: request.resource.to_string(),
                message: message.clone(),
                timestamp: Utc::now(),
            });
        }
        self.dispatch(
            WebhookEvent::OnApprovalRequested,
            NotificationPayload {
                event: "approval_requested".to_string(),
                requester: request.requester.clone(),
                resource: request.resource.key(),
                message,
                job_id: None,
                timestamp: Utc::now().timestamp(),
            },
        );
    }

    /// POST the payload to every webhook subscribed to `trigger`.
    ///
    /// Fire-and-forget: each delivery runs on its own task and failures are
    /// logged and surfaced as [`Event::NotificationFailed`], never returned
    /// to the caller.
    pub(crate) fn dispatch(&self, trigger: WebhookEvent, payload: NotificationPayload) {
        for webhook in &self.config.notifications.webhooks {
            if !webhook.events.contains(&trigger) {
                continue;
            }
            let webhook = webhook.clone();
            let payload = payload.clone();
            let event_tx = self.event_tx.clone();
            tokio::spawn(async move {
                deliver(webhook, payload, event_tx).await;
            });
        }
    }
}

async fn deliver(
    webhook: WebhookConfig,
    payload: NotificationPayload,
    event_tx: broadcast::Sender<Event>,
) {
    let client = match reqwest::Client::builder().timeout(webhook.timeout).build() {
        Ok(client) => client,
        Err(e) => {
            warn!(url = %webhook.url, error = %e, "failed to build webhook client");
            return;
        }
    };

    let mut request = client.post(&webhook.url).json(&payload);
    if let Some(auth) = &webhook.auth_header {
        request = request.header("Authorization", auth);
    }

    match request.send().await {
        Ok(response) if response.status().is_success() => {
            debug!(url = %webhook.url, event = %payload.event, "webhook delivered");
        }
        Ok(response) => {
            let error = format!("webhook returned status {}", response.status());
            warn!(url = %webhook.url, %error, "webhook delivery failed");
            let _ = event_tx.send(Event::NotificationFailed {
                url: webhook.url,
                error,
            });
        }
        Err(e) => {
            warn!(url = %webhook.url, error = %e, "webhook delivery failed");
            let _ = event_tx.send(Event::NotificationFailed {
                url: webhook.url,
                error: e.to_string(),
            });
        }
    }
}
