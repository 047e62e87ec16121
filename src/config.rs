//! Configuration types for flow-export
//!
//! All settings have sensible defaults; an empty config works out of the box
//! for embedding in tests or single-process deployments.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use utoipa::ToSchema;

/// Main configuration for [`FlowExporter`](crate::FlowExporter)
///
/// Fields are organized into logical sub-configs:
/// - [`approval`](ApprovalConfig) — quorum, validity window, bypass principals
/// - [`export`](ExportConfig) — chunking and channel sizing
/// - [`notifications`](NotificationConfig) — webhooks and the inbox cap
/// - [`server`](ServerIntegrationConfig) — REST API settings
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Approval workflow settings
    #[serde(default)]
    pub approval: ApprovalConfig,

    /// Export generation settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Notification settings (webhooks and the user-notification inbox)
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// API and external server integration
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

/// Approval workflow configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApprovalConfig {
    /// Number of distinct approvers required to satisfy a request (default: 1)
    #[serde(default = "default_quorum")]
    pub quorum: usize,

    /// How long a satisfied approval stays valid before the requester must
    /// be re-approved (default: 7 days)
    #[serde(default = "default_validity_window", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub validity_window: Duration,

    /// Requester identities exempt from interactive approval checks
    /// (automated/service callers). Every bypass use is still audited.
    #[serde(default)]
    pub bypass_principals: Vec<String>,

    /// Whether a requester may grant their own request (default: false)
    #[serde(default)]
    pub allow_self_approval: bool,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            quorum: default_quorum(),
            validity_window: default_validity_window(),
            bypass_principals: Vec::new(),
            allow_self_approval: false,
        }
    }
}

/// Export generation configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ExportConfig {
    /// Preferred chunk size in bytes for buffered transforms (default: 64 KiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Capacity of the per-job chunk channel between the generator task and
    /// the caller's stream (default: 32 chunks)
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Notification configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct NotificationConfig {
    /// Webhook configurations
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,

    /// Maximum retained user notifications per process (default: 1000).
    /// Oldest entries are dropped first; persistence is the embedder's concern.
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhooks: Vec::new(),
            inbox_capacity: default_inbox_capacity(),
        }
    }
}

/// Webhook configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookConfig {
    /// URL to POST to
    pub url: String,

    /// Events that trigger this webhook
    pub events: Vec<WebhookEvent>,

    /// Optional authentication header value
    #[serde(default)]
    pub auth_header: Option<String>,

    /// Timeout for webhook requests (default: 30 seconds)
    #[serde(default = "default_webhook_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub timeout: Duration,
}

/// Webhook trigger event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum WebhookEvent {
    /// Triggered when an export job completes successfully
    OnComplete,
    /// Triggered when an export job fails (pre- or mid-stream)
    OnFailed,
    /// Triggered when an approval request is created
    OnApprovalRequested,
}

/// API and external server integration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6789)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Optional API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

fn default_quorum() -> usize {
    1
}

fn default_validity_window() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_channel_capacity() -> usize {
    32
}

fn default_inbox_capacity() -> usize {
    1000
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_bind_address() -> SocketAddr {
    #[allow(clippy::expect_used)]
    "127.0.0.1:6789"
        .parse()
        .expect("default bind address is valid")
}

fn default_true() -> bool {
    true
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper (seconds as u64)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Config {
    /// Validate the configuration, returning a descriptive error on the
    /// first invalid setting.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.approval.quorum == 0 {
            return Err(crate::error::Error::Config {
                message: "approval quorum must be at least 1".to_string(),
                key: Some("approval.quorum".to_string()),
            });
        }
        if self.export.chunk_size == 0 {
            return Err(crate::error::Error::Config {
                message: "export chunk size must be non-zero".to_string(),
                key: Some("export.chunk_size".to_string()),
            });
        }
        if self.export.channel_capacity == 0 {
            return Err(crate::error::Error::Config {
                message: "export channel capacity must be non-zero".to_string(),
                key: Some("export.channel_capacity".to_string()),
            });
        }
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn zero_quorum_is_rejected() {
        let mut config = Config::default();
        config.approval.quorum = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("quorum"));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let mut config = Config::default();
        config.export.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_json_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.approval.quorum, 1);
        assert_eq!(config.export.chunk_size, 64 * 1024);
        assert!(config.server.api.cors_enabled);
    }

    #[test]
    fn validity_window_round_trips_as_seconds() {
        let mut config = Config::default();
        config.approval.validity_window = Duration::from_secs(3600);
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.approval.validity_window, Duration::from_secs(3600));
    }

    #[test]
    fn bypass_principals_deserialize_from_json() {
        let config: Config = serde_json::from_str(
            r#"{"approval": {"bypass_principals": ["export-robot"], "quorum": 2}}"#,
        )
        .unwrap();
        assert_eq!(config.approval.bypass_principals, vec!["export-robot"]);
        assert_eq!(config.approval.quorum, 2);
    }
}
