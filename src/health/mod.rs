//! Provider health tracking
//!
//! - `store`: key-value backends (Redis, in-process) behind `HealthStore`
//! - `cache`: TTL-aware `HealthCache` over a shared store with local fallback
//! - `prober`: one connectivity/auth check against one candidate
//! - `monitor`: periodic background probing and the overall `HealthReport`

pub mod cache;
pub mod monitor;
pub mod prober;
pub mod store;

pub use cache::HealthCache;
pub use monitor::{HealthMonitor, HealthReport, MonitorHandle, OverallStatus};
pub use prober::{HealthProber, ProbeOutcome, ProbeRequest, ProbeTransport, ReqwestTransport};
pub use store::{HealthStore, MemoryStore, RedisStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cached health status of one provider instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    /// Missing endpoint or credential; needs an operator, not a retry
    Misconfigured,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Misconfigured => "misconfigured",
        }
    }
}

/// Error taxonomy shared by probes and cached records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    #[default]
    None,
    AuthRequired,
    Timeout,
    Connection,
    Ssl,
    RateLimit,
    HttpError,
    Unknown,
    MissingApiUrl,
    MissingApiKey,
    MissingApiKeyAndConnection,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::AuthRequired => "auth_required",
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::Ssl => "ssl",
            Self::RateLimit => "rate_limit",
            Self::HttpError => "http_error",
            Self::Unknown => "unknown",
            Self::MissingApiUrl => "missing_api_url",
            Self::MissingApiKey => "missing_api_key",
            Self::MissingApiKeyAndConnection => "missing_api_key_and_connection",
        }
    }

    /// Remediation hint for network-level failures
    ///
    /// Configuration errors carry hints naming the provider and endpoint,
    /// built by the prober.
    pub fn admin_action(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::AuthRequired => Some("Check API key if needed"),
            Self::Timeout => Some("Check network connectivity and provider service status"),
            Self::Connection => Some("Check network connectivity and DNS resolution"),
            Self::Ssl => Some("Check SSL certificate validity and TLS configuration"),
            Self::RateLimit => Some("Provider temporarily rate limited, will retry"),
            Self::HttpError => Some("Check provider service status and API configuration"),
            Self::Unknown => Some("Review logs and contact support if issue persists"),
            Self::MissingApiUrl => Some("Set a valid api_url for this provider"),
            Self::MissingApiKey | Self::MissingApiKeyAndConnection => {
                Some("Set a valid api_key for this provider")
            }
        }
    }
}

/// Error details attached to a non-healthy (or auth-gated) record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthError {
    pub error_type: ErrorType,
    pub message: String,
    pub admin_action: Option<String>,
}

impl HealthError {
    /// Error with the taxonomy's default admin hint
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            admin_action: error_type.admin_action().map(str::to_string),
        }
    }

    pub fn with_admin_action(mut self, action: impl Into<String>) -> Self {
        self.admin_action = Some(action.into());
        self
    }
}

/// Cached status for one `provider:instance` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub provider: String,
    /// Instance-qualified model
    pub model: String,
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    /// Present only when healthy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(default)]
    pub error_type: ErrorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_action: Option<String>,
}

impl HealthRecord {
    /// Build a record stamped with the current time
    pub fn new(
        provider: &str,
        model: &str,
        status: HealthStatus,
        response_time_ms: Option<u64>,
        error: Option<HealthError>,
    ) -> Self {
        let (error_type, error_message, admin_action) = match error {
            Some(e) => (e.error_type, Some(e.message), e.admin_action),
            None => (ErrorType::None, None, None),
        };

        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            status,
            checked_at: Utc::now(),
            response_time_ms: if status == HealthStatus::Healthy {
                response_time_ms
            } else {
                None
            },
            error_type,
            error_message,
            admin_action,
        }
    }

    /// Whether the record is older than `ttl` at `now`
    pub fn is_expired(&self, ttl: std::time::Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now.signed_duration_since(self.checked_at) >= ttl,
            Err(_) => false,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
