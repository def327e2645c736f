//! Error types for Tailgate
//!
//! `AppError` implements `IntoResponse` for Axum handlers. The narrower enums
//! (`ProviderError`, `ExecutionError`, `StoreError`) are the boundaries of the
//! adapter layer, the fallback executor and the health store respectively.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file '{path}': {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Execution(ExecutionError::NoProviders) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Execution(ExecutionError::Exhausted { .. }) => StatusCode::BAD_GATEWAY,
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;

/// Failure of a single provider adapter call
///
/// Adapters never let transport or decoding errors escape as anything other
/// than one of these variants, so the executor can always advance the chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("no endpoint configured for {provider}")]
    MissingEndpoint { provider: String },

    #[error("no API key available for {provider}")]
    MissingCredential { provider: String },

    #[error("request timed out after {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("rate limited (HTTP {status})")]
    RateLimited { status: u16 },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("provider returned no usable text")]
    EmptyResponse,

    #[error("provider '{0}' is not recognized and has no template")]
    Unsupported(String),
}

impl ProviderError {
    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingEndpoint { .. } | Self::MissingCredential { .. } => "misconfigured",
            Self::Timeout { .. } => "timeout",
            Self::Connection(_) => "connection",
            Self::RateLimited { .. } => "rate_limit",
            Self::Http { .. } => "http_error",
            Self::InvalidResponse(_) => "invalid_response",
            Self::EmptyResponse => "empty_response",
            Self::Unsupported(_) => "unsupported",
        }
    }

    /// Whether a later probe or request could plausibly succeed without
    /// operator intervention
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::MissingEndpoint { .. } | Self::MissingCredential { .. } | Self::Unsupported(_)
        )
    }

    /// Build the error for a non-success HTTP status, keeping the body short
    pub fn from_status(status: u16, body: &str) -> Self {
        if status == 429 {
            return Self::RateLimited { status };
        }
        let body: String = body.chars().take(200).collect();
        Self::Http { status, body }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        // Call deadlines belong to the executor, which reports the real
        // duration; a timeout surfacing from reqwest is a transport failure
        if err.is_connect() || err.is_timeout() {
            Self::Connection(err.to_string())
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), &err.to_string())
        } else {
            Self::Connection(err.to_string())
        }
    }
}

/// One failed attempt recorded by the fallback executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    pub position: usize,
    pub provider: String,
    pub model: String,
    pub error: ProviderError,
}

impl std::fmt::Display for FailedAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} {}:{} ({})",
            self.position, self.provider, self.model, self.error
        )
    }
}

/// Terminal outcome of walking a fallback chain without success
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The resolved chain is empty: nothing is configured to serve requests
    #[error("No providers configured in the fallback chain")]
    NoProviders,

    /// Every candidate was tried (or skipped) and none produced text
    #[error("All {} providers in the fallback chain failed", attempts.len())]
    Exhausted { attempts: Vec<FailedAttempt> },
}

impl ExecutionError {
    /// Label used for the request outcome metric
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::NoProviders => "no_providers",
            Self::Exhausted { .. } => "exhausted",
        }
    }
}

/// Failure talking to the shared health store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("health store unavailable: {0}")]
    Unavailable(String),

    #[error("health record could not be encoded: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Failure of a secret backend lookup
#[derive(Error, Debug)]
pub enum SecretError {
    #[error("secret '{name}' is not valid UTF-8")]
    InvalidValue { name: String },

    #[error("secret backend unavailable: {0}")]
    Backend(String),
}
