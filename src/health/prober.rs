//! Single-candidate health probe
//!
//! The probe never reaches the network for a candidate that cannot work as
//! configured: a missing endpoint, or a cloud provider without a key, is
//! reported as `misconfigured`. For the missing-key case a raw TCP connect
//! tells the operator whether anything is listening at all.

use super::{ErrorType, HealthError, HealthRecord, HealthStatus};
use crate::providers::{SecretChain, is_chat_completions_url};
use crate::routing::{ApiKey, ProviderCandidate, ProviderKind, RoutingTable};
use async_trait::async_trait;
use serde_json::json;
use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMethod {
    Head,
    Get,
    Post,
}

/// One HTTP probe
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub method: ProbeMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
}

/// Transport-level probe failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    Timeout(String),
    Connection(String),
    Ssl(String),
    Other(String),
}

impl TransportFailure {
    fn into_health_error(self) -> HealthError {
        match self {
            Self::Timeout(msg) => HealthError::new(ErrorType::Timeout, msg),
            Self::Connection(msg) => HealthError::new(ErrorType::Connection, msg),
            Self::Ssl(msg) => HealthError::new(ErrorType::Ssl, msg),
            Self::Other(msg) => HealthError::new(ErrorType::Unknown, msg),
        }
    }
}

/// Network access used by the prober
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Send the request and return the HTTP status code
    async fn send(&self, request: ProbeRequest) -> Result<u16, TransportFailure>;

    /// Whether a TCP connection to host:port succeeds within `timeout`
    async fn tcp_reachable(&self, host: &str, port: u16, timeout: Duration) -> bool;
}

/// reqwest/tokio implementation of `ProbeTransport`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn classify_reqwest_error(err: &reqwest::Error) -> TransportFailure {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }

    let lowered = chain.to_ascii_lowercase();
    if err.is_timeout() {
        TransportFailure::Timeout(chain)
    } else if lowered.contains("certificate") || lowered.contains("tls") || lowered.contains("ssl")
    {
        TransportFailure::Ssl(chain)
    } else if err.is_connect() {
        TransportFailure::Connection(chain)
    } else {
        TransportFailure::Other(chain)
    }
}

#[async_trait]
impl ProbeTransport for ReqwestTransport {
    async fn send(&self, request: ProbeRequest) -> Result<u16, TransportFailure> {
        let mut builder = match request.method {
            ProbeMethod::Head => self.client.head(&request.url),
            ProbeMethod::Get => self.client.get(&request.url),
            ProbeMethod::Post => self.client.post(&request.url),
        }
        .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        builder
            .send()
            .await
            .map(|response| response.status().as_u16())
            .map_err(|e| classify_reqwest_error(&e))
    }

    async fn tcp_reachable(&self, host: &str, port: u16, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, tokio::net::TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        )
    }
}

/// Result of probing one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub healthy: bool,
    pub status: HealthStatus,
    pub error_type: ErrorType,
    pub error_message: Option<String>,
    pub admin_action: Option<String>,
    pub response_time_ms: Option<u64>,
    /// URL whose answer decided the outcome
    pub used_url: Option<String>,
}

impl ProbeOutcome {
    fn healthy(url: &str, response_time_ms: u64, note: Option<HealthError>) -> Self {
        let (error_type, error_message, admin_action) = match note {
            Some(e) => (e.error_type, Some(e.message), e.admin_action),
            None => (ErrorType::None, None, None),
        };
        Self {
            healthy: true,
            status: HealthStatus::Healthy,
            error_type,
            error_message,
            admin_action,
            response_time_ms: Some(response_time_ms),
            used_url: Some(url.to_string()),
        }
    }

    fn failed(status: HealthStatus, error: HealthError, used_url: Option<&str>) -> Self {
        Self {
            healthy: false,
            status,
            error_type: error.error_type,
            error_message: Some(error.message),
            admin_action: error.admin_action,
            response_time_ms: None,
            used_url: used_url.map(str::to_string),
        }
    }

    /// Error details for the cache record, if any
    pub fn error(&self) -> Option<HealthError> {
        if self.error_type == ErrorType::None {
            return None;
        }
        Some(HealthError {
            error_type: self.error_type,
            message: self.error_message.clone().unwrap_or_default(),
            admin_action: self.admin_action.clone(),
        })
    }

    /// Cache record for the candidate this outcome belongs to
    pub fn to_record(&self, candidate: &ProviderCandidate) -> HealthRecord {
        HealthRecord::new(
            candidate.provider().as_str(),
            &candidate.instance_qualified_model(),
            self.status,
            self.response_time_ms,
            self.error(),
        )
    }
}

/// Authentication headers in the provider's native style
fn auth_headers(provider: &ProviderKind, key: Option<&ApiKey>) -> Vec<(String, String)> {
    let Some(key) = key else {
        return Vec::new();
    };
    let header = match provider {
        ProviderKind::Azure => ("api-key".to_string(), key.expose().to_string()),
        ProviderKind::Gemini => ("x-goog-api-key".to_string(), key.expose().to_string()),
        _ => (
            "Authorization".to_string(),
            format!("Bearer {}", key.expose()),
        ),
    };
    vec![header]
}

/// Probes candidates through a `ProbeTransport`
pub struct HealthProber {
    transport: Arc<dyn ProbeTransport>,
    secrets: SecretChain,
    probe_timeout: Duration,
    connect_timeout: Duration,
}

impl HealthProber {
    pub fn new(
        transport: Arc<dyn ProbeTransport>,
        secrets: SecretChain,
        probe_timeout: Duration,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            secrets,
            probe_timeout,
            connect_timeout,
        }
    }

    /// Check one candidate
    pub async fn probe(&self, candidate: &ProviderCandidate, table: &RoutingTable) -> ProbeOutcome {
        let provider = candidate.provider();

        let Some(api_url) = table.effective_url(candidate) else {
            return ProbeOutcome::failed(
                HealthStatus::Misconfigured,
                HealthError::new(ErrorType::MissingApiUrl, "No API URL configured")
                    .with_admin_action(format!("Set a valid api_url for {}", provider)),
                None,
            );
        };

        let api_key = table.effective_key(candidate, &self.secrets).await;
        if api_key.is_none() && provider.requires_api_key() {
            let error = self.missing_key_error(provider, &api_url).await;
            return ProbeOutcome::failed(HealthStatus::Misconfigured, error, Some(&api_url));
        }

        let mut urls: Vec<String> = Vec::with_capacity(2);
        if let Some(check_url) = candidate.extra().health_check_url.as_deref() {
            urls.push(check_url.to_string());
        }
        if !urls.iter().any(|u| *u == api_url) {
            urls.push(api_url);
        }

        let headers = auth_headers(provider, api_key.as_ref());
        let mut last_error = HealthError::new(ErrorType::Unknown, "No URL probed");
        let mut last_url = None;

        for url in &urls {
            let started = Instant::now();
            match self.check_url(candidate, url, &headers).await {
                Ok(note) => {
                    let elapsed = started.elapsed().as_millis() as u64;
                    tracing::debug!(
                        provider = %provider,
                        model = %candidate.model(),
                        url = %url,
                        response_time_ms = elapsed,
                        "Health probe succeeded"
                    );
                    return ProbeOutcome::healthy(url, elapsed, note);
                }
                Err(error) => {
                    tracing::debug!(
                        provider = %provider,
                        model = %candidate.model(),
                        url = %url,
                        error_type = %error.error_type.as_str(),
                        error = %error.message,
                        "Health probe failed, trying next URL"
                    );
                    last_error = error;
                    last_url = Some(url.as_str());
                }
            }
        }

        ProbeOutcome::failed(HealthStatus::Unhealthy, last_error, last_url)
    }

    /// Probe one URL; `Ok(Some(_))` carries a note for auth-gated success
    async fn check_url(
        &self,
        candidate: &ProviderCandidate,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<Option<HealthError>, HealthError> {
        let request = |method: ProbeMethod, body: Option<serde_json::Value>| ProbeRequest {
            method,
            url: url.to_string(),
            headers: headers.to_vec(),
            body,
            timeout: self.probe_timeout,
        };

        let status = if is_chat_completions_url(url) {
            let body = json!({
                "model": candidate.model(),
                "messages": [{"role": "user", "content": "ping"}],
                "max_tokens": 1,
                "temperature": 0,
            });
            self.transport
                .send(request(ProbeMethod::Post, Some(body)))
                .await
        } else {
            match self.transport.send(request(ProbeMethod::Head, None)).await {
                Ok(404 | 405) => self.transport.send(request(ProbeMethod::Get, None)).await,
                other => other,
            }
        }
        .map_err(TransportFailure::into_health_error)?;

        match status {
            200..=299 => Ok(None),
            401 | 403 => Ok(Some(HealthError::new(
                ErrorType::AuthRequired,
                format!("Service reachable, authentication required (HTTP {})", status),
            ))),
            429 => Err(HealthError::new(
                ErrorType::RateLimit,
                "Rate limited (HTTP 429)",
            )),
            other => Err(HealthError::new(
                ErrorType::HttpError,
                format!("HTTP {}", other),
            )),
        }
    }

    async fn missing_key_error(&self, provider: &ProviderKind, api_url: &str) -> HealthError {
        let target = reqwest::Url::parse(api_url).ok().and_then(|url| {
            let host = url.host_str()?.to_string();
            let port = url.port_or_known_default()?;
            Some((host, port))
        });

        let Some((host, port)) = target else {
            return HealthError::new(ErrorType::MissingApiKey, "API key is missing")
                .with_admin_action(format!(
                    "Set a valid API key for {}. Note: could not verify service connectivity.",
                    provider
                ));
        };

        if self
            .transport
            .tcp_reachable(&host, port, self.connect_timeout)
            .await
        {
            HealthError::new(
                ErrorType::MissingApiKey,
                format!("Service reachable at {}:{} but API key is missing", host, port),
            )
            .with_admin_action(format!(
                "Service is reachable at {}:{}. Set a valid API key for {}",
                host, port, provider
            ))
        } else {
            HealthError::new(
                ErrorType::MissingApiKeyAndConnection,
                format!(
                    "Nothing listening at {}:{} and API key is missing",
                    host, port
                ),
            )
            .with_admin_action(format!(
                "1) Check if the service at {}:{} is running. 2) Set a valid API key for {}",
                host, port, provider
            ))
        }
    }
}

impl std::fmt::Debug for HealthProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthProber")
            .field("probe_timeout", &self.probe_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}
