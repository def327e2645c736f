//! Background health monitor: cycles, reports, shutdown

use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tailgate::config::Config;
use tailgate::handlers::AppState;
use tailgate::health::prober::TransportFailure;
use tailgate::health::{
    ErrorType, HealthReport, HealthStatus, OverallStatus, ProbeRequest, ProbeTransport,
};
use tailgate::providers::SecretChain;
use tower::ServiceExt;

/// Every probe takes 200 ms; records how many were in flight at once
#[derive(Default)]
struct SlowNetwork {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    probes: AtomicUsize,
}

#[async_trait]
impl ProbeTransport for SlowNetwork {
    async fn send(&self, _request: ProbeRequest) -> Result<u16, TransportFailure> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(200)
    }

    async fn tcp_reachable(&self, _host: &str, _port: u16, _timeout: Duration) -> bool {
        true
    }
}

/// Local hosts answer 200, anything else refuses connections
#[derive(Default)]
struct FakeNetwork {
    probes: AtomicUsize,
}

#[async_trait]
impl ProbeTransport for FakeNetwork {
    async fn send(&self, request: ProbeRequest) -> Result<u16, TransportFailure> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if request.url.contains("gpu-box") {
            Ok(200)
        } else {
            Err(TransportFailure::Connection("connection refused".to_string()))
        }
    }

    async fn tcp_reachable(&self, _host: &str, _port: u16, _timeout: Duration) -> bool {
        false
    }
}

const CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 3000

[[routing.models]]
id = "llama-a"
provider = "ollama"
model = "llama3"
api_url = "http://gpu-box:11434/api/generate"

[[routing.models]]
id = "llama-b"
provider = "ollama"
model = "llama3"
api_url = "http://cpu-box:11435/api/generate"

[[routing.instance_groups]]
id = "pool"
models = ["llama-a", "llama-b"]

[[routing.fallback_chain]]
ref = "pool"
type = "instance_group"

# Same instance again, probed once per cycle
[[routing.fallback_chain]]
ref = "llama-a"

[[routing.fallback_chain]]
provider = "openai"
model = "gpt-4o-mini"

[health]
interval_seconds = 3600
"#;

fn state(network: Arc<FakeNetwork>) -> AppState {
    let config = Config::from_str(CONFIG).unwrap();
    AppState::from_config(
        &config,
        reqwest::Client::new(),
        network,
        SecretChain::default(),
        None,
    )
    .unwrap()
}

async fn wait_for_report(state: &AppState) -> HealthReport {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(report) = state.monitor().last_report() {
                return report;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("first cycle should complete promptly")
}

#[tokio::test]
async fn test_first_cycle_runs_immediately_and_fills_cache() {
    let network = Arc::new(FakeNetwork::default());
    let state = state(Arc::clone(&network));

    let handle = Arc::clone(state.monitor()).spawn();
    let report = wait_for_report(&state).await;

    assert_eq!(report.total, 3);
    assert_eq!(report.healthy, 1);
    assert_eq!(report.unhealthy, 1);
    assert_eq!(report.misconfigured, 1);
    assert_eq!(report.overall, OverallStatus::Degraded);

    let cached = state.cache().all_health().await;
    assert_eq!(cached["ollama:llama3:11434"].status, HealthStatus::Healthy);
    assert_eq!(cached["ollama:llama3:11435"].error_type, ErrorType::Connection);
    assert_eq!(
        cached["openai:gpt-4o-mini"].error_type,
        ErrorType::MissingApiKeyAndConnection
    );

    // The cloud candidate never reached the HTTP transport
    assert_eq!(network.probes.load(Ordering::SeqCst), 2);

    handle.stop().await;
}

#[tokio::test]
async fn test_stop_ends_the_loop_between_cycles() {
    let state = state(Arc::new(FakeNetwork::default()));

    let handle = Arc::clone(state.monitor()).spawn();
    wait_for_report(&state).await;
    assert!(!handle.is_finished());

    // The loop is sleeping for an hour; stop must not wait for it
    tokio::time::timeout(Duration::from_secs(5), handle.stop())
        .await
        .expect("monitor should stop promptly");
}

#[tokio::test]
async fn test_run_once_is_usable_without_the_loop() {
    let state = state(Arc::new(FakeNetwork::default()));
    assert!(state.monitor().last_report().is_none());

    let report = state.monitor().run_once().await;
    assert_eq!(report.total, 3);
    assert_eq!(
        state.monitor().last_report().map(|r| r.healthy),
        Some(report.healthy)
    );
}

#[tokio::test]
async fn test_empty_chain_reports_critical() {
    let config = Config::from_str(
        r#"
[server]
host = "127.0.0.1"
port = 3000
"#,
    )
    .unwrap();
    let state = AppState::from_config(
        &config,
        reqwest::Client::new(),
        Arc::new(FakeNetwork::default()),
        SecretChain::default(),
        None,
    )
    .unwrap();

    let report = state.monitor().run_once().await;
    assert_eq!(report.total, 0);
    assert_eq!(report.overall, OverallStatus::Critical);
}

#[tokio::test]
async fn test_manual_check_waits_for_background_cycle() {
    let config = Config::from_str(
        r#"
[server]
host = "127.0.0.1"
port = 3000

[[routing.fallback_chain]]
provider = "ollama"
model = "llama3"
api_url = "http://gpu-box:11434/api/generate"

[health]
interval_seconds = 3600
"#,
    )
    .unwrap();
    let network = Arc::new(SlowNetwork::default());
    let state = AppState::from_config(
        &config,
        reqwest::Client::new(),
        Arc::clone(&network) as Arc<dyn ProbeTransport>,
        SecretChain::default(),
        None,
    )
    .unwrap();

    let handle = Arc::clone(state.monitor()).spawn();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let response = tailgate::app(state.clone())
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/admin/providers/check")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    assert_eq!(network.probes.load(Ordering::SeqCst), 2);
    assert_eq!(network.peak.load(Ordering::SeqCst), 1);

    handle.stop().await;
}
