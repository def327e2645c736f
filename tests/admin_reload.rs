//! Operator endpoints: config reload and provider health views

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::Value;
use std::sync::Arc;
use tailgate::config::Config;
use tailgate::handlers::AppState;
use tailgate::health::ReqwestTransport;
use tailgate::providers::SecretChain;
use tempfile::NamedTempFile;
use tower::ServiceExt;

const ONE_CANDIDATE: &str = r#"
[server]
host = "127.0.0.1"
port = 3000

[[routing.fallback_chain]]
provider = "ollama"
model = "llama3"
"#;

const THREE_CANDIDATES: &str = r#"
[server]
host = "127.0.0.1"
port = 3000

[[routing.models]]
id = "a"
provider = "ollama"
model = "llama3"
api_url = "http://10.0.0.1:11434/api/generate"

[[routing.models]]
id = "b"
provider = "ollama"
model = "llama3"
api_url = "http://10.0.0.2:11434/api/generate"

[[routing.instance_groups]]
id = "pool"
models = ["a", "b"]

[[routing.fallback_chain]]
ref = "pool"
type = "instance_group"

[[routing.fallback_chain]]
provider = "gemini"
model = "gemini-1.5-flash"
"#;

fn write_config(file: &NamedTempFile, contents: &str) {
    std::fs::write(file.path(), contents).unwrap();
}

fn state_from(file: &NamedTempFile) -> AppState {
    let config = Config::from_file(file.path()).unwrap();
    let client = reqwest::Client::new();
    AppState::from_config(
        &config,
        client.clone(),
        Arc::new(ReqwestTransport::new(client)),
        SecretChain::default(),
        Some(file.path().to_path_buf()),
    )
    .unwrap()
}

async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_reload_swaps_the_routing_table() {
    let file = NamedTempFile::new().unwrap();
    write_config(&file, ONE_CANDIDATE);
    let state = state_from(&file);
    let app = tailgate::app(state.clone());
    assert_eq!(state.gateway().chain_len(), 1);

    write_config(&file, THREE_CANDIDATES);
    let (status, body) = send(app, "POST", "/admin/reload").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chain_len"], 3);
    assert_eq!(body["models"], 2);
    assert_eq!(body["instance_groups"], 1);
    assert_eq!(state.gateway().chain_len(), 3);
}

#[tokio::test]
async fn test_invalid_file_keeps_running_configuration() {
    let file = NamedTempFile::new().unwrap();
    write_config(&file, ONE_CANDIDATE);
    let state = state_from(&file);
    let app = tailgate::app(state.clone());

    write_config(
        &file,
        r#"
[server]
host = "127.0.0.1"
port = 0
"#,
    );
    let (status, body) = send(app.clone(), "POST", "/admin/reload").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("server.port"));
    assert_eq!(state.gateway().chain_len(), 1);

    write_config(&file, "this is not toml [");
    let (status, _) = send(app, "POST", "/admin/reload").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(state.gateway().chain_len(), 1);
}

#[tokio::test]
async fn test_providers_view_and_clear() {
    let file = NamedTempFile::new().unwrap();
    write_config(&file, ONE_CANDIDATE);
    let state = state_from(&file);
    let app = tailgate::app(state.clone());

    state
        .cache()
        .set(
            "ollama",
            "llama3",
            tailgate::health::HealthStatus::Healthy,
            Some(7),
            None,
        )
        .await;

    let (status, body) = send(app.clone(), "GET", "/admin/providers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["providers"]["ollama:llama3"]["status"], "healthy");
    assert_eq!(body["providers"]["ollama:llama3"]["response_time_ms"], 7);
    assert_eq!(body["health_store_degraded"], false);
    assert!(body["last_check"].is_null());

    let (status, body) = send(app.clone(), "DELETE", "/admin/providers/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], 1);

    let (_, body) = send(app, "GET", "/admin/providers").await;
    assert_eq!(body["providers"], serde_json::json!({}));
}
