//! Chat endpoint handler
//!
//! Handles POST /chat: screens the prompt, walks the fallback chain and
//! returns either the generated text or a block decision.

use crate::error::{AppError, AppResult};
use crate::gateway::GatewayOutcome;
use crate::handlers::AppState;
use crate::middleware::RequestId;
use axum::{Extension, Json, extract::State};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// One chat-style message
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: String,
    pub content: String,
}

/// Chat request from client: either a bare prompt or a message list
///
/// The handler decodes this from a raw JSON value so that every shape error
/// (wrong field types, a message without content) is a 400, never the
/// extractor's 422.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// Decode a request body
    ///
    /// # Errors
    ///
    /// `Validation` when the value does not have the request's shape.
    pub fn from_json(body: serde_json::Value) -> AppResult<Self> {
        serde_json::from_value(body)
            .map_err(|e| AppError::Validation(format!("invalid chat request: {}", e)))
    }

    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            messages: Vec::new(),
        }
    }

    /// The prompt to route: `prompt`, else the last message's content
    ///
    /// # Errors
    ///
    /// `Validation` when neither yields non-blank text.
    pub fn prompt(&self) -> AppResult<&str> {
        let prompt = match &self.prompt {
            Some(prompt) => prompt.as_str(),
            None => self
                .messages
                .last()
                .map(|m| m.content.as_str())
                .ok_or_else(|| {
                    AppError::Validation("request needs 'prompt' or 'messages'".to_string())
                })?,
        };

        if prompt.trim().is_empty() {
            return Err(AppError::Validation(
                "prompt cannot be empty or contain only whitespace".to_string(),
            ));
        }
        Ok(prompt)
    }
}

/// Chat response to client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChatResponse {
    Safe {
        response: String,
        flag: &'static str,
        provider: String,
        model: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        group_id: Option<String>,
        fallback_position: usize,
        processing_time_ms: u64,
    },
    Blocked {
        flag: &'static str,
        reason: String,
        classified_type: String,
    },
}

impl ChatResponse {
    fn from_outcome(outcome: GatewayOutcome, processing_time_ms: u64) -> Self {
        match outcome {
            GatewayOutcome::Served(generation) => Self::Safe {
                response: generation.text,
                flag: "safe",
                provider: generation.provider,
                model: generation.model,
                group_id: generation.group_id,
                fallback_position: generation.position,
                processing_time_ms,
            },
            GatewayOutcome::Blocked(decision) => Self::Blocked {
                flag: "blocked",
                reason: decision.reason,
                classified_type: decision.classification,
            },
        }
    }
}

/// POST /chat handler
///
/// Worst-case latency is the sum of every candidate's timeout: candidates
/// are tried strictly one after another.
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<ChatResponse>, AppError> {
    let started = Instant::now();
    let request = ChatRequest::from_json(body)?;
    let prompt = request.prompt()?;

    tracing::debug!(
        request_id = %request_id,
        prompt_chars = prompt.chars().count(),
        "Received chat request"
    );

    let outcome = state
        .gateway()
        .route_and_generate(prompt)
        .await
        .inspect_err(|e| {
            tracing::error!(
                request_id = %request_id,
                error = %e,
                "Chat request failed"
            );
        })?;

    let processing_time_ms = started.elapsed().as_millis() as u64;
    match &outcome {
        GatewayOutcome::Served(generation) => tracing::info!(
            request_id = %request_id,
            provider = %generation.provider,
            model = %generation.model,
            position = generation.position,
            processing_time_ms,
            "Chat request served"
        ),
        GatewayOutcome::Blocked(decision) => tracing::info!(
            request_id = %request_id,
            classification = %decision.classification,
            "Chat request blocked"
        ),
    }

    Ok(Json(ChatResponse::from_outcome(outcome, processing_time_ms)))
}
