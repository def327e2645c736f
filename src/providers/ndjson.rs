//! Ollama generate-protocol streaming
//!
//! The generate endpoint answers with newline-delimited JSON objects, each
//! carrying a `response` fragment, the last one with `"done": true`. Chunks
//! from the network do not respect line boundaries, so bytes are buffered
//! until a full line is available.

use crate::error::ProviderError;
use futures::StreamExt;

/// Incremental NDJSON decoder that concatenates `response` fragments
#[derive(Debug, Default)]
pub struct NdjsonAccumulator {
    buffer: Vec<u8>,
    text: String,
    done: bool,
    malformed: usize,
    error: Option<String>,
}

impl NdjsonAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);

        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            self.consume_line(&line);
        }
    }

    /// The stream has sent its final object
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Text accumulated so far
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of lines that were not valid JSON
    pub fn malformed_lines(&self) -> usize {
        self.malformed
    }

    /// Flush a trailing unterminated line and return the full text
    pub fn finish(mut self) -> Result<String, ProviderError> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.consume_line(&rest);
        }

        if let Some(error) = self.error {
            return Err(ProviderError::InvalidResponse(format!(
                "stream reported error: {}",
                error
            )));
        }

        Ok(self.text)
    }

    fn consume_line(&mut self, line: &[u8]) {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line.trim(),
            Err(_) => {
                self.malformed += 1;
                return;
            }
        };
        if line.is_empty() {
            return;
        }

        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                self.malformed += 1;
                tracing::debug!(error = %e, "Skipping undecodable stream line");
                return;
            }
        };

        if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
            self.error = Some(error.to_string());
        }
        if let Some(fragment) = value.get("response").and_then(|r| r.as_str()) {
            self.text.push_str(fragment);
        }
        if value.get("done").and_then(|d| d.as_bool()).unwrap_or(false) {
            self.done = true;
        }
    }
}

/// Drain a streaming generate response into one string
pub async fn collect_generate_stream(response: reqwest::Response) -> Result<String, ProviderError> {
    let mut stream = response.bytes_stream();
    let mut accumulator = NdjsonAccumulator::new();

    while let Some(chunk) = stream.next().await {
        accumulator.push(&chunk?);
        if accumulator.is_done() {
            break;
        }
    }

    if accumulator.malformed_lines() > 0 {
        tracing::warn!(
            malformed_lines = accumulator.malformed_lines(),
            "Stream contained undecodable lines"
        );
    }

    accumulator.finish()
}
