//! Ollama API client implementation
//!
//! This module implements the ModelBackend trait for the Ollama HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::backend::client::ModelBackend;
use crate::error::{CritiqError, Result};

/// Ollama generate endpoint path
const GENERATE_PATH: &str = "/api/generate";

/// Ollama API client
pub struct OllamaBackend {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl OllamaBackend {
    /// Create a new Ollama client for the given base URL.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            CritiqError::BackendUnavailable(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        })
    }

    /// Build the request body for the generate endpoint.
    fn build_request(model: &str, prompt: &str, stream: bool) -> Value {
        json!({
            "model": model,
            "prompt": prompt,
            "stream": stream,
        })
    }

    /// Extract the generated text from a non-streaming response body.
    fn parse_response(body: &Value) -> Result<String> {
        body["response"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                CritiqError::InvalidResponse(format!("missing response field in: {}", body))
            })
    }

    fn generate_url(&self) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), GENERATE_PATH)
    }

    fn transport_error(&self, err: reqwest::Error) -> CritiqError {
        CritiqError::from_transport(err, self.timeout.as_secs())
    }

    async fn send_request(&self, body: Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.generate_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CritiqError::BackendUnavailable(format!(
                "API error {}: {}",
                status, error_body
            )));
        }

        Ok(response)
    }
}

/// Drain complete NDJSON lines out of `buf`, leaving any partial trailing
/// line in place for the next chunk.
fn drain_lines(buf: &mut String) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buf.find('\n') {
        let line: String = buf.drain(..=pos).collect();
        let line = line.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    lines
}

/// Parse one NDJSON stream line into its token and done flag.
fn parse_stream_line(line: &str) -> Result<(String, bool)> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| CritiqError::InvalidResponse(format!("bad stream line: {}", e)))?;
    let token = value["response"].as_str().unwrap_or("").to_string();
    let done = value["done"].as_bool().unwrap_or(false);
    Ok((token, done))
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        let body = Self::build_request(model, prompt, false);
        let response = self.send_request(body).await?;
        let value: Value = response.json().await.map_err(|e| self.transport_error(e))?;
        Self::parse_response(&value)
    }

    async fn stream(
        &self,
        model: &str,
        prompt: &str,
        chunk_tx: mpsc::Sender<String>,
    ) -> Result<String> {
        let body = Self::build_request(model, prompt, true);
        let response = self.send_request(body).await?;

        let mut byte_stream = response.bytes_stream();
        let mut buf = String::new();
        let mut text = String::new();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(|e| self.transport_error(e))?;
            buf.push_str(&String::from_utf8_lossy(&chunk));

            for line in drain_lines(&mut buf) {
                let (token, done) = parse_stream_line(&line)?;
                if !token.is_empty() {
                    text.push_str(&token);
                    // Receiver may have been dropped; assembly continues.
                    let _ = chunk_tx.send(token).await;
                }
                if done {
                    return Ok(text);
                }
            }
        }

        Ok(text)
    }
}

impl std::fmt::Debug for OllamaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaBackend")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}
