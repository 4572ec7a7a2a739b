//! Completion calls against the llama.cpp HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::params::GenerationRequest;

const ERROR_BODY_LIMIT: usize = 500;

/// Body of `POST /completion`.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionPayload {
    pub prompt: String,
    pub n_predict: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    pub stream: bool,
    pub cache_prompt: bool,
}

impl CompletionPayload {
    pub fn from_request(request: &GenerationRequest) -> Self {
        let params = request.params();
        Self {
            prompt: request.prompt().to_string(),
            n_predict: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
            repeat_penalty: params.repeat_penalty,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
            stop: params.stop.clone(),
            stream: false,
            cache_prompt: true,
        }
    }
}

/// Relevant fields of the completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionReply {
    pub content: String,
    #[serde(default)]
    pub tokens_predicted: Option<u64>,
    #[serde(default)]
    pub tokens_evaluated: Option<u64>,
}

/// Failure of one completion call.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Issues completion requests.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn complete(
        &self,
        payload: &CompletionPayload,
        timeout: Duration,
    ) -> Result<CompletionReply, TransportError>;
}

/// HTTP transport for `POST {base_url}/completion`.
pub struct HttpCompletion {
    client: reqwest::Client,
    url: String,
}

impl HttpCompletion {
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/completion", base_url.as_ref().trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl CompletionTransport for HttpCompletion {
    async fn complete(
        &self,
        payload: &CompletionPayload,
        timeout: Duration,
    ) -> Result<CompletionReply, TransportError> {
        debug!(
            "POST {} ({} prompt chars, n_predict={})",
            self.url,
            payload.prompt.len(),
            payload.n_predict
        );

        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| classify(e, timeout))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: truncate(&body, ERROR_BODY_LIMIT),
            });
        }

        serde_json::from_str(&body).map_err(|e| TransportError::Malformed(e.to_string()))
    }
}

fn classify(e: reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        TransportError::Connection(e.to_string())
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
#[path = "completion_tests.rs"]
mod tests;
