//! OpenAI-compatible chat completions.
//!
//! Only the subset the browser extension sends is understood: the last user
//! message becomes the prompt, no streaming, one choice.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use xpathai_llama::GenerationRequest;

use crate::error::ApiError;
use crate::http::handlers::SamplingOverrides;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: MessageContent,
}

/// Plain text or a list of typed parts, of which only text is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl MessageContent {
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub part_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(flatten)]
    pub sampling: SamplingOverrides,
}

impl ChatCompletionRequest {
    /// Text of the last non-empty user message.
    pub fn prompt(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == "user")
            .map(|m| m.content.as_text())
            .find(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
    pub execution_time: f64,
    pub backend: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: &'static str,
}

/// Whitespace-separated word counts, not tokenizer tokens.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    pub fn from_text(prompt: &str, completion: &str) -> Self {
        let prompt_tokens = prompt.split_whitespace().count();
        let completion_tokens = completion.split_whitespace().count();
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatCompletionRequest>,
) -> Result<Json<ChatCompletionResponse>, ApiError> {
    state.increment_requests();
    let started = Instant::now();

    if req.stream {
        return Err(ApiError::BadRequest("streaming is not supported".to_string()));
    }
    if req.messages.is_empty() {
        return Err(ApiError::BadRequest(
            "messages must contain at least one message".to_string(),
        ));
    }
    let prompt = req
        .prompt()
        .ok_or_else(|| ApiError::BadRequest("No user message found in request".to_string()))?;
    let params = req.sampling.apply(&state.sampling)?;

    // Clients send their own model names; only local model files switch.
    let catalog = state.switchboard.supervisor().catalog();
    let model = req.model.as_deref().filter(|m| catalog.contains(m));
    if model.is_none() {
        if let Some(requested) = req.model.as_deref() {
            debug!("Ignoring unknown chat model {:?}, using the loaded one", requested);
        }
    }

    let request = GenerationRequest::new(prompt.clone())
        .with_params(params)
        .with_timeout(state.generation_timeout);
    let generation = state.switchboard.generate(model, &request).await?;

    info!("Chat completion with {:?} in {:?}", generation.model, generation.elapsed);
    let usage = Usage::from_text(&prompt, &generation.text);
    Ok(Json(ChatCompletionResponse {
        id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
        object: "chat.completion",
        created: chrono::Utc::now().timestamp(),
        model: generation
            .model
            .or_else(|| req.model.clone())
            .unwrap_or_default(),
        choices: vec![Choice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content: MessageContent::Text(generation.text),
            },
            finish_reason: "stop",
        }],
        usage,
        execution_time: started.elapsed().as_secs_f64(),
        backend: "llama.cpp",
    }))
}

#[cfg(test)]
#[path = "openai_compat_tests.rs"]
mod tests;
