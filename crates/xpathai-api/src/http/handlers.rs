//! Generation handlers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use xpathai_llama::{GenerationRequest, SamplingParams};
use xpathai_xpath::{
    extract_answer, sanitize, verified_heuristic_xpath, ElementDescriptor, Extraction,
    PromptBuilder, XPathError,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Sampling fields a request may override.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SamplingOverrides {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub repeat_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub stop: Option<Vec<String>>,
}

impl SamplingOverrides {
    /// `base` with every set field replaced, after range checks.
    pub fn apply(&self, base: &SamplingParams) -> Result<SamplingParams, ApiError> {
        if self.max_tokens == Some(0) {
            return Err(ApiError::BadRequest("max_tokens must be positive".to_string()));
        }
        if self.temperature.is_some_and(|t| !(0.0..=2.0).contains(&t)) {
            return Err(ApiError::BadRequest(
                "temperature must be between 0 and 2".to_string(),
            ));
        }
        if self.top_p.is_some_and(|p| p <= 0.0 || p > 1.0) {
            return Err(ApiError::BadRequest("top_p must be in (0, 1]".to_string()));
        }
        if self.repeat_penalty.is_some_and(|p| p < 0.0) {
            return Err(ApiError::BadRequest(
                "repeat_penalty must not be negative".to_string(),
            ));
        }

        let mut params = base.clone();
        if let Some(v) = self.max_tokens {
            params.max_tokens = v;
        }
        if let Some(v) = self.temperature {
            params.temperature = v;
        }
        if let Some(v) = self.top_p {
            params.top_p = v;
        }
        if let Some(v) = self.top_k {
            params.top_k = v;
        }
        if let Some(v) = self.repeat_penalty {
            params.repeat_penalty = v;
        }
        if let Some(v) = self.frequency_penalty {
            params.frequency_penalty = v;
        }
        if let Some(v) = self.presence_penalty {
            params.presence_penalty = v;
        }
        if let Some(v) = &self.stop {
            params.stop = v.clone();
        }
        Ok(params)
    }
}

/// `POST /generate` body.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(flatten)]
    pub sampling: SamplingOverrides,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub text: String,
    pub model: Option<String>,
    /// Seconds spent in the handler, model swap included.
    pub execution_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_predicted: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_evaluated: Option<u64>,
}

pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    state.increment_requests();
    let started = Instant::now();

    if req.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".to_string()));
    }
    let params = req.sampling.apply(&state.sampling)?;
    let timeout = match req.timeout_secs {
        Some(0) => return Err(ApiError::BadRequest("timeout_secs must be positive".to_string())),
        Some(secs) => Duration::from_secs(secs),
        None => state.generation_timeout,
    };

    let request = GenerationRequest::new(req.prompt)
        .with_params(params)
        .with_timeout(timeout);
    let generation = state
        .switchboard
        .generate(req.model.as_deref(), &request)
        .await?;

    info!(
        "Generated {} chars with {} in {:?}",
        generation.text.len(),
        generation.model.as_deref().unwrap_or("unknown model"),
        generation.elapsed
    );
    Ok(Json(GenerateResponse {
        text: generation.text,
        model: generation.model,
        execution_time: started.elapsed().as_secs_f64(),
        tokens_predicted: generation.tokens_predicted,
        tokens_evaluated: generation.tokens_evaluated,
    }))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XPathMode {
    #[default]
    Ai,
    Heuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum XPathSource {
    Ai,
    Heuristic,
}

/// `POST /generate-xpath` body.
#[derive(Debug, Deserialize)]
pub struct XPathRequest {
    pub dom: String,
    pub element: ElementDescriptor,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub mode: XPathMode,
    /// Replaces the configured template for this request.
    #[serde(default)]
    pub prompt_template: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct XPathResponse {
    pub xpath: String,
    pub alternative_xpath: Option<String>,
    pub explanation: Option<String>,
    pub source: XPathSource,
    pub model: Option<String>,
    pub execution_time: f64,
    pub warnings: Vec<String>,
}

const HEURISTIC_EXPLANATION: &str = "Built from the element's most identifying attribute.";
const RAW_LOG_CHARS: usize = 200;

pub async fn generate_xpath(
    State(state): State<Arc<AppState>>,
    Json(req): Json<XPathRequest>,
) -> Result<Json<XPathResponse>, ApiError> {
    state.increment_requests();
    let started = Instant::now();

    if req.dom.trim().is_empty() {
        return Err(XPathError::EmptyDom.into());
    }
    req.element.tag_name()?;

    if req.mode == XPathMode::Heuristic {
        let xpath = verified_heuristic_xpath(&req.element, &req.dom)?;
        return Ok(Json(XPathResponse {
            xpath,
            alternative_xpath: None,
            explanation: Some(HEURISTIC_EXPLANATION.to_string()),
            source: XPathSource::Heuristic,
            model: None,
            execution_time: started.elapsed().as_secs_f64(),
            warnings: Vec::new(),
        }));
    }

    let cleaned = sanitize(&req.dom, state.xpath.max_dom_chars, state.xpath.truncation)?;
    let mut warnings = cleaned.warnings;
    let prompt = match req.prompt_template.as_deref().filter(|t| !t.trim().is_empty()) {
        Some(template) => PromptBuilder::new(template).build(&req.element, &cleaned.text),
        None => state.xpath.prompt.build(&req.element, &cleaned.text),
    };

    let request = GenerationRequest::new(prompt)
        .with_params(state.sampling.clone())
        .with_timeout(state.generation_timeout);
    let generation = state
        .switchboard
        .generate(req.model.as_deref(), &request)
        .await?;

    let response = match extract_answer(&generation.text) {
        Extraction::Extracted(answer) => {
            warnings.extend(answer.dom_warnings(&req.dom));
            XPathResponse {
                xpath: answer.primary,
                alternative_xpath: answer.alternative,
                explanation: answer.explanation,
                source: XPathSource::Ai,
                model: generation.model,
                execution_time: started.elapsed().as_secs_f64(),
                warnings,
            }
        }
        Extraction::Unparsed { raw } => {
            let preview: String = raw.chars().take(RAW_LOG_CHARS).collect();
            warn!("Model answer contained no XPath: {:?}", preview);
            let xpath = verified_heuristic_xpath(&req.element, &req.dom)
                .map_err(|_| ApiError::from(XPathError::Unparsed))?;
            warnings.push("Model response contained no XPath; used attribute heuristic".to_string());
            XPathResponse {
                xpath,
                alternative_xpath: None,
                explanation: Some(HEURISTIC_EXPLANATION.to_string()),
                source: XPathSource::Heuristic,
                model: generation.model,
                execution_time: started.elapsed().as_secs_f64(),
                warnings,
            }
        }
    };

    info!("XPath for <{}>: {} ({:?})", req.element.tag.trim(), response.xpath, response.source);
    Ok(Json(response))
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
