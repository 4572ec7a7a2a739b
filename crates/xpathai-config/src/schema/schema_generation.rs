//! Generation defaults and XPath pipeline settings.

use serde::{Deserialize, Serialize};

/// Sampling defaults applied when a request leaves a knob unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_top_k")]
    pub top_k: u32,

    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,

    #[serde(default)]
    pub frequency_penalty: f32,

    #[serde(default)]
    pub presence_penalty: f32,

    #[serde(default = "default_stop")]
    pub stop: Vec<String>,

    /// Hard timeout of one generation call.
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            repeat_penalty: default_repeat_penalty(),
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            stop: default_stop(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_max_tokens() -> u32 {
    512
}

fn default_temperature() -> f32 {
    0.3
}

fn default_top_p() -> f32 {
    0.8
}

fn default_top_k() -> u32 {
    30
}

fn default_repeat_penalty() -> f32 {
    1.3
}

fn default_stop() -> Vec<String> {
    vec!["</s>".to_string(), "<|end|>".to_string(), "\n\n\n".to_string()]
}

fn default_generation_timeout() -> u64 {
    120
}

/// What to do with a DOM longer than `max_dom_chars`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncationPolicy {
    /// Cut the DOM at the limit.
    #[default]
    Truncate,
    /// Keep the DOM and report a warning.
    Warn,
}

/// DOM sanitation and prompt settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XPathConfig {
    #[serde(default = "default_max_dom_chars")]
    pub max_dom_chars: usize,

    #[serde(default)]
    pub truncation: TruncationPolicy,

    /// Prompt template with `{element}` and `{dom}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
}

impl Default for XPathConfig {
    fn default() -> Self {
        Self {
            max_dom_chars: default_max_dom_chars(),
            truncation: TruncationPolicy::default(),
            prompt_template: None,
        }
    }
}

fn default_max_dom_chars() -> usize {
    70_000
}
