//! Application state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use xpathai_config::{GenerationConfig, TruncationPolicy as ConfiguredTruncation, XPathConfig};
use xpathai_llama::{ModelSwitchboard, SamplingParams, DEFAULT_GENERATION_TIMEOUT};
use xpathai_xpath::{PromptBuilder, TruncationPolicy};

/// How `/generate-xpath` prepares its prompt.
#[derive(Debug, Clone)]
pub struct XPathSettings {
    pub max_dom_chars: usize,
    pub truncation: TruncationPolicy,
    pub prompt: PromptBuilder,
}

impl Default for XPathSettings {
    fn default() -> Self {
        Self::from_config(&XPathConfig::default())
    }
}

impl XPathSettings {
    pub fn from_config(config: &XPathConfig) -> Self {
        let truncation = match config.truncation {
            ConfiguredTruncation::Truncate => TruncationPolicy::Truncate,
            ConfiguredTruncation::Warn => TruncationPolicy::Warn,
        };
        Self {
            max_dom_chars: config.max_dom_chars,
            truncation,
            prompt: PromptBuilder::from_override(config.prompt_template.as_deref()),
        }
    }
}

/// Application state shared across handlers.
pub struct AppState {
    pub switchboard: Arc<ModelSwitchboard>,
    /// Sampling used for request fields left unset.
    pub sampling: SamplingParams,
    pub generation_timeout: Duration,
    pub xpath: XPathSettings,
    start_time: Instant,
    request_count: AtomicU64,
}

impl AppState {
    pub fn new(switchboard: Arc<ModelSwitchboard>) -> Self {
        Self {
            switchboard,
            sampling: SamplingParams::default(),
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            xpath: XPathSettings::default(),
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
        }
    }

    pub fn from_config(
        switchboard: Arc<ModelSwitchboard>,
        generation: &GenerationConfig,
        xpath: &XPathConfig,
    ) -> Self {
        let sampling = SamplingParams {
            max_tokens: generation.max_tokens,
            temperature: generation.temperature,
            top_p: generation.top_p,
            top_k: generation.top_k,
            repeat_penalty: generation.repeat_penalty,
            frequency_penalty: generation.frequency_penalty,
            presence_penalty: generation.presence_penalty,
            stop: generation.stop.clone(),
        };
        Self {
            sampling,
            generation_timeout: Duration::from_secs(generation.timeout_secs),
            xpath: XPathSettings::from_config(xpath),
            ..Self::new(switchboard)
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn increment_requests(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }
}
