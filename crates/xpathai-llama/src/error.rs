//! Error types for the inference server lifecycle.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::state::ServerState;

/// Caller-facing error category.
///
/// Lets a client decide whether to retry (timeouts, upstream failures) or
/// give up (unknown model) without matching on the concrete error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ModelNotFound,
    ProcessDied,
    StartTimeout,
    NotReady,
    Upstream,
    Spawn,
    InvalidConfig,
}

impl ErrorKind {
    /// Stable snake_case identifier used in API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelNotFound => "model_not_found",
            Self::ProcessDied => "process_died",
            Self::StartTimeout => "start_timeout",
            Self::NotReady => "not_ready",
            Self::Upstream => "upstream_error",
            Self::Spawn => "spawn_failed",
            Self::InvalidConfig => "invalid_config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from [`LlamaSupervisor::start`](crate::LlamaSupervisor::start).
#[derive(Debug, Error)]
pub enum StartError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Inference server exited before becoming ready (exit code {}): {detail}", fmt_code(.code))]
    ProcessDied { code: Option<i32>, detail: String },

    #[error("Inference server not ready after {waited:?}")]
    StartTimeout { waited: Duration },

    #[error("Failed to spawn inference server: {0}")]
    Spawn(String),

    #[error("Invalid inference server configuration: {0}")]
    InvalidConfig(String),
}

impl StartError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ModelNotFound(_) => ErrorKind::ModelNotFound,
            Self::ProcessDied { .. } => ErrorKind::ProcessDied,
            Self::StartTimeout { .. } => ErrorKind::StartTimeout,
            Self::Spawn(_) => ErrorKind::Spawn,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StartTimeout { .. } | Self::ProcessDied { .. })
    }
}

/// Errors from [`GenerationGateway::generate`](crate::GenerationGateway::generate).
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Inference server is not ready (state: {0})")]
    NotReady(ServerState),

    #[error("Inference server died during generation (exit code {})", fmt_code(.code))]
    ProcessDied { code: Option<i32> },

    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl GenerateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotReady(_) => ErrorKind::NotReady,
            Self::ProcessDied { .. } => ErrorKind::ProcessDied,
            Self::Upstream(_) => ErrorKind::Upstream,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::NotReady(ServerState::Loading | ServerState::Starting))
    }
}

/// Errors from the [`ModelSwitchboard`](crate::ModelSwitchboard).
#[derive(Debug, Error)]
pub enum SwitchError {
    #[error(transparent)]
    Start(#[from] StartError),

    #[error(transparent)]
    Generate(#[from] GenerateError),
}

impl SwitchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Start(e) => e.kind(),
            Self::Generate(e) => e.kind(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Start(e) => e.is_retryable(),
            Self::Generate(e) => e.is_retryable(),
        }
    }
}

fn fmt_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string())
}
