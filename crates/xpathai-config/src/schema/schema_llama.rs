//! Inference server (llama.cpp) configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::default_true;

/// Settings for the supervised `llama-server` process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlamaConfig {
    /// Path to the `llama-server` binary.
    #[serde(default = "default_binary")]
    pub binary: PathBuf,

    /// Directory scanned for `.gguf` model files.
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Interface the inference server binds to.
    #[serde(default = "default_llama_host")]
    pub host: String,

    #[serde(default = "default_llama_port")]
    pub port: u16,

    /// Context size in tokens (`--ctx-size`).
    #[serde(default = "default_ctx_size")]
    pub ctx_size: u32,

    /// Parallel decoding slots (`--parallel`).
    #[serde(default = "default_parallel")]
    pub parallel: u32,

    /// Model started at boot and used when a request names none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Budget for the server to become ready after spawn.
    #[serde(default = "default_start_timeout")]
    pub start_timeout_secs: u64,

    /// Grace period between SIGTERM and SIGKILL.
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: u64,

    /// Timeout of a single health probe.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Extra arguments appended to the launch command.
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Fixed number of layers to offload; skips detection when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_layers: Option<u32>,

    /// Fixed GPU index (`--main-gpu`); only used with `gpu_layers`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_gpu: Option<u32>,

    /// Probe for GPUs when no fixed offload is configured.
    #[serde(default = "default_true")]
    pub detect_gpu: bool,
}

impl Default for LlamaConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            models_dir: default_models_dir(),
            host: default_llama_host(),
            port: default_llama_port(),
            ctx_size: default_ctx_size(),
            parallel: default_parallel(),
            default_model: None,
            start_timeout_secs: default_start_timeout(),
            stop_grace_secs: default_stop_grace(),
            probe_timeout_ms: default_probe_timeout(),
            extra_args: Vec::new(),
            gpu_layers: None,
            main_gpu: None,
            detect_gpu: default_true(),
        }
    }
}

impl LlamaConfig {
    /// Base URL of the inference server's HTTP interface.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

fn default_binary() -> PathBuf {
    PathBuf::from("llama-server")
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_llama_host() -> String {
    "127.0.0.1".to_string()
}

fn default_llama_port() -> u16 {
    8080
}

fn default_ctx_size() -> u32 {
    4096
}

fn default_parallel() -> u32 {
    1
}

fn default_start_timeout() -> u64 {
    300
}

fn default_stop_grace() -> u64 {
    5
}

fn default_probe_timeout() -> u64 {
    2000
}
