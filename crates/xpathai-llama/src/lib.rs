//! # XPathAI Llama
//!
//! Lifecycle management for a local `llama-server` inference process.
//!
//! ```text
//!   caller ──► ModelSwitchboard ──► LlamaSupervisor ──► llama-server (child)
//!                    │                    │  ▲
//!                    │                    ▼  │ /health
//!                    │              ReadinessProber
//!                    ▼
//!            GenerationGateway ──────────────► /completion
//! ```
//!
//! - [`LlamaSupervisor`] owns zero or one child process, serializes
//!   start/stop under one mutex and publishes a [`ServerStatus`] snapshot.
//! - [`ReadinessProber`] polls the health endpoint on a decaying schedule and
//!   fails fast when the child exits.
//! - [`GenerationGateway`] issues one completion against a ready server.
//! - [`ModelSwitchboard`] is the entry point for "ensure model M, then
//!   generate", keeping generations and model swaps from overlapping.

pub mod capability;
pub mod completion;
mod drain;
pub mod error;
pub mod gateway;
pub mod health;
pub mod launch;
pub mod models;
pub mod params;
mod process;
pub mod prober;
pub mod schedule;
pub mod state;
pub mod supervisor;
pub mod switchboard;

#[cfg(all(test, unix))]
mod test_support;

pub use capability::{
    default_probe, Acceleration, AccelerationProbe, FixedAcceleration, GpuDevice, MetalProbe,
    NoAcceleration, NvidiaSmiProbe,
};
pub use completion::{
    CompletionPayload, CompletionReply, CompletionTransport, HttpCompletion, TransportError,
};
pub use error::{ErrorKind, GenerateError, StartError, SwitchError};
pub use gateway::{Generation, GenerationGateway};
pub use health::{HealthCheck, HealthSample, HttpHealthCheck, ProbeOutcome};
pub use launch::{CommandLauncher, LaunchSpec, Launcher};
pub use models::{canonical_model_name, ModelCatalog, ModelInfo, MODEL_EXTENSION};
pub use params::{GenerationRequest, SamplingParams, DEFAULT_GENERATION_TIMEOUT};
pub use prober::{ProbeEvent, ProbeReport, ReadinessProber};
pub use schedule::PollSchedule;
pub use state::{ExitInfo, ServerState, ServerStatus, StatusCell};
pub use supervisor::{LlamaSupervisor, SupervisorConfig};
pub use switchboard::ModelSwitchboard;
