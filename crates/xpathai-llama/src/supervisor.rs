//! Inference server supervisor.
//!
//! Owns zero or one `llama-server` child. `start` and `stop` are serialized
//! by a single lifecycle mutex; status readers use the watch channel and
//! never wait on it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::capability::{Acceleration, AccelerationProbe, NoAcceleration};
use crate::drain::OutputTail;
use crate::error::StartError;
use crate::health::{HealthCheck, HttpHealthCheck};
use crate::launch::{CommandLauncher, LaunchSpec, Launcher};
use crate::models::{canonical_model_name, ModelCatalog};
use crate::process::ProcessHandle;
use crate::prober::ReadinessProber;
use crate::state::{ServerState, ServerStatus, StatusCell};

const ACCELERATION_TIMEOUT: Duration = Duration::from_secs(10);
const TAIL_IN_ERRORS: usize = 5;

/// Supervisor settings.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub binary: PathBuf,
    pub models_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub ctx_size: u32,
    pub parallel: u32,
    /// Appended to every launch, before per-start arguments.
    pub extra_args: Vec<String>,
    pub start_timeout: Duration,
    pub stop_grace: Duration,
    pub probe_timeout: Duration,
}

impl SupervisorConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Reject settings the inference server cannot start with.
    pub fn check(&self) -> Result<(), StartError> {
        if self.binary.as_os_str().is_empty() {
            return Err(StartError::InvalidConfig("binary path is empty".to_string()));
        }
        if self.host.trim().is_empty() {
            return Err(StartError::InvalidConfig("host is empty".to_string()));
        }
        if self.port == 0 {
            return Err(StartError::InvalidConfig("port must be non-zero".to_string()));
        }
        if self.ctx_size == 0 || self.parallel == 0 {
            return Err(StartError::InvalidConfig(
                "ctx_size and parallel must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("llama-server"),
            models_dir: PathBuf::from("models"),
            host: "127.0.0.1".to_string(),
            port: 8080,
            ctx_size: 4096,
            parallel: 1,
            extra_args: Vec::new(),
            start_timeout: Duration::from_secs(300),
            stop_grace: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

/// Lifecycle manager for the inference server process.
pub struct LlamaSupervisor {
    config: SupervisorConfig,
    catalog: ModelCatalog,
    launcher: Arc<dyn Launcher>,
    health: Arc<dyn HealthCheck>,
    acceleration: Arc<dyn AccelerationProbe>,
    prober: ReadinessProber,
    status: StatusCell,
    lifecycle: Mutex<Option<ProcessHandle>>,
    spawn_count: AtomicU64,
    output: parking_lot::Mutex<Option<OutputTail>>,
}

impl LlamaSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let catalog = ModelCatalog::new(config.models_dir.clone());
        let health = Arc::new(HttpHealthCheck::new(config.base_url(), config.probe_timeout));
        let prober = ReadinessProber::new(config.start_timeout);
        Self {
            config,
            catalog,
            launcher: Arc::new(CommandLauncher),
            health,
            acceleration: Arc::new(NoAcceleration),
            prober,
            status: StatusCell::new(),
            lifecycle: Mutex::new(None),
            spawn_count: AtomicU64::new(0),
            output: parking_lot::Mutex::new(None),
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_health_check(mut self, health: Arc<dyn HealthCheck>) -> Self {
        self.health = health;
        self
    }

    pub fn with_acceleration(mut self, acceleration: Arc<dyn AccelerationProbe>) -> Self {
        self.acceleration = acceleration;
        self
    }

    pub fn with_prober(mut self, prober: ReadinessProber) -> Self {
        self.prober = prober;
        self
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn base_url(&self) -> String {
        self.config.base_url()
    }

    pub fn status(&self) -> ServerStatus {
        self.status.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServerStatus> {
        self.status.subscribe()
    }

    pub fn status_cell(&self) -> &StatusCell {
        &self.status
    }

    /// The model that is loaded and ready, if any.
    pub fn current_model(&self) -> Option<String> {
        let status = self.status.snapshot();
        if status.is_ready() { status.model } else { None }
    }

    pub fn pid(&self) -> Option<u32> {
        self.status.snapshot().pid
    }

    /// Number of processes spawned so far.
    pub fn spawn_count(&self) -> u64 {
        self.spawn_count.load(Ordering::SeqCst)
    }

    /// Most recent output lines of the current (or last) process.
    pub fn stderr_tail(&self) -> Vec<String> {
        self.output
            .lock()
            .as_ref()
            .map(OutputTail::snapshot)
            .unwrap_or_default()
    }

    /// Make `model` the running model.
    ///
    /// Returns immediately when it is already loaded and ready. Otherwise the
    /// current process is retired and a new one is spawned and probed. On
    /// failure the new process is retired and the state is `Stopped`, or
    /// `Dead` if the process exited on its own.
    pub async fn start(&self, model: &str, extra_args: &[String]) -> Result<(), StartError> {
        self.config.check()?;
        let name = canonical_model_name(model);
        let mut slot = self.lifecycle.lock().await;

        if let Some(handle) = slot.as_ref() {
            if handle.model() == name
                && handle.is_alive()
                && self.status.snapshot().is_ready_with(&name)
            {
                debug!("Model {} already running (pid {})", name, handle.pid());
                return Ok(());
            }
        }

        // Unknown models leave the running process untouched.
        let model_path = self.catalog.resolve(&name)?;

        if let Some(previous) = slot.take() {
            info!("Retiring model {} before starting {}", previous.model(), name);
            previous.retire(self.config.stop_grace).await;
        }
        self.status.set(ServerStatus {
            state: ServerState::Starting,
            ..ServerStatus::default()
        });

        let acceleration = tokio::time::timeout(ACCELERATION_TIMEOUT, self.acceleration.detect())
            .await
            .unwrap_or_else(|_| {
                debug!("Acceleration detection timed out, using CPU");
                Acceleration::cpu()
            });

        let mut args = self.config.extra_args.clone();
        args.extend(extra_args.iter().cloned());
        let spec = LaunchSpec {
            binary: self.config.binary.clone(),
            model_path,
            host: self.config.host.clone(),
            port: self.config.port,
            ctx_size: self.config.ctx_size,
            parallel: self.config.parallel,
            acceleration,
            extra_args: args,
        };

        info!("Starting inference server: {}", spec.command_line());
        let child = match self.launcher.launch(&spec) {
            Ok(child) => child,
            Err(e) => {
                self.status.set(ServerStatus::stopped());
                warn!("Failed to spawn {:?}: {}", spec.binary, e);
                return Err(StartError::Spawn(format!("{}: {}", spec.binary.display(), e)));
            }
        };
        self.spawn_count.fetch_add(1, Ordering::SeqCst);

        let Some(handle) = ProcessHandle::adopt(child, name.clone(), self.status.clone()) else {
            self.status.set(ServerStatus::stopped());
            return Err(StartError::Spawn(
                "process exited before its pid could be read".to_string(),
            ));
        };
        let pid = handle.pid();
        *self.output.lock() = Some(handle.output_tail());
        self.status.set(ServerStatus {
            state: ServerState::Starting,
            pid: Some(pid),
            ..ServerStatus::default()
        });

        let mut exit_rx = handle.exit_watch();
        let status = self.status.clone();
        let probed = self
            .prober
            .wait_ready(self.health.as_ref(), &mut exit_rx, |state| {
                status.update(|s| {
                    if s.pid == Some(pid) && s.state == ServerState::Starting {
                        s.state = state;
                    }
                })
            })
            .await;

        let probed = match (probed, handle.exit_info()) {
            (Ok(_), Some(exit)) => Err(StartError::ProcessDied {
                code: exit.code,
                detail: format!("process exited right after becoming ready ({})", exit),
            }),
            (result, _) => result,
        };

        match probed {
            Ok(report) => {
                self.status.set(ServerStatus {
                    state: ServerState::Ready,
                    model: Some(name.clone()),
                    pid: Some(pid),
                    exit_code: None,
                });
                info!(
                    "Model {} ready (pid {}, {:.1}s)",
                    name,
                    pid,
                    report.elapsed.as_secs_f64()
                );
                *slot = Some(handle);
                Ok(())
            }
            Err(err) => {
                let tail = handle.stderr_tail();
                handle.retire(self.config.stop_grace).await;
                let err = with_output_tail(err, &tail);
                let status = match &err {
                    StartError::ProcessDied { code, .. } => ServerStatus {
                        state: ServerState::Dead,
                        exit_code: *code,
                        ..ServerStatus::default()
                    },
                    _ => ServerStatus::stopped(),
                };
                self.status.set(status);
                warn!("Failed to start model {}: {}", name, err);
                Err(err)
            }
        }
    }

    /// Stop the running process, if any. Idempotent.
    pub async fn stop(&self) {
        let mut slot = self.lifecycle.lock().await;
        if let Some(handle) = slot.take() {
            info!("Stopping model {} (pid {})", handle.model(), handle.pid());
            handle.retire(self.config.stop_grace).await;
        }
        if self.status.snapshot() != ServerStatus::stopped() {
            self.status.set(ServerStatus::stopped());
        }
    }
}

fn with_output_tail(err: StartError, tail: &[String]) -> StartError {
    match err {
        StartError::ProcessDied { code, detail } if !tail.is_empty() => {
            let start = tail.len().saturating_sub(TAIL_IN_ERRORS);
            StartError::ProcessDied {
                code,
                detail: format!("{}; last output: {}", detail, tail[start..].join(" | ")),
            }
        }
        other => other,
    }
}

#[cfg(all(test, unix))]
#[path = "supervisor_tests.rs"]
mod tests;
