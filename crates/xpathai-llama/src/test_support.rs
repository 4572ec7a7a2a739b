//! Shared fakes for lifecycle tests.

use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tempfile::TempDir;
use tokio::process::{Child, Command};

use crate::health::{HealthCheck, HealthSample, ProbeOutcome};
use crate::launch::{LaunchSpec, Launcher};
use crate::prober::ReadinessProber;
use crate::schedule::PollSchedule;
use crate::supervisor::{LlamaSupervisor, SupervisorConfig};

pub(crate) fn is_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Launches a shell script instead of the inference server and records
/// every launch.
pub(crate) struct ShellLauncher {
    script: String,
    pub(crate) specs: Mutex<Vec<LaunchSpec>>,
    pub(crate) pids: Mutex<Vec<u32>>,
    /// Launches that happened while an earlier child was still alive.
    pub(crate) overlaps: AtomicUsize,
}

impl ShellLauncher {
    pub(crate) fn new(script: &str) -> Self {
        Self {
            script: script.to_string(),
            specs: Mutex::new(Vec::new()),
            pids: Mutex::new(Vec::new()),
            overlaps: AtomicUsize::new(0),
        }
    }

    /// A child that idles until it is terminated.
    pub(crate) fn sleeper() -> Self {
        Self::new("exec sleep 30")
    }

    pub(crate) fn launches(&self) -> usize {
        self.pids.lock().unwrap().len()
    }

    pub(crate) fn live_pids(&self) -> Vec<u32> {
        self.pids
            .lock()
            .unwrap()
            .iter()
            .copied()
            .filter(|pid| is_alive(*pid))
            .collect()
    }
}

impl Launcher for ShellLauncher {
    fn launch(&self, spec: &LaunchSpec) -> io::Result<Child> {
        if !self.live_pids().is_empty() {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let child = Command::new("sh")
            .args(["-c", &self.script])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        if let Some(pid) = child.id() {
            self.pids.lock().unwrap().push(pid);
        }
        self.specs.lock().unwrap().push(spec.clone());
        Ok(child)
    }
}

pub(crate) struct FailingLauncher;

impl Launcher for FailingLauncher {
    fn launch(&self, _spec: &LaunchSpec) -> io::Result<Child> {
        Err(io::Error::new(io::ErrorKind::NotFound, "llama-server not found"))
    }
}

/// Always answers with the same outcome.
pub(crate) struct StaticHealth(pub(crate) ProbeOutcome);

#[async_trait]
impl HealthCheck for StaticHealth {
    async fn probe(&self) -> HealthSample {
        HealthSample::now(self.0.clone())
    }
}

pub(crate) fn models_dir(names: &[&str]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in names {
        std::fs::write(dir.path().join(name), b"GGUF").unwrap();
    }
    dir
}

pub(crate) fn fast_prober(budget: Duration) -> ReadinessProber {
    ReadinessProber::new(budget).with_schedule(PollSchedule::fixed(Duration::from_millis(10)))
}

pub(crate) fn supervisor(
    dir: &TempDir,
    launcher: Arc<dyn Launcher>,
    health: ProbeOutcome,
) -> LlamaSupervisor {
    let config = SupervisorConfig {
        models_dir: dir.path().to_path_buf(),
        stop_grace: Duration::from_secs(2),
        ..SupervisorConfig::default()
    };
    LlamaSupervisor::new(config)
        .with_launcher(launcher)
        .with_health_check(Arc::new(StaticHealth(health)))
        .with_prober(fast_prober(Duration::from_secs(2)))
}
