//! Owned handle to one running inference server process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::drain::{DrainHandle, OutputTail};
use crate::state::{ExitInfo, StatusCell};

const REAPER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A spawned child plus the tasks that watch it.
///
/// The reaper task owns the [`Child`]: it waits for exit, publishes the exit
/// status and, unless the process is being retired on purpose, marks the
/// server dead.
pub(crate) struct ProcessHandle {
    model: String,
    pid: u32,
    exit_rx: watch::Receiver<Option<ExitInfo>>,
    kill_tx: Option<oneshot::Sender<()>>,
    reaper: JoinHandle<()>,
    drain: DrainHandle,
    retiring: Arc<AtomicBool>,
}

impl ProcessHandle {
    /// Take ownership of a freshly spawned child.
    pub(crate) fn adopt(mut child: Child, model: String, status: StatusCell) -> Option<Self> {
        let pid = child.id()?;
        let drain = DrainHandle::spawn(child.stdout.take(), child.stderr.take());
        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, kill_rx) = oneshot::channel();
        let retiring = Arc::new(AtomicBool::new(false));

        let reaper = tokio::spawn(reap(
            child,
            pid,
            kill_rx,
            exit_tx,
            status,
            Arc::clone(&retiring),
        ));

        Some(Self {
            model,
            pid,
            exit_rx,
            kill_tx: Some(kill_tx),
            reaper,
            drain,
            retiring,
        })
    }

    pub(crate) fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn pid(&self) -> u32 {
        self.pid
    }

    pub(crate) fn exit_watch(&self) -> watch::Receiver<Option<ExitInfo>> {
        self.exit_rx.clone()
    }

    pub(crate) fn exit_info(&self) -> Option<ExitInfo> {
        *self.exit_rx.borrow()
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.exit_info().is_none()
    }

    pub(crate) fn stderr_tail(&self) -> Vec<String> {
        self.drain.tail().snapshot()
    }

    pub(crate) fn output_tail(&self) -> OutputTail {
        self.drain.tail().clone()
    }

    /// Terminate the process and release everything it owns.
    ///
    /// SIGTERM first, then a kill once `grace` runs out. Never fails; problems
    /// are logged.
    pub(crate) async fn retire(mut self, grace: Duration) -> Option<ExitInfo> {
        self.retiring.store(true, Ordering::SeqCst);

        if self.is_alive() {
            debug!("Terminating inference server (pid {})", self.pid);
            let exited = if terminate(self.pid) {
                let mut exit_rx = self.exit_rx.clone();
                let waited = tokio::time::timeout(grace, exit_rx.wait_for(Option::is_some)).await;
                matches!(waited, Ok(Ok(_)))
            } else {
                false
            };
            if !exited {
                warn!(
                    "Inference server (pid {}) did not exit within {:?}, killing",
                    self.pid, grace
                );
                if let Some(kill_tx) = self.kill_tx.take() {
                    let _ = kill_tx.send(());
                }
            }
        }

        let abort = self.reaper.abort_handle();
        if tokio::time::timeout(REAPER_JOIN_TIMEOUT, &mut self.reaper)
            .await
            .is_err()
        {
            warn!("Reaper for pid {} did not finish, aborting", self.pid);
            abort.abort();
        }

        let exit = self.exit_info();
        self.drain.retire().await;

        info!(
            "Inference server (pid {}) stopped: {}",
            self.pid,
            exit.map(|e| e.to_string())
                .unwrap_or_else(|| "exit status unknown".to_string())
        );
        exit
    }
}

async fn reap(
    mut child: Child,
    pid: u32,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: watch::Sender<Option<ExitInfo>>,
    status: StatusCell,
    retiring: Arc<AtomicBool>,
) {
    let result = tokio::select! {
        result = child.wait() => result,
        _ = kill_rx => {
            if let Err(e) = child.start_kill() {
                debug!("Kill of pid {} failed: {}", pid, e);
            }
            child.wait().await
        }
    };

    let exit = match result {
        Ok(status) => ExitInfo::from_status(status),
        Err(e) => {
            warn!("Failed to collect exit status of pid {}: {}", pid, e);
            ExitInfo::unknown()
        }
    };
    exit_tx.send_replace(Some(exit));

    if !retiring.load(Ordering::SeqCst) && status.mark_dead(pid, exit) {
        warn!("Inference server (pid {}) exited unexpectedly: {}", pid, exit);
    }
}

/// Ask the process to shut down gracefully. Returns false when no signal
/// could be delivered.
#[cfg(unix)]
fn terminate(pid: u32) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            debug!("SIGTERM to pid {} failed: {}", pid, e);
            false
        }
    }
}

#[cfg(not(unix))]
fn terminate(_pid: u32) -> bool {
    false
}

#[cfg(all(test, unix))]
#[path = "process_tests.rs"]
mod tests;
