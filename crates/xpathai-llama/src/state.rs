//! Observable server state.
//!
//! State, model identity and pid live in one [`ServerStatus`] value published
//! through a single watch channel, so readers always see them together.

use std::fmt;
use std::process::ExitStatus;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

/// Lifecycle state of the supervised inference server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    #[default]
    Stopped,
    Starting,
    Loading,
    Ready,
    Dead,
}

impl ServerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Dead => "dead",
        }
    }

    /// Coarse readiness label: `ready`, `loading` or `unhealthy`.
    pub fn server_status(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Starting | Self::Loading => "loading",
            Self::Stopped | Self::Dead => "unhealthy",
        }
    }

    /// Process label: `running`, `dead` or `stopped`.
    pub fn process_status(&self) -> &'static str {
        match self {
            Self::Starting | Self::Loading | Self::Ready => "running",
            Self::Dead => "dead",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }

    /// Exit info when the status could not be collected.
    pub fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => f.write_str("unknown exit"),
        }
    }
}

/// Point-in-time view of the supervisor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub state: ServerState,
    pub model: Option<String>,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
}

impl ServerStatus {
    pub fn stopped() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.state == ServerState::Ready
    }

    /// True when `model` is loaded and answering.
    pub fn is_ready_with(&self, model: &str) -> bool {
        self.is_ready() && self.model.as_deref() == Some(model)
    }
}

/// Shared, cloneable publisher of [`ServerStatus`].
#[derive(Clone)]
pub struct StatusCell {
    tx: Arc<watch::Sender<ServerStatus>>,
}

impl StatusCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ServerStatus::stopped());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> ServerStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServerStatus> {
        self.tx.subscribe()
    }

    pub fn set(&self, status: ServerStatus) {
        self.tx.send_replace(status);
    }

    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut ServerStatus),
    {
        self.tx.send_modify(f);
    }

    /// Record an unexpected exit of `pid`.
    ///
    /// Ignored when the published status belongs to another process, so a
    /// late reaper never clobbers the status of its successor.
    pub fn mark_dead(&self, pid: u32, exit: ExitInfo) -> bool {
        self.tx.send_if_modified(|status| {
            if status.pid != Some(pid) || status.state == ServerState::Stopped {
                return false;
            }
            *status = ServerStatus {
                state: ServerState::Dead,
                model: None,
                pid: None,
                exit_code: exit.code,
            };
            true
        })
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StatusCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StatusCell").field(&*self.tx.borrow()).finish()
    }
}
