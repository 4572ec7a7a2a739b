//! Background draining of the child's output streams.
//!
//! Keeps the child from stalling on a full pipe, forwards its output to
//! tracing under the `llama_server` target and retains a short tail for
//! error reports.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const TAIL_LINES: usize = 20;
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared ring of the most recent output lines.
#[derive(Debug, Clone, Default)]
pub(crate) struct OutputTail {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl OutputTail {
    fn push(&self, line: String) {
        let mut lines = self.lines.lock();
        if lines.len() == TAIL_LINES {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    pub(crate) fn snapshot(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }
}

/// Health polling shows up in the server's request log; skip it.
pub(crate) fn is_noise(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.contains("GET /health") || line.contains("/health HTTP")
}

/// Handle to a running drain task.
pub(crate) struct DrainHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    tail: OutputTail,
}

impl DrainHandle {
    pub(crate) fn spawn(stdout: Option<ChildStdout>, stderr: Option<ChildStderr>) -> Self {
        let cancel = CancellationToken::new();
        let tail = OutputTail::default();
        let task = tokio::spawn(drain(
            stdout.map(line_reader),
            stderr.map(line_reader),
            tail.clone(),
            cancel.clone(),
        ));
        Self { cancel, task, tail }
    }

    pub(crate) fn tail(&self) -> &OutputTail {
        &self.tail
    }

    /// Stop draining and wait for the task to finish.
    pub(crate) async fn retire(self) {
        self.cancel.cancel();
        let abort = self.task.abort_handle();
        if tokio::time::timeout(JOIN_TIMEOUT, self.task).await.is_err() {
            warn!("Output drain task did not stop in time, aborting");
            abort.abort();
        }
    }
}

fn line_reader<R: AsyncRead + Unpin>(reader: R) -> Lines<BufReader<R>> {
    BufReader::new(reader).lines()
}

enum Event {
    Line(&'static str, String),
    Closed(&'static str),
}

async fn next_line<R: AsyncRead + Unpin>(
    lines: &mut Option<Lines<BufReader<R>>>,
) -> Option<std::io::Result<Option<String>>> {
    match lines {
        Some(lines) => Some(lines.next_line().await),
        None => std::future::pending().await,
    }
}

async fn drain(
    mut stdout: Option<Lines<BufReader<ChildStdout>>>,
    mut stderr: Option<Lines<BufReader<ChildStderr>>>,
    tail: OutputTail,
    cancel: CancellationToken,
) {
    while stdout.is_some() || stderr.is_some() {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            Some(result) = next_line(&mut stdout) => match result {
                Ok(Some(line)) => Event::Line("stdout", line),
                _ => Event::Closed("stdout"),
            },
            Some(result) = next_line(&mut stderr) => match result {
                Ok(Some(line)) => Event::Line("stderr", line),
                _ => Event::Closed("stderr"),
            },
        };

        match event {
            Event::Line(stream, line) => {
                if is_noise(&line) {
                    continue;
                }
                if line.to_ascii_lowercase().contains("error") {
                    warn!(target: "llama_server", "[{}] {}", stream, line);
                } else {
                    debug!(target: "llama_server", "[{}] {}", stream, line);
                }
                tail.push(line);
            }
            Event::Closed("stdout") => stdout = None,
            Event::Closed(_) => stderr = None,
        }
    }
    debug!("Output drain finished");
}
