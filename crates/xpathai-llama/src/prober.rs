//! Readiness probing.
//!
//! Polls a [`HealthCheck`] on a [`PollSchedule`] until the server reports
//! ready, the child process exits, or the time budget runs out. Progress
//! milestones are reported as [`ProbeEvent`]s, separate from routine polls.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, trace};

use crate::error::StartError;
use crate::health::{HealthCheck, ProbeOutcome};
use crate::schedule::PollSchedule;
use crate::state::{ExitInfo, ServerState};

/// Progress milestone observed while waiting for readiness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeEvent {
    /// The server answered "loading" for the first time.
    FirstLoading { elapsed: Duration },
    /// Still loading after half the budget.
    LoadingHalfway { elapsed: Duration },
    /// Periodic reminder during a long load.
    StillLoading { elapsed: Duration },
    Ready { attempts: usize, elapsed: Duration },
}

/// Outcome of a successful wait.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub attempts: usize,
    pub elapsed: Duration,
    pub events: Vec<ProbeEvent>,
}

/// Bounded readiness poller.
#[derive(Debug, Clone)]
pub struct ReadinessProber {
    schedule: PollSchedule,
    budget: Duration,
    long_loading_every: Duration,
}

impl ReadinessProber {
    pub fn new(budget: Duration) -> Self {
        Self {
            schedule: PollSchedule::default(),
            budget,
            long_loading_every: Duration::from_secs(60),
        }
    }

    pub fn with_schedule(mut self, schedule: PollSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_long_loading_every(mut self, every: Duration) -> Self {
        self.long_loading_every = every;
        self
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Poll until ready.
    ///
    /// `exit` carries the child's exit status once it ends; an exit observed
    /// at any point (including mid-sleep) fails with `ProcessDied` without
    /// another probe. `on_state` is told when the server enters `Loading`.
    pub async fn wait_ready<F>(
        &self,
        check: &dyn HealthCheck,
        exit: &mut watch::Receiver<Option<ExitInfo>>,
        mut on_state: F,
    ) -> Result<ProbeReport, StartError>
    where
        F: FnMut(ServerState) + Send,
    {
        let started = Instant::now();
        let deadline = started + self.budget;
        let mut attempts = 0usize;
        let mut events = Vec::new();
        let mut loading = false;
        let mut halfway_reported = false;
        let mut next_long_mark = self.long_loading_every;

        loop {
            if let Some(info) = *exit.borrow_and_update() {
                debug!("Process exited while probing ({})", info);
                return Err(StartError::ProcessDied {
                    code: info.code,
                    detail: format!("process exited during startup ({})", info),
                });
            }

            if Instant::now() >= deadline {
                return Err(StartError::StartTimeout {
                    waited: started.elapsed(),
                });
            }

            attempts += 1;
            // An exit while the probe is in flight ends the wait right away.
            let sample = tokio::select! {
                probed = timeout_at(deadline, check.probe()) => match probed {
                    Ok(sample) => sample,
                    Err(_) => continue,
                },
                gone = async { exit.wait_for(Option::is_some).await.is_err() } => {
                    if gone {
                        return Err(monitor_gone());
                    }
                    continue;
                }
            };
            let elapsed = started.elapsed();

            match sample.outcome {
                ProbeOutcome::Ready => {
                    info!(
                        "Inference server ready after {} probes ({:.1}s)",
                        attempts,
                        elapsed.as_secs_f64()
                    );
                    events.push(ProbeEvent::Ready { attempts, elapsed });
                    return Ok(ProbeReport {
                        attempts,
                        elapsed,
                        events,
                    });
                }
                ProbeOutcome::Loading => {
                    if !loading {
                        loading = true;
                        on_state(ServerState::Loading);
                        info!("Inference server is loading the model");
                        events.push(ProbeEvent::FirstLoading { elapsed });
                    }
                    if !halfway_reported && elapsed >= self.budget / 2 {
                        halfway_reported = true;
                        info!(
                            "Model still loading after {:.0}s (budget {}s)",
                            elapsed.as_secs_f64(),
                            self.budget.as_secs()
                        );
                        events.push(ProbeEvent::LoadingHalfway { elapsed });
                    }
                    if !self.long_loading_every.is_zero() && elapsed >= next_long_mark {
                        while next_long_mark <= elapsed {
                            next_long_mark += self.long_loading_every;
                        }
                        info!("Model still loading ({:.0}s elapsed)", elapsed.as_secs_f64());
                        events.push(ProbeEvent::StillLoading { elapsed });
                    }
                }
                ProbeOutcome::Unavailable(status) => {
                    debug!("Health probe {} returned status {}", attempts, status);
                }
                ProbeOutcome::ConnectionFailed(reason) => {
                    trace!("Health probe {} failed: {}", attempts, reason);
                }
            }

            let wake = (Instant::now() + self.schedule.interval(attempts - 1)).min(deadline);
            tokio::select! {
                _ = sleep_until(wake) => {}
                changed = exit.changed() => {
                    if changed.is_err() && exit.borrow().is_none() {
                        return Err(monitor_gone());
                    }
                }
            }
        }
    }
}

fn monitor_gone() -> StartError {
    StartError::ProcessDied {
        code: None,
        detail: "process monitor went away during startup".to_string(),
    }
}

#[cfg(test)]
#[path = "prober_tests.rs"]
mod tests;
