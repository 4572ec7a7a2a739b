//! Decaying poll interval schedule.

use std::time::Duration;

/// Interval schedule that starts fast and settles on a steady interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSchedule {
    ramp: Vec<Duration>,
    steady: Duration,
}

impl PollSchedule {
    pub fn new(ramp: Vec<Duration>, steady: Duration) -> Self {
        Self { ramp, steady }
    }

    /// Same interval for every attempt.
    pub fn fixed(interval: Duration) -> Self {
        Self::new(Vec::new(), interval)
    }

    /// Delay to wait after the given zero-based attempt.
    pub fn interval(&self, attempt: usize) -> Duration {
        self.ramp.get(attempt).copied().unwrap_or(self.steady)
    }

    pub fn steady(&self) -> Duration {
        self.steady
    }
}

impl Default for PollSchedule {
    /// 0.5, 0.5, 1, 1, 2, 2, 3, 3, 5, 5 seconds, then every 5 seconds.
    fn default() -> Self {
        let ramp = [500, 500, 1000, 1000, 2000, 2000, 3000, 3000, 5000, 5000]
            .into_iter()
            .map(Duration::from_millis)
            .collect();
        Self::new(ramp, Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ramp() {
        let schedule = PollSchedule::default();
        let secs: Vec<f64> = (0..12).map(|i| schedule.interval(i).as_secs_f64()).collect();
        assert_eq!(
            secs,
            vec![0.5, 0.5, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 5.0, 5.0, 5.0, 5.0]
        );
    }

    #[test]
    fn test_steady_after_ramp() {
        let schedule = PollSchedule::default();
        assert_eq!(schedule.interval(1_000), Duration::from_secs(5));
    }

    #[test]
    fn test_fixed() {
        let schedule = PollSchedule::fixed(Duration::from_millis(10));
        assert_eq!(schedule.interval(0), Duration::from_millis(10));
        assert_eq!(schedule.interval(50), Duration::from_millis(10));
    }
}
