use std::time::Duration;

/// Growth factor applied after every non-terminal poll.
pub const BACKOFF_MULTIPLIER: f64 = 1.5;

/// Poll interval that grows by 1.5x up to a cap and snaps back to the minimum on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl BackoffSchedule {
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            current: min,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Grow the interval after a non-terminal response and return the new value.
    pub fn advance(&mut self) -> Duration {
        let grown_ms = (self.current.as_millis() as f64 * BACKOFF_MULTIPLIER).round() as u64;
        self.current = Duration::from_millis(grown_ms).min(self.max);
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}
