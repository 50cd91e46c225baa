//! # Fibonacci Backoff
//!
//! Requeue delays for resources whose reconciliation keeps failing. Each
//! delay is the sum of the previous two, starting from the minimum and
//! capped at the maximum: with 1m/10m that is 1m, 1m, 2m, 3m, 5m, 8m, 10m.

use std::time::Duration;

/// Stateful Fibonacci delay sequence.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min: Duration,
    max: Duration,
    prev: Duration,
    current: Duration,
}

impl FibonacciBackoff {
    /// Creates a sequence starting at `min` and capped at `max`.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            prev: Duration::ZERO,
            current: min,
        }
    }

    /// Returns the current delay and advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let next = self.prev.saturating_add(self.current).min(self.max);
        self.prev = self.current;
        self.current = next;
        delay
    }

    /// Restarts the sequence from the minimum.
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min;
    }
}

/// Consecutive failures of one resource.
#[derive(Debug, Clone)]
pub struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    /// One minute minimum, ten minutes maximum.
    #[must_use]
    pub fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(Duration::from_secs(60), Duration::from_secs(600)),
            error_count: 0,
        }
    }

    /// Records a failure and returns the delay before the next attempt.
    pub fn record_error(&mut self) -> Duration {
        self.error_count = self.error_count.saturating_add(1);
        self.backoff.next_delay()
    }

    /// Clears the failure history after a success.
    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }

    /// Failures since the last success.
    #[must_use]
    pub fn error_count(&self) -> u32 {
        self.error_count
    }
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::new(minutes(1), minutes(10));

        let delays: Vec<Duration> = (0..9).map(|_| backoff.next_delay()).collect();

        assert_eq!(
            delays,
            [1, 1, 2, 3, 5, 8, 10, 10, 10].map(minutes).to_vec(),
            "Sequence should follow Fibonacci and stay at the cap"
        );
    }

    #[test]
    fn test_fibonacci_backoff_reset() {
        let mut backoff = FibonacciBackoff::new(minutes(1), minutes(10));
        for _ in 0..4 {
            backoff.next_delay();
        }

        backoff.reset();

        assert_eq!(backoff.next_delay(), minutes(1));
        assert_eq!(backoff.next_delay(), minutes(1));
        assert_eq!(backoff.next_delay(), minutes(2));
    }

    #[test]
    fn test_backoff_state_counts_errors() {
        let mut state = BackoffState::new();

        assert_eq!(state.record_error(), minutes(1));
        assert_eq!(state.record_error(), minutes(1));
        assert_eq!(state.record_error(), minutes(2));
        assert_eq!(state.error_count(), 3);
    }
}
