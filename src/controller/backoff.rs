//! # Fibonacci Backoff
//!
//! Progressive retry delay for failed reconciliations. Grows more slowly than
//! exponential backoff, so a resource waiting on a slow upstream producer is
//! retried often enough without hammering the API server.
//!
//! Sequence with the defaults (5s min, 300s max): 5s, 5s, 10s, 15s, 25s, 40s,
//! 65s, 105s, 170s, 275s, 300s (max).
//!
//! ## Usage
//!
//! ```rust
//! use tensegrity::controller::backoff::FibonacciBackoff;
//!
//! let mut backoff = FibonacciBackoff::new(5, 300);
//! assert_eq!(backoff.next_backoff_seconds(), 5);
//! assert_eq!(backoff.next_backoff_seconds(), 5);
//! assert_eq!(backoff.next_backoff_seconds(), 10);
//! assert_eq!(backoff.next_backoff_seconds(), 15);
//! ```

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at `max_secs`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Minimum backoff in seconds (for reset)
    min_secs: u64,
    prev_secs: u64,
    current_secs: u64,
    max_secs: u64,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff bounded by `min_secs` and `max_secs`
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            min_secs,
            prev_secs: 0,
            current_secs: min_secs.min(max_secs),
            max_secs,
        }
    }

    /// Get the next backoff in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_secs;
        let next = self.prev_secs.saturating_add(self.current_secs);
        self.prev_secs = self.current_secs;
        self.current_secs = next.min(self.max_secs);
        result
    }

    /// Get the next backoff as a `Duration` and advance the sequence
    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    /// Reset to the initial state after a successful reconciliation
    pub fn reset(&mut self) {
        self.prev_secs = 0;
        self.current_secs = self.min_secs.min(self.max_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::new(5, 300);
        let sequence: Vec<u64> = (0..12).map(|_| backoff.next_backoff_seconds()).collect();
        assert_eq!(
            sequence,
            vec![5, 5, 10, 15, 25, 40, 65, 105, 170, 275, 300, 300]
        );
    }

    #[test]
    fn test_fibonacci_backoff_reset() {
        let mut backoff = FibonacciBackoff::new(5, 300);
        backoff.next_backoff_seconds();
        backoff.next_backoff_seconds();
        backoff.next_backoff_seconds();

        backoff.reset();

        assert_eq!(backoff.next_backoff_seconds(), 5);
        assert_eq!(backoff.next_backoff_seconds(), 5);
        assert_eq!(backoff.next_backoff_seconds(), 10);
    }

    #[test]
    fn test_fibonacci_backoff_as_duration() {
        let mut backoff = FibonacciBackoff::new(5, 300);
        assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(10));
    }

    #[test]
    fn test_min_above_max_is_capped() {
        let mut backoff = FibonacciBackoff::new(30, 10);
        assert_eq!(backoff.next_backoff_seconds(), 10);
        assert_eq!(backoff.next_backoff_seconds(), 10);
    }

    #[test]
    fn test_fibonacci_backoff_per_resource_state() {
        let mut first = FibonacciBackoff::new(5, 300);
        let mut second = FibonacciBackoff::new(5, 300);

        assert_eq!(first.next_backoff_seconds(), 5);
        assert_eq!(first.next_backoff_seconds(), 5);
        assert_eq!(first.next_backoff_seconds(), 10);
        assert_eq!(second.next_backoff_seconds(), 5);

        first.reset();
        assert_eq!(first.next_backoff_seconds(), 5);
        assert_eq!(second.next_backoff_seconds(), 5);
        assert_eq!(second.next_backoff_seconds(), 10);
    }
}
