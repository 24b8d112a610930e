//! Exponential backoff for the worker's reserve loop (distinct from the
//! job queue's own retry backoff in `kernel/jobs/queue.rs`): base 1s, cap
//! 30s, reset on any successful job.

use std::time::Duration;

const BASE: Duration = Duration::from_secs(1);
const CAP: Duration = Duration::from_secs(30);

pub struct WorkerBackoff {
    attempt: u32,
}

impl Default for WorkerBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerBackoff {
    pub fn new() -> Self {
        Self { attempt: 0 }
    }

    /// The delay to wait before the next reserve attempt, then advances
    /// the internal counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = BASE.saturating_mul(1 << self.attempt.min(5)).min(CAP);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Reset the backoff after any successful job, per §4.11.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_and_caps_at_thirty_seconds() {
        let mut backoff = WorkerBackoff::new();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        for _ in 0..10 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
    }

    #[test]
    fn reset_returns_to_the_base_delay() {
        let mut backoff = WorkerBackoff::new();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
