//! Retry - Time and attempt bounded polling
//!
//! [`Retrying`] is an iterator of attempt numbers. Each step sleeps for the
//! configured delay, then ends the sequence if the interval has elapsed or
//! the attempt limit was reached. Running out of attempts is not an error by
//! itself; the caller decides what a timeout means.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use bringup_core::Retrying;
//!
//! let mut ready = false;
//! for attempt in Retrying::new(Some(Duration::from_millis(20)), Duration::from_millis(1)) {
//!     if attempt == 3 {
//!         ready = true;
//!         break;
//!     }
//! }
//! assert!(ready);
//! ```

use std::iter::FusedIterator;
use std::thread;
use std::time::{Duration, Instant};

/// Default polling window
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Default pause before each attempt
pub const DEFAULT_DELAY: Duration = Duration::from_millis(50);

/// Bounded poll sequence
///
/// The clock starts at construction. Iterating consumes the policy, so a new
/// poll needs a new `Retrying`.
#[derive(Debug)]
pub struct Retrying {
    /// Wall-clock bound, `None` for no bound
    interval: Option<Duration>,

    /// Sleep before each attempt
    delay: Duration,

    /// Attempt bound, `None` for no bound
    max_attempts: Option<u32>,

    attempt: u32,
    started_at: Instant,
    exhausted: bool,
}

impl Retrying {
    pub fn new(interval: Option<Duration>, delay: Duration) -> Self {
        Self {
            interval,
            delay,
            max_attempts: None,
            attempt: 0,
            started_at: Instant::now(),
            exhausted: false,
        }
    }

    /// Poll for at most `interval` with the default delay
    pub fn with_timeout(interval: Duration) -> Self {
        Self::new(Some(interval), DEFAULT_DELAY)
    }

    /// Stop after `max` attempts
    pub fn max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    /// Number of attempts handed out so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_expired(&self) -> bool {
        self.interval
            .is_some_and(|interval| self.started_at.elapsed() > interval)
    }

    /// Run `check` once per attempt until it succeeds
    ///
    /// Returns `false` when the sequence ran out first.
    pub fn until<F>(self, mut check: F) -> bool
    where
        F: FnMut(u32) -> bool,
    {
        for attempt in self {
            if check(attempt) {
                return true;
            }
        }
        false
    }
}

impl Default for Retrying {
    fn default() -> Self {
        Self::new(Some(DEFAULT_INTERVAL), DEFAULT_DELAY)
    }
}

impl Iterator for Retrying {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.exhausted {
            return None;
        }

        thread::sleep(self.delay);

        let out_of_attempts = self.max_attempts.is_some_and(|max| self.attempt >= max);
        if self.is_expired() || out_of_attempts {
            self.exhausted = true;
            return None;
        }

        self.attempt += 1;
        Some(self.attempt)
    }
}

impl FusedIterator for Retrying {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_limit() {
        let attempts: Vec<u32> = Retrying::new(None, Duration::from_millis(1))
            .max_attempts(3)
            .collect();
        assert_eq!(attempts, vec![1, 2, 3]);
    }

    #[test]
    fn test_zero_attempts() {
        let mut retry = Retrying::new(None, Duration::ZERO).max_attempts(0);
        assert_eq!(retry.next(), None);
    }

    #[test]
    fn test_interval_bound() {
        let interval = Duration::from_millis(200);
        let delay = Duration::from_millis(50);
        let count = Retrying::new(Some(interval), delay).count();

        // ceil(0.2 / 0.05) + 1
        assert!(count >= 1, "expected at least one attempt");
        assert!(count <= 5, "expected at most 5 attempts, got {count}");
    }

    #[test]
    fn test_delay_exceeding_interval() {
        let count = Retrying::new(Some(Duration::from_millis(10)), Duration::from_millis(20)).count();
        assert!(count <= 1);
    }

    #[test]
    fn test_sequence_stays_exhausted() {
        let mut retry = Retrying::new(None, Duration::ZERO).max_attempts(1);
        assert_eq!(retry.next(), Some(1));
        assert_eq!(retry.next(), None);

        let started = Instant::now();
        assert_eq!(retry.next(), None);
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_attempt_counter() {
        let mut retry = Retrying::new(None, Duration::ZERO).max_attempts(5);
        assert_eq!(retry.attempt(), 0);
        retry.next();
        retry.next();
        assert_eq!(retry.attempt(), 2);
    }

    #[test]
    fn test_until_success() {
        let retry = Retrying::new(Some(Duration::from_secs(1)), Duration::from_millis(1));
        assert!(retry.until(|attempt| attempt == 4));
    }

    #[test]
    fn test_until_timeout() {
        let retry = Retrying::new(None, Duration::ZERO).max_attempts(10);
        let mut calls = 0;
        assert!(!retry.until(|_| {
            calls += 1;
            false
        }));
        assert_eq!(calls, 10);
    }

    #[test]
    fn test_default_policy() {
        let retry = Retrying::default();
        assert_eq!(retry.interval, Some(DEFAULT_INTERVAL));
        assert_eq!(retry.delay, DEFAULT_DELAY);
        assert!(!retry.is_expired());
    }
}
