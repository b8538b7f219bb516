//! Linear backoff.

use std::time::Duration;

use super::Backoff;

/// Adds a fixed step to the delay after every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    initial: Duration,
    increment: Duration,
    max: Option<Duration>,
    current: Duration,
}

impl LinearBackoff {
    /// Creates a backoff starting at `initial`, growing by `increment`.
    #[inline]
    #[must_use]
    pub const fn new(initial: Duration, increment: Duration) -> Self {
        Self {
            initial,
            increment,
            max: None,
            current: initial,
        }
    }

    /// Caps the delay at `max`.
    #[inline]
    #[must_use]
    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = Some(max);
        self.current = self.current.min(max);
        self
    }
}

impl Backoff for LinearBackoff {
    fn next(&mut self) -> Duration {
        let delay = self.current;

        let grown = self.current.saturating_add(self.increment);
        self.current = match self.max {
            Some(max) => grown.min(max),
            None => grown,
        };

        delay
    }

    fn reset(&mut self) {
        self.current = match self.max {
            Some(max) => self.initial.min(max),
            None => self.initial,
        };
    }
}
