//! Constant backoff.

use std::time::Duration;

use super::Backoff;

/// Waits the same delay before every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBackoff {
    delay: Duration,
}

impl ConstantBackoff {
    /// Creates a backoff that always yields `delay`.
    #[inline]
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Returns the configured delay.
    #[inline]
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

impl Backoff for ConstantBackoff {
    fn next(&mut self) -> Duration {
        self.delay
    }

    fn reset(&mut self) {}
}
