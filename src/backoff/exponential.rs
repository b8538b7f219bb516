//! Exponential backoff.

use std::time::Duration;

use super::Backoff;

/// Largest exponent ever applied, keeps `1 << exponent` inside `u32`.
const EXPONENT_LIMIT: u32 = 31;

/// Doubles the delay after every attempt.
///
/// The n-th delay is `initial * 2^n`, with `n` capped at `max_exponent`
/// when one is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    initial: Duration,
    max_exponent: Option<u32>,
    exponent: u32,
}

impl ExponentialBackoff {
    /// Creates a backoff starting at `initial`.
    #[inline]
    #[must_use]
    pub const fn new(initial: Duration) -> Self {
        Self {
            initial,
            max_exponent: None,
            exponent: 0,
        }
    }

    /// Stops growing once the delay reaches `initial * 2^max_exponent`.
    #[inline]
    #[must_use]
    pub const fn with_max_exponent(mut self, max_exponent: u32) -> Self {
        self.max_exponent = Some(max_exponent);
        self
    }

    fn exponent_cap(&self) -> u32 {
        self.max_exponent
            .map_or(EXPONENT_LIMIT, |max| max.min(EXPONENT_LIMIT))
    }
}

impl Backoff for ExponentialBackoff {
    fn next(&mut self) -> Duration {
        let delay = self.initial.saturating_mul(1 << self.exponent);

        if self.exponent < self.exponent_cap() {
            self.exponent += 1;
        }

        delay
    }

    fn reset(&mut self) {
        self.exponent = 0;
    }
}
