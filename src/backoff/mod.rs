//! Reconnect delay strategies.
//!
//! The socket asks its [`Backoff`] for one delay per reconnect attempt and
//! resets it after every successful open. A socket without a backoff never
//! reconnects.
//!
//! # Strategies
//!
//! | Type | Delay sequence |
//! |------|----------------|
//! | [`ConstantBackoff`] | `d, d, d, ...` |
//! | [`LinearBackoff`] | `i, i+s, i+2s, ...` up to an optional cap |
//! | [`ExponentialBackoff`] | `i, 2i, 4i, ...` up to an optional exponent cap |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// Submodules
// ============================================================================

mod constant;
mod exponential;
mod linear;

pub use constant::ConstantBackoff;
pub use exponential::ExponentialBackoff;
pub use linear::LinearBackoff;

// ============================================================================
// Backoff
// ============================================================================

/// Strategy producing the delay before each reconnect attempt.
pub trait Backoff: Send {
    /// Returns the delay to wait before the next attempt and advances.
    fn next(&mut self) -> Duration;

    /// Returns the strategy to its initial delay.
    fn reset(&mut self);
}

impl<B: Backoff + ?Sized> Backoff for Box<B> {
    fn next(&mut self) -> Duration {
        (**self).next()
    }

    fn reset(&mut self) {
        (**self).reset();
    }
}

// ============================================================================
// BackoffConfig
// ============================================================================

/// Serializable backoff description, for loading from configuration files.
///
/// # Format
///
/// ```json
/// { "strategy": "exponential", "initial_ms": 100, "max_exponent": 6 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BackoffConfig {
    /// Fixed delay.
    Constant {
        /// Delay in milliseconds.
        delay_ms: u64,
    },
    /// Delay growing by a fixed step.
    Linear {
        /// First delay in milliseconds.
        initial_ms: u64,
        /// Step in milliseconds.
        increment_ms: u64,
        /// Upper bound in milliseconds.
        #[serde(default)]
        max_ms: Option<u64>,
    },
    /// Delay doubling on each attempt.
    Exponential {
        /// First delay in milliseconds.
        initial_ms: u64,
        /// Largest exponent applied to the initial delay.
        #[serde(default)]
        max_exponent: Option<u32>,
    },
}

impl BackoffConfig {
    /// Builds the described strategy.
    #[must_use]
    pub fn build(&self) -> Box<dyn Backoff> {
        match *self {
            Self::Constant { delay_ms } => {
                Box::new(ConstantBackoff::new(Duration::from_millis(delay_ms)))
            }
            Self::Linear {
                initial_ms,
                increment_ms,
                max_ms,
            } => {
                let backoff = LinearBackoff::new(
                    Duration::from_millis(initial_ms),
                    Duration::from_millis(increment_ms),
                );
                match max_ms {
                    Some(max) => Box::new(backoff.with_max(Duration::from_millis(max))),
                    None => Box::new(backoff),
                }
            }
            Self::Exponential {
                initial_ms,
                max_exponent,
            } => {
                let backoff = ExponentialBackoff::new(Duration::from_millis(initial_ms));
                match max_exponent {
                    Some(exponent) => Box::new(backoff.with_max_exponent(exponent)),
                    None => Box::new(backoff),
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
