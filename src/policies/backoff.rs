//! # Per-identity backoff curve.
//!
//! [`BackoffPolicy`] maps the number of consecutive failures of one identity to
//! the delay before its next attempt. It is parameterized by:
//! - [`BackoffPolicy::first`] the delay after the first failure;
//! - [`BackoffPolicy::factor`] the multiplicative growth factor;
//! - [`BackoffPolicy::max`] the delay cap.
//!
//! The delay for failure `n` (0-indexed) is `first × factor^n`, clamped to `max`,
//! then jitter is applied. The base is derived from `n` alone, so jittered
//! output never feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use syncvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(5),
//!     max: Duration::from_secs(1000),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(5));
//! assert_eq!(backoff.next(3), Duration::from_millis(40));
//! // 5ms × 2^30 is far beyond the cap
//! assert_eq!(backoff.next(30), Duration::from_secs(1000));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Exponential backoff parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub first: Duration,
    /// Maximum delay.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Jitter applied on top of the computed base.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns the controller default:
    /// - `first = 5ms`;
    /// - `factor = 2.0`;
    /// - `max = 1000s`;
    /// - no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(5),
            max: Duration::from_secs(1000),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Constant delay, handy for tests and polling loops.
    pub fn constant(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Computes the delay after `failures` previous failures (0-indexed).
    ///
    /// Non-finite or negative intermediate values (huge exponents, odd
    /// factors) clamp to [`BackoffPolicy::max`].
    pub fn next(&self, failures: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = failures.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::try_from_secs_f64(secs).map_or(self.max, |d| d.min(self.max))
        };

        self.jitter.apply(base, self.first.min(self.max), self.max)
    }
}
