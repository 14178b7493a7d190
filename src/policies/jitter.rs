//! # Jitter for retry delays.
//!
//! Many identities failing against the same backend would otherwise retry in
//! lockstep. [`JitterPolicy`] spreads them out:
//!
//! - [`JitterPolicy::None`] exact delay
//! - [`JitterPolicy::Full`] uniform in `[0, base]`
//! - [`JitterPolicy::Equal`] `base/2` plus uniform in `[0, base/2]`
//! - [`JitterPolicy::Decorrelated`] uniform in `[floor, min(3 × base, max)]`

use rand::Rng;
use std::time::Duration;

/// Randomization applied to a computed backoff delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// No randomization.
    #[default]
    None,
    /// Uniform in `[0, base]`; spreads load the most, may retry almost immediately.
    Full,
    /// Keeps at least half of the base delay.
    Equal,
    /// Grows independently of the base, bounded below by the first delay and above by the cap.
    Decorrelated,
}

impl JitterPolicy {
    /// Applies the policy to `base`.
    ///
    /// `floor` and `max` are only used by [`JitterPolicy::Decorrelated`].
    pub fn apply(&self, base: Duration, floor: Duration, max: Duration) -> Duration {
        let base_ms = millis(base);
        match self {
            JitterPolicy::None => base,
            JitterPolicy::Full => {
                if base_ms == 0 {
                    return Duration::ZERO;
                }
                Duration::from_millis(rand::rng().random_range(0..=base_ms))
            }
            JitterPolicy::Equal => {
                let half = base_ms / 2;
                if half == 0 {
                    return base;
                }
                Duration::from_millis(half + rand::rng().random_range(0..=half))
            }
            JitterPolicy::Decorrelated => {
                let floor_ms = millis(floor);
                let upper = base_ms.saturating_mul(3).min(millis(max)).max(floor_ms);
                if floor_ms >= upper {
                    return floor;
                }
                Duration::from_millis(rand::rng().random_range(floor_ms..=upper))
            }
        }
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}
