//! # Rate limiters for requeued identities.
//!
//! A [`RateLimiter`] answers one question: *how long should this identity wait
//! before it is delivered again?* It also owns the per-identity failure
//! counters exposed by the queue as `num_requeues`.
//!
//! ## Provided limiters
//! - [`ItemBackoff`] exponential per-identity delay driven by a [`BackoffPolicy`]
//! - [`BucketLimiter`] token bucket shared by every identity (overall qps cap)
//! - [`MaxOf`] combines limiters, returning the longest delay
//!
//! ## Rules
//! - `when` is called exactly once per rate-limited requeue and advances the
//!   identity's counter.
//! - `forget` resets the identity's counter to zero.
//! - Counters never go negative and only grow between forgets.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::identity::Identity;
use crate::policies::backoff::BackoffPolicy;
use crate::util::lock;

/// Source of requeue delays.
pub trait RateLimiter: Send + Sync + 'static {
    /// Returns the delay before `identity` may be delivered again and records the requeue.
    fn when(&self, identity: &Identity) -> Duration;

    /// Stops tracking `identity` (success or permanent give-up).
    fn forget(&self, identity: &Identity);

    /// Number of requeues recorded for `identity` since it was last forgotten.
    fn num_requeues(&self, identity: &Identity) -> u32;
}

/// Per-identity exponential backoff.
///
/// The n-th consecutive requeue of an identity waits `backoff.next(n)`.
#[derive(Debug)]
pub struct ItemBackoff {
    backoff: BackoffPolicy,
    failures: Mutex<HashMap<Identity, u32>>,
}

impl ItemBackoff {
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            backoff,
            failures: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for ItemBackoff {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

impl RateLimiter for ItemBackoff {
    fn when(&self, identity: &Identity) -> Duration {
        let failures = {
            let mut map = lock(&self.failures);
            let entry = map.entry(identity.clone()).or_insert(0);
            let prev = *entry;
            *entry = entry.saturating_add(1);
            prev
        };
        self.backoff.next(failures)
    }

    fn forget(&self, identity: &Identity) {
        lock(&self.failures).remove(identity);
    }

    fn num_requeues(&self, identity: &Identity) -> u32 {
        lock(&self.failures).get(identity).copied().unwrap_or(0)
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

/// Overall token bucket: `qps` tokens per second, at most `burst` stored.
///
/// Each call to `when` reserves one token. When the bucket is empty the
/// reservation is still granted but delayed until the token would have been
/// refilled, so callers are spaced `1/qps` apart.
#[derive(Debug)]
pub struct BucketLimiter {
    qps: f64,
    burst: u32,
    bucket: Mutex<Bucket>,
}

impl BucketLimiter {
    /// Creates a full bucket.
    ///
    /// A non-positive or non-finite `qps` disables limiting (every delay is zero).
    pub fn new(qps: f64, burst: u32) -> Self {
        Self {
            qps,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst),
                last: Instant::now(),
            }),
        }
    }

    fn unlimited(&self) -> bool {
        !self.qps.is_finite() || self.qps <= 0.0
    }
}

impl RateLimiter for BucketLimiter {
    fn when(&self, _identity: &Identity) -> Duration {
        if self.unlimited() {
            return Duration::ZERO;
        }
        let now = Instant::now();
        let mut bucket = lock(&self.bucket);

        let elapsed = now.saturating_duration_since(bucket.last).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.qps).min(f64::from(self.burst));
        bucket.last = now;
        bucket.tokens -= 1.0;

        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(-bucket.tokens / self.qps).unwrap_or(Duration::MAX)
        }
    }

    fn forget(&self, _identity: &Identity) {}

    fn num_requeues(&self, _identity: &Identity) -> u32 {
        0
    }
}

/// Combination of limiters: the longest delay wins, counters are the maximum.
#[derive(Clone)]
pub struct MaxOf {
    limiters: Vec<Arc<dyn RateLimiter>>,
}

impl MaxOf {
    pub fn new(limiters: Vec<Arc<dyn RateLimiter>>) -> Self {
        Self { limiters }
    }
}

impl RateLimiter for MaxOf {
    fn when(&self, identity: &Identity) -> Duration {
        // every limiter must observe the requeue, so no short-circuit
        self.limiters
            .iter()
            .map(|l| l.when(identity))
            .fold(Duration::ZERO, Duration::max)
    }

    fn forget(&self, identity: &Identity) {
        for l in &self.limiters {
            l.forget(identity);
        }
    }

    fn num_requeues(&self, identity: &Identity) -> u32 {
        self.limiters
            .iter()
            .map(|l| l.num_requeues(identity))
            .max()
            .unwrap_or(0)
    }
}

/// Controller default: per-identity backoff (5ms doubling up to 1000s)
/// combined with an overall bucket of 10 qps and burst 100.
pub fn default_rate_limiter() -> Arc<dyn RateLimiter> {
    Arc::new(MaxOf::new(vec![
        Arc::new(ItemBackoff::new(BackoffPolicy::default())),
        Arc::new(BucketLimiter::new(10.0, 100)),
    ]))
}
