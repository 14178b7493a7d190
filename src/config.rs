//! # Controller configuration.
//!
//! [`ControllerConfig`] defines how a controller schedules and retries work:
//! pool size, retry budget, backoff curve, overall rate limit, cache-sync
//! polling, event bus capacity and the manager's shutdown grace.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use syncvisor::{BackoffPolicy, ControllerConfig};
//!
//! let mut cfg = ControllerConfig::default();
//! cfg.workers = 4;
//! cfg.max_retries = 5;
//! cfg.backoff = BackoffPolicy::constant(Duration::from_millis(50));
//!
//! assert_eq!(cfg.worker_count(), 4);
//! assert_eq!(cfg.retry_policy(), syncvisor::RetryPolicy::Limited { max_retries: 5 });
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::policies::{
    BackoffPolicy, BucketLimiter, ItemBackoff, MaxOf, RateLimiter, RetryPolicy,
};

/// Configuration for a single controller.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Number of concurrent workers (0 is treated as 1).
    pub workers: usize,
    /// Retry budget per attempt chain (`<= 0` = retry forever).
    pub max_retries: i64,
    /// Per-identity backoff between retries.
    pub backoff: BackoffPolicy,
    /// Overall requeue rate across identities (`<= 0` = unlimited).
    pub qps: f64,
    /// Token bucket burst for `qps`.
    pub burst: u32,
    /// Interval between cache-sync predicate polls.
    pub cache_sync_poll: Duration,
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
    /// Maximum time a [`Manager`](crate::Manager) built with
    /// [`Manager::from_config`](crate::Manager::from_config) waits for runners after stop.
    pub grace: Duration,
}

impl Default for ControllerConfig {
    /// Provides a default configuration:
    /// - `workers = 1`
    /// - `max_retries = 0` (forever)
    /// - `backoff = BackoffPolicy::default()` (5ms doubling up to 1000s)
    /// - `qps = 10.0`, `burst = 100`
    /// - `cache_sync_poll = 100ms`
    /// - `bus_capacity = 1024`
    /// - `grace = 60s`
    fn default() -> Self {
        Self {
            workers: 1,
            max_retries: 0,
            backoff: BackoffPolicy::default(),
            qps: 10.0,
            burst: 100,
            cache_sync_poll: Duration::from_millis(100),
            bus_capacity: 1024,
            grace: Duration::from_secs(60),
        }
    }
}

impl ControllerConfig {
    /// Worker pool size, at least 1.
    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }

    /// Retry policy derived from `max_retries`.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_max_retries(self.max_retries)
    }

    /// Builds the requeue rate limiter: the slower of per-identity backoff
    /// and the overall token bucket.
    pub fn rate_limiter(&self) -> Arc<dyn RateLimiter> {
        Arc::new(MaxOf::new(vec![
            Arc::new(ItemBackoff::new(self.backoff)),
            Arc::new(BucketLimiter::new(self.qps, self.burst)),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    #[test]
    fn test_zero_workers_clamped() {
        let cfg = ControllerConfig {
            workers: 0,
            ..ControllerConfig::default()
        };
        assert_eq!(cfg.worker_count(), 1);
    }

    #[test]
    fn test_non_positive_retries_mean_forever() {
        let mut cfg = ControllerConfig::default();
        assert_eq!(cfg.retry_policy(), RetryPolicy::Forever);
        cfg.max_retries = -3;
        assert_eq!(cfg.retry_policy(), RetryPolicy::Forever);
        cfg.max_retries = 2;
        assert_eq!(cfg.retry_policy(), RetryPolicy::Limited { max_retries: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_follows_backoff() {
        let cfg = ControllerConfig {
            backoff: BackoffPolicy::constant(Duration::from_millis(30)),
            ..ControllerConfig::default()
        };
        let limiter = cfg.rate_limiter();
        let id = Identity::new("ns", "a");
        assert_eq!(limiter.when(&id), Duration::from_millis(30));
        assert_eq!(limiter.num_requeues(&id), 1);
        limiter.forget(&id);
        assert_eq!(limiter.num_requeues(&id), 0);
    }
}
