//! Retry and rate-limiting policies.
//!
//! This module groups the knobs that control **whether** a failed identity is
//! requeued and **how long** it waits before the next attempt.
//!
//! ## Contents
//! - [`RetryPolicy`]   retry budget per identity (forever / limited)
//! - [`BackoffPolicy`] how per-identity delays grow (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid thundering herd
//! - [`RateLimiter`]   delay source used by the rate-limited queue
//!   - [`ItemBackoff`]   per-identity exponential backoff with failure counters
//!   - [`BucketLimiter`] overall token bucket shared by all identities
//!   - [`MaxOf`]         the longest delay of several limiters
//!
//! ## Quick wiring
//! ```text
//! worker: sync failed
//!   └─► RetryPolicy::allows(queue.num_requeues(id))
//!         ├─ yes ─► queue.add_rate_limited(id)
//!         │           └─► RateLimiter::when(id) ─► delay ─► add_after(id, delay)
//!         └─ no  ─► queue.forget(id)  (giving up)
//! ```
//!
//! ## Defaults
//! - `RetryPolicy::Forever`.
//! - [`default_rate_limiter`] → max(ItemBackoff(5ms × 2^n, cap 1000s), BucketLimiter(10 qps, burst 100)).

mod backoff;
mod jitter;
mod limiter;
mod retry;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use limiter::{BucketLimiter, ItemBackoff, MaxOf, RateLimiter, default_rate_limiter};
pub use retry::RetryPolicy;
