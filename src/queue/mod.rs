//! Retry queue: deduplication, single-flight delivery, delayed requeue.
//!
//! ## Contents
//! - [`WorkQueue`] FIFO of identities with coalescing and in-flight tracking
//! - [`RateLimitingQueue`] `WorkQueue` plus delay timers and a
//!   [`RateLimiter`](crate::RateLimiter) owning retry counters
//!
//! ## Worker protocol
//! ```text
//! while let Some(id) = queue.get().await {   // blocks; None once shut down and drained
//!     ... reconcile id ...
//!     queue.forget(&id) | queue.add_rate_limited(id.clone())
//!     queue.done(&id);                       // exactly once per get
//! }
//! ```

mod rate_limiting;
mod work;

pub use rate_limiting::RateLimitingQueue;
pub use work::WorkQueue;
