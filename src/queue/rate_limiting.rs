//! # Rate-limited retry queue.
//!
//! [`RateLimitingQueue`] layers delayed delivery and a [`RateLimiter`] on top
//! of the single-flight [`WorkQueue`].
//!
//! ## Architecture
//! ```text
//! add(id) ────────────────────────────────────────────────┐
//!                                                          ▼
//! add_after(id, d) ──► waiting[id] = now + d ──► timer ──► WorkQueue ──► get()/done()
//!        ▲                 (earliest wins)     (cancelled
//!        │                                      on shut_down)
//! add_rate_limited(id) ──► limiter.when(id) = d
//! ```
//!
//! ## Rules
//! - At most one timer per identity is live: a later ready time is ignored, an
//!   earlier one cancels and replaces the pending timer.
//! - Delays too large for the clock saturate to a ready time 30 years out.
//! - `num_requeues` / `forget` are served by the limiter; plain `add` never
//!   touches the counters.
//! - `shut_down` cancels pending timers; delayed identities are discarded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::identity::Identity;
use crate::policies::{RateLimiter, default_rate_limiter};
use crate::queue::work::WorkQueue;
use crate::util::lock;

/// Upper bound for a ready time; matches what tokio uses for "never".
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Pending delayed add: its ready time and the token that cancels its timer.
struct Waiting {
    ready_at: Instant,
    cancel: CancellationToken,
}

struct Shared {
    work: WorkQueue,
    limiter: Arc<dyn RateLimiter>,
    waiting: Mutex<HashMap<Identity, Waiting>>,
    timers: CancellationToken,
}

/// Thread-safe retry queue shared by a controller's workers.
///
/// Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct RateLimitingQueue {
    shared: Arc<Shared>,
}

impl RateLimitingQueue {
    /// Creates a queue that delays requeues according to `limiter`.
    pub fn new(limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            shared: Arc::new(Shared {
                work: WorkQueue::new(),
                limiter,
                waiting: Mutex::new(HashMap::new()),
                timers: CancellationToken::new(),
            }),
        }
    }

    /// Adds `identity` for immediate delivery (coalescing with any pending entry).
    pub fn add(&self, identity: Identity) -> bool {
        self.shared.work.add(identity)
    }

    /// Adds `identity` once `delay` has elapsed.
    ///
    /// Must be called from within a tokio runtime when `delay` is non-zero.
    pub fn add_after(&self, identity: Identity, delay: Duration) {
        if self.shared.work.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.shared.work.add(identity);
            return;
        }

        let now = Instant::now();
        let ready_at = now.checked_add(delay.min(FAR_FUTURE)).unwrap_or(now);
        let cancel = {
            let mut waiting = lock(&self.shared.waiting);
            if waiting.get(&identity).is_some_and(|w| w.ready_at <= ready_at) {
                return;
            }
            let cancel = self.shared.timers.child_token();
            let superseded = waiting.insert(
                identity.clone(),
                Waiting {
                    ready_at,
                    cancel: cancel.clone(),
                },
            );
            if let Some(old) = superseded {
                old.cancel.cancel();
            }
            cancel
        };

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep_until(ready_at) => {
                    let current = {
                        let mut waiting = lock(&shared.waiting);
                        let current = waiting.get(&identity).is_some_and(|w| w.ready_at == ready_at);
                        if current {
                            waiting.remove(&identity);
                        }
                        current
                    };
                    if current {
                        shared.work.add(identity);
                    }
                }
            }
        });
    }

    /// Requeues `identity` after the limiter's delay, advancing its retry counter.
    pub fn add_rate_limited(&self, identity: Identity) -> Duration {
        let delay = self.shared.limiter.when(&identity);
        self.add_after(identity, delay);
        delay
    }

    /// Clears the retry counter of `identity`.
    pub fn forget(&self, identity: &Identity) {
        self.shared.limiter.forget(identity);
    }

    /// Number of rate-limited requeues of `identity` since it was last forgotten.
    pub fn num_requeues(&self, identity: &Identity) -> u32 {
        self.shared.limiter.num_requeues(identity)
    }

    /// Waits for the next identity; `None` once shut down and drained.
    pub async fn get(&self) -> Option<Identity> {
        self.shared.work.get().await
    }

    /// Releases an identity obtained from [`get`](Self::get).
    pub fn done(&self, identity: &Identity) {
        self.shared.work.done(identity);
    }

    /// Stops the queue: cancels timers, ignores further adds, wakes all waiters.
    pub fn shut_down(&self) {
        self.shared.timers.cancel();
        lock(&self.shared.waiting).clear();
        self.shared.work.shut_down();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.work.is_shutting_down()
    }

    /// Identities ready for delivery (excludes delayed and in-flight ones).
    pub fn len(&self) -> usize {
        self.shared.work.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.work.is_empty()
    }

    /// Identities waiting on a delay timer.
    pub fn delayed(&self) -> usize {
        lock(&self.shared.waiting).len()
    }

    pub fn in_flight(&self) -> usize {
        self.shared.work.in_flight()
    }
}

impl Default for RateLimitingQueue {
    fn default() -> Self {
        Self::new(default_rate_limiter())
    }
}
