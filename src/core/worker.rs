//! # Worker loop: one identity at a time, retry policy on failure.
//!
//! ```text
//! loop {
//!   get() ──► None (shut down + drained) ─► exit
//!     │
//!     ├─► publish SyncStarting{ retries }
//!     ├─► resolve(id) ─► None ──────────────► forget, SyncNotFound
//!     │        └─► Some(obj) ─► reconcile ──► Ok  ─► forget, SyncSucceeded
//!     │                                   └─► Err ─┐
//!     │   (panic anywhere ─► SyncError::Panicked) ─┤
//!     │                                            ▼
//!     │          retryable && retry.allows(num_requeues)?
//!     │             ├─ yes ─► add_rate_limited, SyncFailed{ retries, delay }
//!     │             └─ no  ─► forget, SyncDropped ("giving up")
//!     │   (panic while requeueing ─► forget, SyncDropped)
//!     └─► done(id)   (always, exactly once)
//! }
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::error::SyncError;
use crate::events::{Bus, Event, EventKind};
use crate::identity::Identity;
use crate::policies::RetryPolicy;
use crate::queue::RateLimitingQueue;
use crate::subscribers::panic_message;
use crate::sync::Syncer;

/// Successful outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Synced,
    NotFound,
}

/// Shared state of a controller's worker pool.
pub(crate) struct Worker<S> {
    syncer: Arc<S>,
    queue: RateLimitingQueue,
    retry: RetryPolicy,
    bus: Bus,
    controller: Arc<str>,
}

impl<S: Syncer> Worker<S> {
    pub(crate) fn new(
        syncer: Arc<S>,
        queue: RateLimitingQueue,
        retry: RetryPolicy,
        bus: Bus,
        controller: Arc<str>,
    ) -> Self {
        Self {
            syncer,
            queue,
            retry,
            bus,
            controller,
        }
    }

    /// Processes identities until the queue is shut down and drained.
    pub(crate) async fn run(&self) {
        while self.process_next().await {}
    }

    /// Handles one identity; false once the queue reports shutdown.
    async fn process_next(&self) -> bool {
        let Some(id) = self.queue.get().await else {
            return false;
        };

        self.publish(
            Event::new(EventKind::SyncStarting)
                .with_identity(id.clone())
                .with_retries(self.queue.num_requeues(&id)),
        );

        let result = AssertUnwindSafe(self.sync(&id))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(SyncError::Panicked {
                    info: panic_message(panic.as_ref()),
                })
            });

        let handled =
            std::panic::catch_unwind(AssertUnwindSafe(|| self.handle_result(&id, result)));
        if let Err(panic) = handled {
            self.queue.forget(&id);
            self.publish(
                Event::new(EventKind::SyncDropped)
                    .with_identity(id.clone())
                    .with_reason(format!("panic: {}", panic_message(panic.as_ref()))),
            );
        }
        self.queue.done(&id);
        true
    }

    async fn sync(&self, id: &Identity) -> Result<Outcome, SyncError> {
        match self.syncer.resolve(id).await? {
            None => Ok(Outcome::NotFound),
            Some(object) => {
                self.syncer.reconcile(object).await?;
                Ok(Outcome::Synced)
            }
        }
    }

    fn handle_result(&self, id: &Identity, result: Result<Outcome, SyncError>) {
        let err = match result {
            Ok(outcome) => {
                self.queue.forget(id);
                let kind = match outcome {
                    Outcome::Synced => EventKind::SyncSucceeded,
                    Outcome::NotFound => EventKind::SyncNotFound,
                };
                self.publish(Event::new(kind).with_identity(id.clone()));
                return;
            }
            Err(err) => err,
        };

        let retries = self.queue.num_requeues(id);
        if err.is_retryable() && self.retry.allows(retries) {
            let delay = self.queue.add_rate_limited(id.clone());
            self.publish(
                Event::new(EventKind::SyncFailed)
                    .with_identity(id.clone())
                    .with_reason(err.as_message())
                    .with_retries(retries)
                    .with_delay(delay),
            );
        } else {
            self.queue.forget(id);
            self.publish(
                Event::new(EventKind::SyncDropped)
                    .with_identity(id.clone())
                    .with_reason(err.as_message())
                    .with_retries(retries),
            );
        }
    }

    fn publish(&self, ev: Event) {
        self.bus.publish(ev.with_controller(Arc::clone(&self.controller)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::{BackoffPolicy, ItemBackoff, RateLimiter};
    use crate::sync::SyncFn;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn queue() -> RateLimitingQueue {
        let limiter: Arc<dyn RateLimiter> = Arc::new(ItemBackoff::new(BackoffPolicy::constant(
            Duration::from_millis(10),
        )));
        RateLimitingQueue::new(limiter)
    }

    fn kinds(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<EventKind> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev.kind);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_requeues_then_success_forgets() {
        let calls = Arc::new(AtomicU32::new(0));
        let syncer = {
            let calls = Arc::clone(&calls);
            SyncFn::<(), _, _>::arc(
                |_id: Identity| async { Ok::<_, SyncError>(Some(())) },
                move |_: ()| {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err(SyncError::fail("conflict"))
                        } else {
                            Ok(())
                        }
                    }
                },
            )
        };
        let q = queue();
        let bus = Bus::new(32);
        let mut rx = bus.subscribe();
        let worker = Worker::new(syncer, q.clone(), RetryPolicy::Forever, bus, Arc::from("w"));
        let id = Identity::new("ns", "a");

        q.add(id.clone());
        assert!(worker.process_next().await);
        assert_eq!(q.num_requeues(&id), 1);
        assert_eq!(q.delayed(), 1);

        assert!(worker.process_next().await);
        assert_eq!(q.num_requeues(&id), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            kinds(&mut rx),
            vec![
                EventKind::SyncStarting,
                EventKind::SyncFailed,
                EventKind::SyncStarting,
                EventKind::SyncSucceeded
            ]
        );
    }

    #[tokio::test]
    async fn test_fatal_error_is_dropped_immediately() {
        let syncer = SyncFn::<(), _, _>::arc(
            |_id: Identity| async { Err::<Option<()>, _>(SyncError::fatal("invalid manifest")) },
            |_: ()| async { Ok::<_, SyncError>(()) },
        );
        let q = queue();
        let bus = Bus::new(32);
        let mut rx = bus.subscribe();
        let worker = Worker::new(syncer, q.clone(), RetryPolicy::Forever, bus, Arc::from("w"));

        q.add(Identity::new("ns", "a"));
        assert!(worker.process_next().await);
        assert!(q.is_empty());
        assert_eq!(q.delayed(), 0);

        let dropped = std::iter::from_fn(|| rx.try_recv().ok())
            .find(|ev| ev.kind == EventKind::SyncDropped)
            .expect("dropped");
        assert_eq!(dropped.reason.as_deref(), Some("fatal: invalid manifest"));
        assert_eq!(dropped.controller.as_deref(), Some("w"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_is_a_retryable_failure() {
        let syncer = SyncFn::<(), _, _>::arc(
            |_id: Identity| async { Ok::<_, SyncError>(Some(())) },
            |_: ()| async {
                if true {
                    panic!("boom");
                }
                Ok::<_, SyncError>(())
            },
        );
        let q = queue();
        let bus = Bus::new(32);
        let mut rx = bus.subscribe();
        let worker = Worker::new(syncer, q.clone(), RetryPolicy::Forever, bus, Arc::from("w"));
        let id = Identity::new("ns", "a");

        q.add(id.clone());
        assert!(worker.process_next().await);
        assert_eq!(q.in_flight(), 0);
        assert_eq!(q.num_requeues(&id), 1);

        let failed = std::iter::from_fn(|| rx.try_recv().ok())
            .find(|ev| ev.kind == EventKind::SyncFailed)
            .expect("failed");
        assert!(failed.reason.as_deref().unwrap_or("").contains("boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncapped_backoff_keeps_worker_alive() {
        let syncer = SyncFn::<Identity, _, _>::arc(
            |id: Identity| async move { Ok::<_, SyncError>(Some(id)) },
            |id: Identity| async move {
                if id.name() == "a" {
                    Err(SyncError::fail("conflict"))
                } else {
                    Ok(())
                }
            },
        );
        let limiter: Arc<dyn RateLimiter> =
            Arc::new(ItemBackoff::new(BackoffPolicy::constant(Duration::MAX)));
        let q = RateLimitingQueue::new(limiter);
        let worker = Worker::new(syncer, q.clone(), RetryPolicy::Forever, Bus::new(32), Arc::from("w"));

        q.add(Identity::new("ns", "a"));
        q.add(Identity::new("ns", "b"));
        assert!(worker.process_next().await);
        assert_eq!(q.in_flight(), 0);
        assert_eq!(q.delayed(), 1);

        assert!(worker.process_next().await);
        assert!(q.is_empty());
        assert_eq!(q.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_ends_the_loop() {
        let syncer = SyncFn::<(), _, _>::arc(
            |_id: Identity| async { Ok::<_, SyncError>(None) },
            |_: ()| async { Ok::<_, SyncError>(()) },
        );
        let q = queue();
        let worker = Worker::new(syncer, q.clone(), RetryPolicy::Forever, Bus::new(8), Arc::from("w"));
        q.add(Identity::new("ns", "a"));
        q.shut_down();
        // queued identity drains first
        assert!(worker.process_next().await);
        assert!(!worker.process_next().await);
    }
}
