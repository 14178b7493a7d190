//! # Singleton operators.
//!
//! An operator reconciles one global state no matter which watched object
//! changed. Every admitted notification is keyed by the sentinel
//! [`Identity::singleton`], so bursts of events collapse into one pending
//! reconciliation and the pool runs exactly one worker.
//!
//! ```text
//! A ─┐                                   ┌──────────────────────────┐
//! B ─┼─► OperatorFilter ─► (🐼, 🐼) ─►   │ queue (one key)          │ ─► 1 worker
//! C ─┘      (parent fixed)               └──────────────────────────┘     │
//!                                                                           ▼
//!                                         SingletonSyncer: resolve(_) ─► op.resolve()
//! ```
//!
//! The adapters are plain compositions: [`SingletonFilter`] adds the fixed
//! parent to an [`OperatorFilter`], [`SingletonSyncer`] drops the identity
//! argument before calling an [`OperatorSyncer`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::ControllerConfig;
use crate::core::{Controller, ControllerBuilder, Runner};
use crate::error::{RuntimeError, SyncError};
use crate::filter::{AdmitAll, Filter, FilterFn};
use crate::identity::{Identity, Resource};
use crate::source::WatchSource;
use crate::subscribers::Subscribe;
use crate::sync::Syncer;

/// Admission predicates of an operator; the parent is always the sentinel.
pub trait OperatorFilter<R: Resource>: Send + Sync + 'static {
    fn add(&self, _object: &R) -> bool {
        true
    }

    fn update(&self, _old: &R, _new: &R) -> bool {
        true
    }

    fn delete(&self, _object: &R) -> bool {
        true
    }
}

impl<R: Resource> OperatorFilter<R> for AdmitAll {}

/// Uses the predicates of a [`FilterFn`]; its parent function is ignored.
impl<R: Resource> OperatorFilter<R> for FilterFn<R> {
    fn add(&self, object: &R) -> bool {
        Filter::add(self, object)
    }

    fn update(&self, old: &R, new: &R) -> bool {
        Filter::update(self, old, new)
    }

    fn delete(&self, object: &R) -> bool {
        Filter::delete(self, object)
    }
}

/// [`Filter`] mapping every admitted object to [`Identity::singleton`].
#[derive(Debug, Clone)]
pub struct SingletonFilter<F>(pub F);

impl<R: Resource, F: OperatorFilter<R>> Filter<R> for SingletonFilter<F> {
    fn add(&self, object: &R) -> bool {
        self.0.add(object)
    }

    fn update(&self, old: &R, new: &R) -> bool {
        self.0.update(old, new)
    }

    fn delete(&self, object: &R) -> bool {
        self.0.delete(object)
    }

    fn parent(&self, _object: &R) -> Identity {
        Identity::singleton()
    }
}

/// Syncer of a singleton operator: the state it resolves has no key.
#[async_trait]
pub trait OperatorSyncer: Send + Sync + 'static {
    type Object: Send + 'static;

    /// Looks up the current global state; `Ok(None)` means nothing to do.
    async fn resolve(&self) -> Result<Option<Self::Object>, SyncError>;

    async fn reconcile(&self, object: Self::Object) -> Result<(), SyncError>;
}

/// Keyed [`Syncer`] view of an [`OperatorSyncer`].
#[derive(Debug, Clone)]
pub struct SingletonSyncer<S>(pub S);

#[async_trait]
impl<S: OperatorSyncer> Syncer for SingletonSyncer<S> {
    type Object = S::Object;

    async fn resolve(&self, _identity: &Identity) -> Result<Option<S::Object>, SyncError> {
        self.0.resolve().await
    }

    async fn reconcile(&self, object: S::Object) -> Result<(), SyncError> {
        self.0.reconcile(object).await
    }
}

/// Builder for [`Operator`].
pub struct OperatorBuilder<S> {
    inner: ControllerBuilder<SingletonSyncer<S>>,
}

impl<S: OperatorSyncer> OperatorBuilder<S> {
    /// Subscribes to `source`; admitted events all enqueue the sentinel identity.
    pub fn with_watch<R, W, F>(mut self, source: W, filter: F) -> Self
    where
        R: Resource,
        W: WatchSource<R>,
        F: OperatorFilter<R>,
    {
        self.inner = self.inner.with_watch(source, SingletonFilter(filter));
        self
    }

    /// Replaces the configuration; `workers` is ignored.
    pub fn with_config(mut self, cfg: ControllerConfig) -> Self {
        self.inner = self.inner.with_config(cfg);
        self
    }

    pub fn with_max_retries(mut self, max_retries: i64) -> Self {
        self.inner = self.inner.with_max_retries(max_retries);
        self
    }

    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.inner = self.inner.with_subscribers(subscribers);
        self
    }

    pub fn build(self) -> Operator<S> {
        // one key in the queue: extra workers would only race on get()
        Operator {
            controller: self.inner.with_workers(1).build(),
        }
    }
}

/// Controller reconciling a single global state.
pub struct Operator<S> {
    controller: Controller<SingletonSyncer<S>>,
}

impl<S: OperatorSyncer> Operator<S> {
    /// Starts building an operator named `name` around `syncer`.
    pub fn builder(name: impl Into<Arc<str>>, syncer: S) -> OperatorBuilder<S> {
        OperatorBuilder {
            inner: Controller::builder(name, SingletonSyncer(syncer)),
        }
    }

    /// The underlying single-worker controller.
    pub fn controller(&self) -> &Controller<SingletonSyncer<S>> {
        &self.controller
    }

    /// Runs with one worker until `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) -> Result<(), RuntimeError> {
        self.controller.run(token).await
    }
}

#[async_trait]
impl<S: OperatorSyncer> Runner for Operator<S> {
    fn name(&self) -> &str {
        self.controller.name()
    }

    async fn run(&self, token: CancellationToken) -> Result<(), RuntimeError> {
        self.controller.run(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Clone, Debug)]
    struct Obj(&'static str);

    impl Resource for Obj {
        fn namespace(&self) -> &str {
            "ns"
        }
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_singleton_filter_collapses_parents() {
        let filter = SingletonFilter(FilterFn::<Obj>::new().on_add(|o| o.0 != "skip"));
        assert!(Filter::add(&filter, &Obj("a")));
        assert!(!Filter::add(&filter, &Obj("skip")));
        assert!(Filter::delete(&filter, &Obj("a")));
        assert_eq!(filter.parent(&Obj("a")), Identity::singleton());
        assert_eq!(filter.parent(&Obj("b")), filter.parent(&Obj("c")));
    }

    struct Global;

    #[async_trait]
    impl OperatorSyncer for Global {
        type Object = u32;

        async fn resolve(&self) -> Result<Option<u32>, SyncError> {
            Ok(Some(42))
        }

        async fn reconcile(&self, object: u32) -> Result<(), SyncError> {
            if object == 42 {
                Ok(())
            } else {
                Err(SyncError::fail("unexpected state"))
            }
        }
    }

    #[tokio::test]
    async fn test_singleton_syncer_ignores_identity() {
        let syncer = SingletonSyncer(Global);
        let obj = Syncer::resolve(&syncer, &Identity::new("any", "thing")).await;
        assert_eq!(obj, Ok(Some(42)));
        assert_eq!(Syncer::reconcile(&syncer, 42).await, Ok(()));
    }

    #[test]
    fn test_operator_runs_one_worker() {
        let op = Operator::builder("op", Global)
            .with_config(ControllerConfig {
                workers: 8,
                ..ControllerConfig::default()
            })
            .build();
        assert_eq!(op.controller().config().worker_count(), 1);
        assert_eq!(Runner::name(&op), "op");
    }

    /// Counts reconciles of the global state and tracks overlap.
    #[derive(Default)]
    struct Fanned {
        calls: AtomicU32,
        active: AtomicU32,
        max_active: AtomicU32,
    }

    #[async_trait]
    impl OperatorSyncer for Arc<Fanned> {
        type Object = ();

        async fn resolve(&self) -> Result<Option<()>, SyncError> {
            Ok(Some(()))
        }

        async fn reconcile(&self, _object: ()) -> Result<(), SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_for_many_objects_fan_into_one_stream() {
        let state = Arc::new(Fanned::default());
        let source = MemorySource::<Obj>::new("objects");
        source.mark_synced();
        let op = Arc::new(
            Operator::builder("fan-in", Arc::clone(&state))
                .with_watch(source.clone(), AdmitAll)
                .build(),
        );

        let token = CancellationToken::new();
        let handle = {
            let op = Arc::clone(&op);
            let token = token.clone();
            tokio::spawn(async move { op.run(token).await })
        };
        tokio::task::yield_now().await;

        source.apply(Obj("a"));
        source.apply(Obj("b"));
        source.apply(Obj("c"));

        tokio::time::sleep(Duration::from_millis(500)).await;
        token.cancel();
        assert_eq!(handle.await.expect("join"), Ok(()));

        let calls = state.calls.load(Ordering::SeqCst);
        assert!((1..=3).contains(&calls), "calls={calls}");
        assert_eq!(state.max_active.load(Ordering::SeqCst), 1);
        assert!(op.controller().queue().is_empty());
    }
}
