//! # Controller: ingestion, retry queue and worker pool for one syncer.
//!
//! A [`Controller`] wires watch sources through filters into a
//! [`RateLimitingQueue`] and drains it with a fixed pool of workers.
//!
//! ## Run
//! ```text
//! run(token)
//!   ├─► spawn subscriber listener (Bus ─► SubscriberSet), reading from the
//!   │   receiver taken at build() so events published before run are kept
//!   ├─► publish ControllerStarting
//!   ├─► barrier: all CacheSynced?  ── token first ─► CacheSyncAborted, Err
//!   ├─► publish CachesSynced
//!   ├─► spawn N workers                       (JoinSet)
//!   ├─► publish WorkersStarted{ workers }
//!   ├─► token.cancelled().await
//!   ├─► publish ShutdownRequested, queue.shut_down()
//!   ├─► join workers (each finishes its current item, queue drains)
//!   ├─► publish ControllerStopped
//!   └─► flush subscribers
//! ```
//!
//! A controller runs once; its queue is shut down when `run` returns.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use syncvisor::{Controller, FilterFn, Identity, MemorySource, Resource, SyncError, SyncFn};
//!
//! #[derive(Clone)]
//! struct Cm { ns: String, name: String }
//!
//! impl Resource for Cm {
//!     fn namespace(&self) -> &str { &self.ns }
//!     fn name(&self) -> &str { &self.name }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), syncvisor::RuntimeError> {
//!     let source = MemorySource::<Cm>::new("configmaps");
//!     let lister = source.clone();
//!
//!     let syncer = SyncFn::<Cm, _, _>::new(
//!         move |id: Identity| {
//!             let found = lister.get(&id);
//!             async move { Ok::<_, SyncError>(found) }
//!         },
//!         |cm: Cm| async move {
//!             println!("reconciled {}/{}", cm.ns, cm.name);
//!             Ok::<_, SyncError>(())
//!         },
//!     );
//!
//!     let controller = Controller::builder("demo", syncer)
//!         .with_watch(source.clone(), FilterFn::<Cm>::new())
//!         .with_workers(2)
//!         .build();
//!
//!     source.apply(Cm { ns: "ns".into(), name: "a".into() });
//!     source.mark_synced();
//!
//!     let token = CancellationToken::new();
//!     let stopper = token.clone();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(Duration::from_millis(50)).await;
//!         stopper.cancel();
//!     });
//!     controller.run(token).await
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::config::ControllerConfig;
use crate::core::barrier;
use crate::core::manager::Runner;
use crate::core::worker::Worker;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::filter::Filter;
use crate::identity::Resource;
use crate::policies::RateLimiter;
use crate::queue::RateLimitingQueue;
use crate::source::{CacheSynced, EventHandler, WatchSource};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::sync::Syncer;
use crate::util::lock;

type Registration = Box<dyn FnOnce(&RateLimitingQueue, &Bus, &Arc<str>) + Send>;

/// Builder for [`Controller`].
pub struct ControllerBuilder<S> {
    name: Arc<str>,
    syncer: Arc<S>,
    cfg: ControllerConfig,
    limiter: Option<Arc<dyn RateLimiter>>,
    watches: Vec<Registration>,
    synced: Vec<Arc<dyn CacheSynced>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl<S: Syncer> ControllerBuilder<S> {
    /// Replaces the whole configuration.
    pub fn with_config(mut self, cfg: ControllerConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets the worker pool size (0 is treated as 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.cfg.workers = workers;
        self
    }

    /// Sets the retry budget; `<= 0` retries forever.
    pub fn with_max_retries(mut self, max_retries: i64) -> Self {
        self.cfg.max_retries = max_retries;
        self
    }

    /// Overrides the limiter built from the config's backoff and bucket settings.
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Subscribes to `source` through `filter` and gates startup on its sync.
    pub fn with_watch<R, W, F>(mut self, source: W, filter: F) -> Self
    where
        R: Resource,
        W: WatchSource<R>,
        F: Filter<R>,
    {
        let source = Arc::new(source);
        let filter: Arc<dyn Filter<R>> = Arc::new(filter);
        self.synced.push(source.clone());
        self.watches.push(Box::new(
            move |queue: &RateLimitingQueue, bus: &Bus, name: &Arc<str>| {
                source.add_handler(Arc::new(EventHandler::new(
                    filter,
                    queue.clone(),
                    bus.clone(),
                    Arc::clone(name),
                )));
            },
        ));
        self
    }

    /// Gates startup on an extra predicate without subscribing to it.
    pub fn with_cache_synced(mut self, synced: impl CacheSynced) -> Self {
        self.synced.push(Arc::new(synced));
        self
    }

    /// Adds error sinks; they receive every event published from `build` until
    /// `run` returns (up to the bus capacity before `run` starts).
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers.extend(subscribers);
        self
    }

    /// Creates the queue and registers the watch handlers.
    pub fn build(self) -> Controller<S> {
        let limiter = self.limiter.unwrap_or_else(|| self.cfg.rate_limiter());
        let queue = RateLimitingQueue::new(limiter);
        let bus = Bus::new(self.cfg.bus_capacity);
        let events = bus.subscribe();

        for register in self.watches {
            register(&queue, &bus, &self.name);
        }

        let worker = Worker::new(
            self.syncer,
            queue.clone(),
            self.cfg.retry_policy(),
            bus.clone(),
            Arc::clone(&self.name),
        );

        Controller {
            name: self.name,
            cfg: self.cfg,
            queue,
            bus,
            synced: self.synced,
            subscribers: self.subscribers,
            worker: Arc::new(worker),
            events: Mutex::new(Some(events)),
            started: AtomicBool::new(false),
        }
    }
}

/// Reconciliation loop for one [`Syncer`].
pub struct Controller<S> {
    name: Arc<str>,
    cfg: ControllerConfig,
    queue: RateLimitingQueue,
    bus: Bus,
    synced: Vec<Arc<dyn CacheSynced>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    worker: Arc<Worker<S>>,
    events: Mutex<Option<broadcast::Receiver<Event>>>,
    started: AtomicBool,
}

impl<S: Syncer> Controller<S> {
    /// Starts building a controller named `name` around `syncer`.
    pub fn builder(name: impl Into<Arc<str>>, syncer: S) -> ControllerBuilder<S> {
        ControllerBuilder {
            name: name.into(),
            syncer: Arc::new(syncer),
            cfg: ControllerConfig::default(),
            limiter: None,
            watches: Vec::new(),
            synced: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.cfg
    }

    /// The controller's retry queue, for direct enqueues and introspection.
    pub fn queue(&self) -> &RateLimitingQueue {
        &self.queue
    }

    /// The controller's event bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Runs until `token` is cancelled, then drains the workers.
    ///
    /// # Errors
    /// - [`RuntimeError::AlreadyRunning`] on a second call
    /// - [`RuntimeError::CacheSyncAborted`] if `token` fires before caches sync
    pub async fn run(&self, token: CancellationToken) -> Result<(), RuntimeError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(RuntimeError::AlreadyRunning {
                controller: self.name.to_string(),
            });
        }

        let events = lock(&self.events)
            .take()
            .unwrap_or_else(|| self.bus.subscribe());
        let listener_stop = CancellationToken::new();
        let listener = tokio::spawn(
            SubscriberSet::new(self.subscribers.clone(), self.bus.clone())
                .listen(events, listener_stop.clone()),
        );

        let res = self.drive(&token).await;
        self.queue.shut_down();

        listener_stop.cancel();
        if let Err(e) = listener.await {
            error!(controller = %self.name, error = %e, "subscriber listener failed");
        }
        res
    }

    async fn drive(&self, token: &CancellationToken) -> Result<(), RuntimeError> {
        self.publish(Event::new(EventKind::ControllerStarting));

        let poll = self.cfg.cache_sync_poll;
        if let Err(err) = barrier::wait_for_cache_sync(&self.synced, poll, token).await {
            let reason = match &err {
                RuntimeError::CacheSyncAborted { pending } => pending.join(", "),
                other => other.as_message(),
            };
            self.publish(Event::new(EventKind::CacheSyncAborted).with_reason(reason));
            return Err(err);
        }
        self.publish(Event::new(EventKind::CachesSynced));

        let workers = self.cfg.worker_count();
        let mut set = JoinSet::new();
        for _ in 0..workers {
            let worker = Arc::clone(&self.worker);
            set.spawn(async move { worker.run().await });
        }
        self.publish(Event::new(EventKind::WorkersStarted).with_workers(workers));

        token.cancelled().await;
        self.publish(Event::new(EventKind::ShutdownRequested));
        self.queue.shut_down();

        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                error!(controller = %self.name, error = %e, "worker task failed");
            }
        }
        self.publish(Event::new(EventKind::ControllerStopped));
        Ok(())
    }

    fn publish(&self, ev: Event) {
        self.bus.publish(ev.with_controller(Arc::clone(&self.name)));
    }
}

#[async_trait]
impl<S: Syncer> Runner for Controller<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, token: CancellationToken) -> Result<(), RuntimeError> {
        Controller::run(self, token).await
    }
}
