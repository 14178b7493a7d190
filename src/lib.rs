//! # syncvisor
//!
//! **Syncvisor** is a reconciliation engine for resource controllers.
//!
//! It turns an unordered, possibly duplicated stream of add/update/delete
//! notifications into idempotent sync calls with **at most one sync in flight
//! per identity** and bounded or unbounded rate-limited retry. A controller
//! supplies only three things:
//! - a [`Filter`]: which notifications matter and which [`Identity`] they touch;
//! - a [`Syncer`]: resolve an identity to current state, then reconcile it;
//! - one or more [`WatchSource`]s delivering notifications.
//!
//! ## Architecture
//! ```text
//!  WatchSource ── Notification ──► Filter ── admit? ──► parent(obj): Identity
//!  (informer)      (Deleted may                              │
//!                   be a Tombstone)                          ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │ RateLimitingQueue                                                       │
//! │  - dirty/queue/processing sets: coalescing + single flight              │
//! │  - delayed adds: one timer per identity, earliest wins                  │
//! │  - RateLimiter: max(ItemBackoff, BucketLimiter), owns retry counters    │
//! └───────────────┬───────────────────┬───────────────────┬─────────────────┘
//!                 ▼                   ▼                   ▼
//!            worker #1           worker #2    ...    worker #N     (started after
//!                 │                                                 cache-sync barrier)
//!                 ├─► Syncer::resolve(id) ─► None ─► forget
//!                 ├─► Syncer::reconcile(obj) ─► Ok ─► forget
//!                 └─► Err ─► retries < max? ─► add_rate_limited : forget ("giving up")
//!
//!  every step ── publish(Event) ──► Bus ──► SubscriberSet ──► LogWriter / custom sinks
//! ```
//!
//! ## Singleton operators
//! [`Operator`] maps every admitted notification to [`Identity::singleton`] and
//! runs one worker, so any number of watched objects feed one reconciliation
//! stream.
//!
//! ## Process wiring
//! [`Manager`] runs controllers and operators on one stop token and bounds
//! shutdown with a grace period; [`shutdown::wait_for_shutdown_signal`] turns
//! OS signals into that stop.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use syncvisor::{
//!     Controller, FilterFn, Identity, LogWriter, MemorySource, Resource, Subscribe,
//!     SyncError, SyncFn,
//! };
//!
//! #[derive(Clone)]
//! struct Secret { ns: String, name: String, data: Vec<u8> }
//!
//! impl Resource for Secret {
//!     fn namespace(&self) -> &str { &self.ns }
//!     fn name(&self) -> &str { &self.name }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let secrets = MemorySource::<Secret>::new("secrets");
//!     let lister = secrets.clone();
//!
//!     let syncer = SyncFn::<Secret, _, _>::new(
//!         move |id: Identity| {
//!             let found = lister.get(&id);
//!             async move { Ok::<_, SyncError>(found) }
//!         },
//!         |s: Secret| async move {
//!             if s.data.is_empty() {
//!                 return Err(SyncError::fail("no data yet"));
//!             }
//!             Ok(())
//!         },
//!     );
//!
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     let controller = Controller::builder("secret-checker", syncer)
//!         .with_watch(secrets.clone(), FilterFn::<Secret>::new())
//!         .with_max_retries(3)
//!         .with_subscribers(subs)
//!         .build();
//!
//!     secrets.apply(Secret { ns: "ns".into(), name: "tls".into(), data: vec![1] });
//!     secrets.mark_synced();
//!
//!     let token = CancellationToken::new();
//!     let stop = token.clone();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(Duration::from_millis(100)).await;
//!         stop.cancel();
//!     });
//!     controller.run(token).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod events;
mod filter;
mod identity;
mod operator;
mod policies;
mod queue;
mod source;
mod subscribers;
mod sync;
mod util;

// ---- Public re-exports ----

pub use config::ControllerConfig;
pub use core::shutdown;
pub use core::{Controller, ControllerBuilder, Manager, Runner};
pub use error::{IngestError, RuntimeError, SyncError};
pub use events::{Bus, Event, EventKind};
pub use filter::{AdmitAll, Filter, FilterFn};
pub use identity::{Identity, Resource, SINGLETON_KEY};
pub use operator::{
    Operator, OperatorBuilder, OperatorFilter, OperatorSyncer, SingletonFilter, SingletonSyncer,
};
pub use policies::{
    BackoffPolicy, BucketLimiter, ItemBackoff, JitterPolicy, MaxOf, RateLimiter, RetryPolicy,
    default_rate_limiter,
};
pub use queue::{RateLimitingQueue, WorkQueue};
pub use source::{
    CacheSynced, DeletedObject, MemorySource, Notification, NotificationHandler, Tombstone,
    WatchSource,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use sync::{SyncFn, Syncer};
