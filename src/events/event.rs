//! # Runtime events emitted by controllers and their workers.
//!
//! The [`EventKind`] enum classifies events in four groups:
//! - **Run lifecycle**: starting, cache barrier, workers, shutdown
//! - **Ingestion**: admitted notifications and malformed tombstones
//! - **Sync outcomes**: one event per attempt result (success, not found, retry, drop)
//! - **Subscriber health**: overflow and panics of sinks themselves, and
//!   events the listener missed because the bus outran it
//!
//! Every non-fatal failure the engine handles is reported as one of these
//! events; this is the engine's error sink. The structured payload is
//! `{controller, identity, reason}` plus kind-specific numbers.
//!
//! ## Ordering guarantees
//! Each event carries a globally unique, monotonically increasing `seq`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use syncvisor::{Event, EventKind, Identity};
//!
//! let ev = Event::new(EventKind::SyncFailed)
//!     .with_controller("ca-injector")
//!     .with_identity(Identity::new("ns", "cm"))
//!     .with_reason("conflict")
//!     .with_retries(1)
//!     .with_delay(Duration::from_millis(10));
//!
//! assert_eq!(ev.kind, EventKind::SyncFailed);
//! assert_eq!(ev.controller.as_deref(), Some("ca-injector"));
//! assert_eq!(ev.delay_ms, Some(10));
//! assert!(ev.is_failure());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::identity::Identity;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Run lifecycle ===
    /// `run` entered; waiting for caches.
    ///
    /// Sets: `controller`.
    ControllerStarting,

    /// Every registered watch source reported its initial sync.
    ///
    /// Sets: `controller`.
    CachesSynced,

    /// Stop signal fired before caches synced; the run is aborted without dispatch.
    ///
    /// Sets: `controller`, `reason` (pending sources).
    CacheSyncAborted,

    /// Worker pool spawned.
    ///
    /// Sets: `controller`, `workers`.
    WorkersStarted,

    /// Stop signal observed; the queue is shutting down.
    ///
    /// Sets: `controller`.
    ShutdownRequested,

    /// All workers returned; `run` is about to return.
    ///
    /// Sets: `controller`.
    ControllerStopped,

    /// Every runner of a manager stopped within the grace period.
    AllStoppedWithin,

    /// A manager's grace period elapsed with runners still running.
    ///
    /// Sets: `reason` (stuck runners).
    GraceExceeded,

    // === Ingestion ===
    /// A notification passed the filter and its parent identity was enqueued.
    ///
    /// Sets: `controller`, `identity` (the parent), `reason` (`add`/`update`/`delete`).
    EventAdmitted,

    /// A delete notification could not be resolved to an identity and was dropped.
    ///
    /// Sets: `controller`, `reason`.
    TombstoneUnresolved,

    // === Sync outcomes ===
    /// A worker picked up an identity.
    ///
    /// Sets: `controller`, `identity`, `retries` (requeues so far).
    SyncStarting,

    /// Reconciliation succeeded; retry counter cleared.
    ///
    /// Sets: `controller`, `identity`.
    SyncSucceeded,

    /// The identity resolved to nothing; treated as success.
    ///
    /// Sets: `controller`, `identity`.
    SyncNotFound,

    /// Transient failure; the identity was requeued with backoff.
    ///
    /// Sets: `controller`, `identity`, `reason`, `retries` (before this requeue), `delay_ms`.
    SyncFailed,

    /// Retry budget exhausted or fatal error; the identity was dropped ("giving up").
    ///
    /// Sets: `controller`, `identity`, `reason`, `retries`.
    SyncDropped,

    // === Subscriber health ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `controller` (subscriber name), `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `controller` (subscriber name), `reason`.
    SubscriberOverflow,

    /// The listener fell behind the bus and missed events.
    ///
    /// Sets: `controller` (when known), `skipped`.
    EventsLagged,
}

/// Runtime event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the emitting controller (the error context).
    pub controller: Option<Arc<str>>,
    /// Identity the event is about, if any.
    pub identity: Option<Identity>,
    /// Human-readable reason (error text, event kind, pending sources).
    pub reason: Option<Arc<str>>,
    /// Requeues recorded for the identity when the event was emitted.
    pub retries: Option<u32>,
    /// Delay before the next attempt in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Size of the worker pool.
    pub workers: Option<usize>,
    /// Number of events a lagging listener never saw.
    pub skipped: Option<u64>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            controller: None,
            identity: None,
            reason: None,
            retries: None,
            delay_ms: None,
            workers: None,
            skipped: None,
        }
    }

    #[inline]
    pub fn with_controller(mut self, controller: impl Into<Arc<str>>) -> Self {
        self.controller = Some(controller.into());
        self
    }

    #[inline]
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Attaches a delay (stored as milliseconds, saturating at `u32::MAX`).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    #[inline]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    #[inline]
    pub fn with_skipped(mut self, skipped: u64) -> Self {
        self.skipped = Some(skipped);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_controller(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_controller(subscriber)
            .with_reason(info)
    }

    /// True for events reporting a handled failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self.kind,
            EventKind::CacheSyncAborted
                | EventKind::GraceExceeded
                | EventKind::TombstoneUnresolved
                | EventKind::SyncFailed
                | EventKind::SyncDropped
                | EventKind::SubscriberPanicked
                | EventKind::SubscriberOverflow
                | EventKind::EventsLagged
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::SyncStarting);
        let b = Event::new(EventKind::SyncStarting);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_delay_saturates() {
        let ev = Event::new(EventKind::SyncFailed).with_delay(Duration::from_secs(u64::MAX / 2));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }

    #[test]
    fn test_failure_classification() {
        assert!(Event::new(EventKind::SyncDropped).is_failure());
        assert!(Event::new(EventKind::TombstoneUnresolved).is_failure());
        assert!(!Event::new(EventKind::SyncNotFound).is_failure());
        assert!(!Event::new(EventKind::EventAdmitted).is_failure());
        assert!(Event::new(EventKind::EventsLagged).with_skipped(3).is_failure());
    }
}
