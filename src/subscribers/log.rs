//! # LogWriter: events as `tracing` records
//!
//! The stock error sink. Each [`Event`] becomes one structured record under
//! the `syncvisor` target; install any `tracing` subscriber to see them.
//!
//! | Kind                                         | Level |
//! |----------------------------------------------|-------|
//! | admissions, sync starting/succeeded          | debug |
//! | lifecycle                                    | info  |
//! | transient failures, subscriber health, lag   | warn  |
//! | drops ("giving up"), aborted startup         | error |
//!
//! ## Example output (fmt subscriber)
//! ```text
//! WARN syncvisor: sync failed, requeued controller=ca-injector identity=ns/cm reason="conflict" retries=0 delay_ms=5
//! ERROR syncvisor: giving up controller=ca-injector identity=ns/cm reason="conflict" retries=2
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let controller = e.controller.as_deref().unwrap_or("-");
        let identity = e.identity.as_ref().map(ToString::to_string);
        let identity = identity.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::ControllerStarting => {
                info!(target: "syncvisor", controller, "starting, waiting for caches");
            }
            EventKind::CachesSynced => {
                info!(target: "syncvisor", controller, "caches synced");
            }
            EventKind::CacheSyncAborted => {
                error!(target: "syncvisor", controller, pending = reason, "stopped before caches synced");
            }
            EventKind::WorkersStarted => {
                info!(target: "syncvisor", controller, workers = e.workers, "workers started");
            }
            EventKind::ShutdownRequested => {
                info!(target: "syncvisor", controller, "shutdown requested");
            }
            EventKind::ControllerStopped => {
                info!(target: "syncvisor", controller, "stopped");
            }
            EventKind::AllStoppedWithin => {
                info!(target: "syncvisor", "all runners stopped within grace");
            }
            EventKind::GraceExceeded => {
                error!(target: "syncvisor", stuck = reason, "grace exceeded");
            }
            EventKind::EventAdmitted => {
                debug!(target: "syncvisor", controller, identity, kind = reason, "event admitted");
            }
            EventKind::TombstoneUnresolved => {
                warn!(target: "syncvisor", controller, reason, "dropping unresolvable delete");
            }
            EventKind::SyncStarting => {
                debug!(target: "syncvisor", controller, identity, retries = e.retries, "syncing");
            }
            EventKind::SyncSucceeded => {
                debug!(target: "syncvisor", controller, identity, "synced");
            }
            EventKind::SyncNotFound => {
                debug!(target: "syncvisor", controller, identity, "not found, nothing to do");
            }
            EventKind::SyncFailed => {
                warn!(
                    target: "syncvisor",
                    controller,
                    identity,
                    reason,
                    retries = e.retries,
                    delay_ms = e.delay_ms,
                    "sync failed, requeued"
                );
            }
            EventKind::SyncDropped => {
                error!(target: "syncvisor", controller, identity, reason, retries = e.retries, "giving up");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "syncvisor", subscriber = controller, reason, "subscriber dropped an event");
            }
            EventKind::SubscriberPanicked => {
                warn!(target: "syncvisor", subscriber = controller, reason, "subscriber panicked");
            }
            EventKind::EventsLagged => {
                warn!(target: "syncvisor", controller, skipped = e.skipped, "listener lagged, events lost");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
