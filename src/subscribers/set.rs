//! # Non-blocking event fan-out to multiple subscribers.
//!
//! [`SubscriberSet`] distributes each event to every subscriber through its
//! own bounded queue, without awaiting any of them.
//!
//! ## Architecture
//! ```text
//! Bus ──► listen() ──► emit(event)
//!                        ├──► [queue 1] ──► worker 1 ──► sub1.on_event()
//!                        │                     └──────► panic → SubscriberPanicked
//!                        └──► [queue N] ──► worker N ──► subN.on_event()
//! ```
//!
//! ## Rules
//! - **Non-blocking**: `emit()` uses `try_send` and returns immediately
//! - **Overflow**: event dropped for that subscriber only, `SubscriberOverflow` published
//! - **Per-subscriber FIFO**; no ordering across subscribers
//! - **Lag**: events the bus overwrote before `listen` read them are reported
//!   to every subscriber as one `EventsLagged` event carrying the count
//! - **Flush on stop**: `listen` drains what the bus still holds, then waits
//!   for every subscriber queue to empty

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

/// Per-subscriber channel metadata.
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator for event subscribers.
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker task per subscriber.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
            let worker_bus = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = sub.on_event(ev.as_ref());
                    if let Err(panic) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        worker_bus.publish(Event::subscriber_panicked(
                            sub.name(),
                            panic_message(panic.as_ref()),
                        ));
                    }
                }
            });
            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }

        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Emits an event to all subscribers (non-blocking).
    pub fn emit(&self, event: &Event) {
        if self.channels.is_empty() {
            return;
        }
        let event = Arc::new(event.clone());
        // overflow reports must not trigger further overflow reports
        let is_overflow = event.kind == EventKind::SubscriberOverflow;

        for channel in &self.channels {
            let reason = match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if !is_overflow {
                self.bus.publish(Event::subscriber_overflow(channel.name, reason));
            }
        }
    }

    /// Forwards bus events until `stop` fires, then flushes and shuts down.
    pub async fn listen(self, mut rx: broadcast::Receiver<Event>, stop: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                res = rx.recv() => match res {
                    Ok(ev) => self.emit(&ev),
                    Err(RecvError::Lagged(n)) => self.lagged(n),
                    Err(RecvError::Closed) => break,
                },
                _ = stop.cancelled() => {
                    loop {
                        match rx.try_recv() {
                            Ok(ev) => self.emit(&ev),
                            Err(TryRecvError::Lagged(n)) => self.lagged(n),
                            Err(_) => break,
                        }
                    }
                    break;
                }
            }
        }
        self.shutdown().await;
    }

    /// Reports missed events to the subscribers directly, not through the bus.
    fn lagged(&self, skipped: u64) {
        warn!(target: "syncvisor", skipped, "event listener lagged behind the bus");
        self.emit(&Event::new(EventKind::EventsLagged).with_skipped(skipped));
    }

    /// Closes all queues and waits for the workers to drain them.
    pub async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }
}

/// Extracts a printable message from a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        kinds: Mutex<Vec<EventKind>>,
        skipped: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, ev: &Event) {
            self.kinds.lock().unwrap().push(ev.kind);
            if let Some(n) = ev.skipped {
                self.skipped.lock().unwrap().push(n);
            }
        }
        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Panicker;

    #[async_trait]
    impl Subscribe for Panicker {
        async fn on_event(&self, ev: &Event) {
            if ev.kind == EventKind::SyncFailed {
                panic!("sink exploded");
            }
        }
        fn name(&self) -> &'static str {
            "panicker"
        }
    }

    #[tokio::test]
    async fn test_listen_flushes_everything_before_returning() {
        let bus = Bus::new(64);
        let rec = Arc::new(Recorder::default());
        let set = SubscriberSet::new(vec![rec.clone() as Arc<dyn Subscribe>], bus.clone());
        let stop = CancellationToken::new();
        let listener = tokio::spawn(set.listen(bus.subscribe(), stop.clone()));

        bus.publish(Event::new(EventKind::ControllerStarting));
        bus.publish(Event::new(EventKind::CachesSynced));
        bus.publish(Event::new(EventKind::ControllerStopped));
        stop.cancel();
        listener.await.expect("join");

        assert_eq!(
            *rec.kinds.lock().unwrap(),
            vec![
                EventKind::ControllerStarting,
                EventKind::CachesSynced,
                EventKind::ControllerStopped
            ]
        );
    }

    #[tokio::test]
    async fn test_lag_is_reported_with_skipped_count() {
        let bus = Bus::new(4);
        let rec = Arc::new(Recorder::default());
        let set = SubscriberSet::new(vec![rec.clone() as Arc<dyn Subscribe>], bus.clone());
        let rx = bus.subscribe();

        for _ in 0..10 {
            bus.publish(Event::new(EventKind::TombstoneUnresolved));
        }
        let stop = CancellationToken::new();
        stop.cancel();
        set.listen(rx, stop).await;

        let kinds = rec.kinds.lock().unwrap().clone();
        assert_eq!(kinds[0], EventKind::EventsLagged);
        assert_eq!(rec.skipped.lock().unwrap().iter().sum::<u64>(), 6);
        let delivered = kinds.iter().filter(|k| **k == EventKind::TombstoneUnresolved).count();
        assert_eq!(delivered, 4);
    }

    #[tokio::test]
    async fn test_panicking_subscriber_is_isolated() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let rec = Arc::new(Recorder::default());
        let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(Panicker), rec.clone()];
        let set = SubscriberSet::new(subs, bus.clone());

        set.emit(&Event::new(EventKind::SyncFailed));
        set.emit(&Event::new(EventKind::SyncSucceeded));
        set.shutdown().await;

        let ev = rx.recv().await.expect("panic report");
        assert_eq!(ev.kind, EventKind::SubscriberPanicked);
        assert_eq!(ev.controller.as_deref(), Some("panicker"));
        assert_eq!(ev.reason.as_deref(), Some("sink exploded"));
        assert_eq!(rec.kinds.lock().unwrap().len(), 2);
    }
}
