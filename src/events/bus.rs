//! # Event bus for runtime events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`]: controllers, ingestion handlers and
//! workers publish, a single listener fans events out to subscribers.
//!
//! ```text
//! EventHandler ──┐
//! worker 1     ──┼──► Bus ──► listener ──► SubscriberSet ──► sinks
//! worker N     ──┤
//! Controller   ──┘
//! ```
//!
//! ## Rules
//! - `publish()` never blocks and never fails. With no receivers the event is
//!   dropped, except that failure reports are still written as `tracing` records.
//! - Capacity is one ring buffer shared by all receivers; a receiver that falls
//!   behind observes `RecvError::Lagged(n)` and skips the `n` oldest events.
//! - No persistence.

use tokio::sync::broadcast;
use tracing::warn;

use super::event::Event;

/// Broadcast channel for runtime events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus; `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to every active receiver.
    pub fn publish(&self, ev: Event) {
        if let Err(broadcast::error::SendError(ev)) = self.tx.send(ev) {
            if ev.is_failure() {
                warn!(
                    target: "syncvisor",
                    kind = ?ev.kind,
                    controller = ev.controller.as_deref().unwrap_or("-"),
                    identity = ?ev.identity,
                    reason = ev.reason.as_deref().unwrap_or(""),
                    "failure reported with no listener"
                );
            }
        }
    }

    /// Creates a receiver observing events sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
