//! # Event subscriber trait.
//!
//! [`Subscribe`] is the extension point for error sinks, logs and metrics.
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently of workers and other sinks)
//! - **Per-subscriber bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics are caught and reported as `EventKind::SubscriberPanicked`)
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use syncvisor::{Event, EventKind, Subscribe};
//!
//! struct DropAlerts;
//!
//! #[async_trait]
//! impl Subscribe for DropAlerts {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::SyncDropped {
//!             // page someone
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "drop-alerts" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for runtime observability.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally.
/// - Slow processing only delays this subscriber's own queue.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event, in FIFO order per subscriber.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic events.
    ///
    /// The default uses `type_name::<Self>()`; override it with something short.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity (clamped to at least 1). Default: 1024.
    ///
    /// On overflow the event is dropped for this subscriber only and
    /// `EventKind::SubscriberOverflow` is published.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
