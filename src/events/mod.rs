//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Controller::run`, workers, `EventHandler` (ingestion),
//!   `Manager`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the controller's listener, which fans out to its `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
