//! # Error sinks and observers.
//!
//! Events published on the [`Bus`](crate::events::Bus) reach sinks through a
//! [`SubscriberSet`]:
//!
//! ```text
//! Controller/workers ── publish(Event) ──► Bus ──► SubscriberSet::listen
//!                                                     ├──► [queue] ──► LogWriter
//!                                                     └──► [queue] ──► custom sink
//! ```
//!
//! A controller with no subscribers still publishes; nobody listens, which
//! makes the default sink a no-op.

mod log;
mod set;
mod subscriber;

pub use log::LogWriter;
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
