//! Runtime core: controllers, their workers, and process-level orchestration.
//!
//! - `controller`: builder, run loop and worker pool for one syncer;
//! - `worker`: sync-and-retry step for one dequeued identity;
//! - `barrier`: cache-sync gate in front of the workers;
//! - `manager`: many runners on one stop token with a shutdown grace;
//! - `shutdown`: cross-platform OS signal handling.

mod barrier;
mod controller;
mod manager;
pub mod shutdown;
mod worker;

pub use controller::{Controller, ControllerBuilder};
pub use manager::{Manager, Runner};
