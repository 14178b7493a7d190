//! # Watch sources and notification ingestion.
//!
//! A watch source (an informer-like cache) pushes [`Notification`]s into the
//! handlers registered on it and reports when its initial snapshot is loaded.
//! The engine only consumes these contracts:
//!
//! - [`WatchSource`]: `add_handler` + the [`CacheSynced`] predicate
//! - [`NotificationHandler`]: implemented by the engine's ingestion handler
//!
//! ## Ingestion
//! ```text
//! Added(obj)            ─► filter.add(obj)?          ─► queue.add(filter.parent(obj))
//! Updated{old, new}     ─► filter.update(old, new)?  ─► queue.add(filter.parent(new))
//! Deleted(Live(obj))    ─► filter.delete(obj)?       ─► queue.add(filter.parent(obj))
//! Deleted(Tombstone{..})
//!   ├─ last_state: Some ─► same as Live
//!   └─ last_state: None ─► TombstoneUnresolved event, nothing enqueued
//! ```
//!
//! [`MemorySource`] is a small in-process watch source holding the current
//! objects; it doubles as the lister a syncer resolves identities against.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::IngestError;
use crate::events::{Bus, Event, EventKind};
use crate::filter::Filter;
use crate::identity::{Identity, Resource};
use crate::queue::RateLimitingQueue;
use crate::util::lock;

/// Change notification delivered by a watch source.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification<R> {
    Added(R),
    Updated { old: R, new: R },
    Deleted(DeletedObject<R>),
}

/// Payload of a delete notification.
#[derive(Clone, Debug, PartialEq)]
pub enum DeletedObject<R> {
    /// The object as it was when deleted.
    Live(R),
    /// The object left the source's store before the delete was processed.
    Tombstone(Tombstone<R>),
}

/// "Deleted, final state unknown" wrapper.
#[derive(Clone, Debug, PartialEq)]
pub struct Tombstone<R> {
    /// Store key of the deleted object (`namespace/name`).
    pub key: String,
    /// Last state observed by the source, if it still had one.
    pub last_state: Option<R>,
}

impl<R> DeletedObject<R> {
    /// Returns the deleted object, unwrapping a tombstone if needed.
    pub fn object(&self) -> Result<&R, IngestError> {
        match self {
            DeletedObject::Live(obj) => Ok(obj),
            DeletedObject::Tombstone(Tombstone {
                last_state: Some(obj),
                ..
            }) => Ok(obj),
            DeletedObject::Tombstone(Tombstone {
                key,
                last_state: None,
            }) => Err(IngestError::EmptyTombstone { key: key.clone() }),
        }
    }
}

/// Receives notifications from a watch source.
///
/// Called synchronously from the source's dispatch path; must not block.
pub trait NotificationHandler<R>: Send + Sync + 'static {
    fn notify(&self, notification: &Notification<R>);
}

/// "Initial sync complete" predicate of a watch source.
pub trait CacheSynced: Send + Sync + 'static {
    fn has_synced(&self) -> bool;

    /// Name reported when the cache-sync barrier is aborted.
    fn name(&self) -> &str {
        "cache"
    }
}

/// Source of change notifications for objects of type `R`.
pub trait WatchSource<R>: CacheSynced {
    /// Registers a handler that receives every subsequent notification.
    fn add_handler(&self, handler: Arc<dyn NotificationHandler<R>>);
}

impl<C: CacheSynced + ?Sized> CacheSynced for Arc<C> {
    fn has_synced(&self) -> bool {
        (**self).has_synced()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Engine-side notification handler: filter, extract, enqueue.
pub(crate) struct EventHandler<R> {
    filter: Arc<dyn Filter<R>>,
    queue: RateLimitingQueue,
    bus: Bus,
    controller: Arc<str>,
}

impl<R: Resource> EventHandler<R> {
    pub(crate) fn new(
        filter: Arc<dyn Filter<R>>,
        queue: RateLimitingQueue,
        bus: Bus,
        controller: Arc<str>,
    ) -> Self {
        Self {
            filter,
            queue,
            bus,
            controller,
        }
    }

    fn admit(&self, kind: &'static str, object: &R) {
        let parent = self.filter.parent(object);
        debug!(
            controller = %self.controller,
            kind,
            object = %Identity::of(object),
            parent = %parent,
            "admitted"
        );
        self.queue.add(parent.clone());
        self.bus.publish(
            Event::new(EventKind::EventAdmitted)
                .with_controller(Arc::clone(&self.controller))
                .with_identity(parent)
                .with_reason(kind),
        );
    }
}

impl<R: Resource> NotificationHandler<R> for EventHandler<R> {
    fn notify(&self, notification: &Notification<R>) {
        match notification {
            Notification::Added(obj) => {
                if self.filter.add(obj) {
                    self.admit("add", obj);
                }
            }
            Notification::Updated { old, new } => {
                if self.filter.update(old, new) {
                    self.admit("update", new);
                }
            }
            Notification::Deleted(deleted) => match deleted.object() {
                Ok(obj) => {
                    if self.filter.delete(obj) {
                        self.admit("delete", obj);
                    }
                }
                Err(err) => {
                    self.bus.publish(
                        Event::new(EventKind::TombstoneUnresolved)
                            .with_controller(Arc::clone(&self.controller))
                            .with_reason(err.as_message()),
                    );
                }
            },
        }
    }
}

/// In-memory watch source and lister.
///
/// Mutations update the store first, then notify handlers in registration
/// order. Cheap to clone; clones share the same store.
pub struct MemorySource<R> {
    inner: Arc<MemoryInner<R>>,
}

struct MemoryInner<R> {
    name: String,
    objects: Mutex<BTreeMap<Identity, R>>,
    handlers: Mutex<Vec<Arc<dyn NotificationHandler<R>>>>,
    synced: AtomicBool,
}

impl<R> Clone for MemorySource<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> fmt::Debug for MemorySource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySource")
            .field("name", &self.inner.name)
            .field("synced", &self.inner.synced.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<R: Resource + Clone> MemorySource<R> {
    /// Creates an empty, not yet synced source.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                name: name.into(),
                objects: Mutex::new(BTreeMap::new()),
                handlers: Mutex::new(Vec::new()),
                synced: AtomicBool::new(false),
            }),
        }
    }

    /// Marks the initial snapshot as loaded.
    pub fn mark_synced(&self) {
        self.inner.synced.store(true, Ordering::Release);
    }

    /// Inserts or replaces an object, notifying `Added` or `Updated`.
    pub fn apply(&self, object: R) {
        let id = Identity::of(&object);
        let old = lock(&self.inner.objects).insert(id, object.clone());
        let notification = match old {
            Some(old) => Notification::Updated { old, new: object },
            None => Notification::Added(object),
        };
        self.dispatch(&notification);
    }

    /// Removes an object, notifying `Deleted(Live)`. Returns the removed object.
    pub fn delete(&self, identity: &Identity) -> Option<R> {
        let removed = lock(&self.inner.objects).remove(identity)?;
        self.dispatch(&Notification::Deleted(DeletedObject::Live(removed.clone())));
        Some(removed)
    }

    /// Removes an object and delivers the delete as a tombstone.
    ///
    /// `keep_state = false` simulates a tombstone whose last state was lost.
    pub fn delete_final_state_unknown(&self, identity: &Identity, keep_state: bool) {
        let removed = lock(&self.inner.objects).remove(identity);
        let tombstone = Tombstone {
            key: identity.to_string(),
            last_state: removed.filter(|_| keep_state),
        };
        self.dispatch(&Notification::Deleted(DeletedObject::Tombstone(tombstone)));
    }

    /// Delivers a raw notification without touching the store.
    pub fn notify(&self, notification: Notification<R>) {
        self.dispatch(&notification);
    }

    /// Returns a copy of the current object for `identity`.
    pub fn get(&self, identity: &Identity) -> Option<R> {
        lock(&self.inner.objects).get(identity).cloned()
    }

    /// Returns copies of all current objects, ordered by identity.
    pub fn list(&self) -> Vec<R> {
        lock(&self.inner.objects).values().cloned().collect()
    }

    fn dispatch(&self, notification: &Notification<R>) {
        let handlers = lock(&self.inner.handlers).clone();
        for h in handlers {
            h.notify(notification);
        }
    }
}

impl<R: Resource> CacheSynced for MemorySource<R> {
    fn has_synced(&self) -> bool {
        self.inner.synced.load(Ordering::Acquire)
    }

    fn name(&self) -> &str {
        &self.inner.name
    }
}

impl<R: Resource> WatchSource<R> for MemorySource<R> {
    fn add_handler(&self, handler: Arc<dyn NotificationHandler<R>>) {
        lock(&self.inner.handlers).push(handler);
    }
}
