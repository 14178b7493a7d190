//! # Deduplicating work queue with in-flight tracking.
//!
//! [`WorkQueue`] holds pending identities in FIFO order and guarantees that an
//! identity is never handed to two workers at once.
//!
//! ## State
//! ```text
//!            add(id)                     get()                 done(id)
//!   ─────────────────► dirty ∪ queue ──────────► processing ──────────► (gone)
//!                         ▲                          │
//!                         └──── re-added while ──────┘
//!                               processing: parked in `dirty`,
//!                               queued again on done(id)
//! ```
//!
//! ## Rules
//! - `dirty` is the set of identities waiting for delivery; adding an identity
//!   already in `dirty` is a no-op (coalescing).
//! - `processing` is the set handed out by `get` and not yet `done`.
//! - An identity in `processing` that is re-added stays out of `queue` until
//!   `done`, so a single identity is never processed concurrently.
//! - After `shut_down`, adds are ignored and `get` keeps draining `queue`;
//!   it returns `None` once the queue is empty.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::identity::Identity;
use crate::util::lock;

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<Identity>,
    dirty: HashSet<Identity>,
    processing: HashSet<Identity>,
    shutting_down: bool,
}

/// FIFO of identities with coalescing and single-flight delivery.
#[derive(Debug, Default)]
pub struct WorkQueue {
    state: Mutex<State>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `identity` as needing processing.
    ///
    /// Returns `true` if this call made the identity pending, `false` if it
    /// coalesced with an existing entry or the queue is shutting down.
    pub fn add(&self, identity: Identity) -> bool {
        let mut st = lock(&self.state);
        if st.shutting_down || st.dirty.contains(&identity) {
            return false;
        }
        st.dirty.insert(identity.clone());
        if st.processing.contains(&identity) {
            return true;
        }
        st.queue.push_back(identity);
        drop(st);

        self.notify.notify_one();
        true
    }

    /// Waits for the next identity to process.
    ///
    /// Returns `None` once the queue is shut down and drained. Every
    /// `Some(identity)` must be followed by exactly one [`done`](Self::done).
    pub async fn get(&self) -> Option<Identity> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // register before inspecting state so a concurrent add/shut_down is not missed
            notified.as_mut().enable();

            {
                let mut st = lock(&self.state);
                if let Some(identity) = st.queue.pop_front() {
                    st.dirty.remove(&identity);
                    st.processing.insert(identity.clone());
                    let more = !st.queue.is_empty();
                    drop(st);

                    if more {
                        self.notify.notify_one();
                    }
                    return Some(identity);
                }
                if st.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Marks `identity` as processed.
    ///
    /// If it was re-added meanwhile, it becomes deliverable again now.
    pub fn done(&self, identity: &Identity) {
        let mut st = lock(&self.state);
        st.processing.remove(identity);
        if st.dirty.contains(identity) {
            st.queue.push_back(identity.clone());
            drop(st);
            self.notify.notify_one();
        }
    }

    /// Stops accepting new identities and wakes every waiting `get`.
    pub fn shut_down(&self) {
        lock(&self.state).shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        lock(&self.state).shutting_down
    }

    /// Number of identities ready for delivery.
    pub fn len(&self) -> usize {
        lock(&self.state).queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of identities handed out and not yet done.
    pub fn in_flight(&self) -> usize {
        lock(&self.state).processing.len()
    }
}
