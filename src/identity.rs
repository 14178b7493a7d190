//! # Reconciliation keys.
//!
//! An [`Identity`] is the `namespace/name` pair a reconciliation is keyed on.
//! It is the deduplication key of the work queue: two identities are the same
//! queue entry iff both fields are equal.
//!
//! Watched objects expose their own identity through the [`Resource`] trait.
//! Singleton controllers collapse every object onto [`Identity::singleton`].
//!
//! ## Example
//! ```rust
//! use syncvisor::Identity;
//!
//! let id = Identity::new("kube-system", "ca-bundle");
//! assert_eq!(id.to_string(), "kube-system/ca-bundle");
//! assert_ne!(id, Identity::singleton());
//! ```

use std::fmt;
use std::sync::Arc;

/// Namespace and name used by every singleton (operator-style) controller.
pub const SINGLETON_KEY: &str = "🐼";

/// Key of one reconciliation stream.
///
/// Cheap to clone: both parts are reference counted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    namespace: Arc<str>,
    name: Arc<str>,
}

impl Identity {
    /// Creates an identity from a namespace and a name.
    ///
    /// Cluster-scoped objects use an empty namespace.
    pub fn new(namespace: impl Into<Arc<str>>, name: impl Into<Arc<str>>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Returns the sentinel identity shared by all events of a singleton controller.
    pub fn singleton() -> Self {
        Self::new(SINGLETON_KEY, SINGLETON_KEY)
    }

    /// Returns the identity of a watched object.
    pub fn of<R: Resource + ?Sized>(object: &R) -> Self {
        Self::new(object.namespace(), object.name())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True for the sentinel identity.
    pub fn is_singleton(&self) -> bool {
        &*self.namespace == SINGLETON_KEY && &*self.name == SINGLETON_KEY
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Object metadata needed to derive an [`Identity`].
///
/// Implemented by every payload type delivered by a watch source.
pub trait Resource: Send + Sync + 'static {
    /// Namespace of the object (empty for cluster-scoped objects).
    fn namespace(&self) -> &str;

    /// Name of the object, unique within its namespace.
    fn name(&self) -> &str;
}

impl<R: Resource + ?Sized> Resource for Arc<R> {
    fn namespace(&self) -> &str {
        (**self).namespace()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
