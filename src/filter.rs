//! # Event admission filters.
//!
//! A [`Filter`] decides which watch notifications are worth a reconciliation
//! and which [`Identity`] they should reconcile.
//!
//! ## Rules
//! - Every predicate defaults to **admit**.
//! - [`Filter::parent`] is only consulted for admitted events.
//! - Rejected events have no side effect.
//!
//! Controllers that only need a couple of predicates use [`FilterFn`], the
//! functions-as-fields adapter:
//!
//! ```rust
//! use syncvisor::{Filter, FilterFn, Identity, Resource};
//!
//! struct ConfigMap { ns: String, name: String, inject: bool }
//!
//! impl Resource for ConfigMap {
//!     fn namespace(&self) -> &str { &self.ns }
//!     fn name(&self) -> &str { &self.name }
//! }
//!
//! let filter = FilterFn::<ConfigMap>::new()
//!     .on_add(|cm| cm.inject)
//!     .on_update(|_old, new| new.inject);
//!
//! let cm = ConfigMap { ns: "ns".into(), name: "ca".into(), inject: true };
//! assert!(filter.add(&cm));
//! assert!(filter.delete(&cm)); // unset predicate admits
//! assert_eq!(filter.parent(&cm), Identity::new("ns", "ca"));
//! ```

use std::fmt;
use std::sync::Arc;

use crate::identity::{Identity, Resource};

/// Admission decisions for one watched object type.
pub trait Filter<R: Resource>: Send + Sync + 'static {
    /// True admits a creation notification.
    fn add(&self, _object: &R) -> bool {
        true
    }

    /// True admits a change notification.
    ///
    /// Implementations typically compare `old` and `new` to suppress no-op updates.
    fn update(&self, _old: &R, _new: &R) -> bool {
        true
    }

    /// True admits a deletion notification.
    fn delete(&self, _object: &R) -> bool {
        true
    }

    /// Identity to reconcile for an admitted notification.
    fn parent(&self, object: &R) -> Identity {
        Identity::of(object)
    }
}

impl<R: Resource, F: Filter<R> + ?Sized> Filter<R> for Arc<F> {
    fn add(&self, object: &R) -> bool {
        (**self).add(object)
    }

    fn update(&self, old: &R, new: &R) -> bool {
        (**self).update(old, new)
    }

    fn delete(&self, object: &R) -> bool {
        (**self).delete(object)
    }

    fn parent(&self, object: &R) -> Identity {
        (**self).parent(object)
    }
}

/// Filter that admits every notification and keys it by the object itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct AdmitAll;

impl<R: Resource> Filter<R> for AdmitAll {}

type Predicate<R> = Box<dyn Fn(&R) -> bool + Send + Sync>;
type UpdatePredicate<R> = Box<dyn Fn(&R, &R) -> bool + Send + Sync>;
type ParentFn<R> = Box<dyn Fn(&R) -> Identity + Send + Sync>;

/// Function-backed [`Filter`].
///
/// Each field is optional; a missing predicate admits and a missing parent
/// function keys the event by the object's own identity.
pub struct FilterFn<R> {
    add: Option<Predicate<R>>,
    update: Option<UpdatePredicate<R>>,
    delete: Option<Predicate<R>>,
    parent: Option<ParentFn<R>>,
}

impl<R> FilterFn<R> {
    /// Creates a filter with every predicate unset.
    pub fn new() -> Self {
        Self {
            add: None,
            update: None,
            delete: None,
            parent: None,
        }
    }

    pub fn on_add(mut self, f: impl Fn(&R) -> bool + Send + Sync + 'static) -> Self {
        self.add = Some(Box::new(f));
        self
    }

    pub fn on_update(mut self, f: impl Fn(&R, &R) -> bool + Send + Sync + 'static) -> Self {
        self.update = Some(Box::new(f));
        self
    }

    pub fn on_delete(mut self, f: impl Fn(&R) -> bool + Send + Sync + 'static) -> Self {
        self.delete = Some(Box::new(f));
        self
    }

    /// Overrides the identity an admitted event reconciles.
    pub fn with_parent(mut self, f: impl Fn(&R) -> Identity + Send + Sync + 'static) -> Self {
        self.parent = Some(Box::new(f));
        self
    }
}

impl<R> Default for FilterFn<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for FilterFn<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterFn")
            .field("add", &self.add.is_some())
            .field("update", &self.update.is_some())
            .field("delete", &self.delete.is_some())
            .field("parent", &self.parent.is_some())
            .finish()
    }
}

impl<R: Resource> Filter<R> for FilterFn<R> {
    fn add(&self, object: &R) -> bool {
        self.add.as_ref().is_none_or(|f| f(object))
    }

    fn update(&self, old: &R, new: &R) -> bool {
        self.update.as_ref().is_none_or(|f| f(old, new))
    }

    fn delete(&self, object: &R) -> bool {
        self.delete.as_ref().is_none_or(|f| f(object))
    }

    fn parent(&self, object: &R) -> Identity {
        match &self.parent {
            Some(f) => f(object),
            None => Identity::of(object),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Obj {
        name: &'static str,
        generation: u64,
    }

    impl Resource for Obj {
        fn namespace(&self) -> &str {
            "ns"
        }
        fn name(&self) -> &str {
            self.name
        }
    }

    fn obj(name: &'static str, generation: u64) -> Obj {
        Obj { name, generation }
    }

    #[test]
    fn test_unset_predicates_admit() {
        let f = FilterFn::<Obj>::new();
        assert!(f.add(&obj("a", 1)));
        assert!(f.update(&obj("a", 1), &obj("a", 1)));
        assert!(f.delete(&obj("a", 1)));
        assert_eq!(f.parent(&obj("a", 1)), Identity::new("ns", "a"));
    }

    #[test]
    fn test_update_suppresses_no_op_changes() {
        let f = FilterFn::<Obj>::new().on_update(|old, new| old.generation != new.generation);
        assert!(!f.update(&obj("a", 1), &obj("a", 1)));
        assert!(f.update(&obj("a", 1), &obj("a", 2)));
        // other kinds stay admitted
        assert!(f.add(&obj("a", 1)));
    }

    #[test]
    fn test_custom_parent() {
        let f = FilterFn::<Obj>::new().with_parent(|o| Identity::new("owners", o.name));
        assert_eq!(f.parent(&obj("x", 0)), Identity::new("owners", "x"));
    }

    #[test]
    fn test_admit_all_and_arc_forwarding() {
        let f: Arc<dyn Filter<Obj>> = Arc::new(FilterFn::<Obj>::new().on_delete(|_| false));
        assert!(!f.delete(&obj("a", 1)));
        assert!(f.add(&obj("a", 1)));
        assert!(Filter::<Obj>::add(&AdmitAll, &obj("b", 1)));
    }
}
