//! # Syncer contract.
//!
//! A [`Syncer`] is the resource-specific half of a controller. The engine calls
//! it in two steps per dequeued identity:
//!
//! ```text
//! resolve(identity) ─► Ok(None)         → nothing to do (object is gone), success
//!                   ─► Ok(Some(object)) → reconcile(object) ─► Ok / Err
//!                   ─► Err(e)           → failure, retry policy applies
//! ```
//!
//! ## Concurrency
//! The engine may call a syncer concurrently for **different** identities but
//! never for the same identity twice at once. Shared caches and clients inside
//! the syncer must therefore be safe across concurrent calls.
//!
//! [`SyncFn`] builds a syncer from two closures:
//! ```rust
//! use syncvisor::{Identity, SyncError, SyncFn, Syncer};
//!
//! # async fn demo() {
//! let syncer = SyncFn::<String, _, _>::new(
//!     |id: Identity| async move { Ok::<_, SyncError>(Some(id.name().to_string())) },
//!     |name: String| async move {
//!         assert!(!name.is_empty());
//!         Ok::<_, SyncError>(())
//!     },
//! );
//!
//! let obj = syncer.resolve(&Identity::new("ns", "cm")).await.unwrap();
//! assert_eq!(obj.as_deref(), Some("cm"));
//! # }
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SyncError;
use crate::identity::Identity;

/// Resolves identities to objects and reconciles them.
#[async_trait]
pub trait Syncer: Send + Sync + 'static {
    /// Current state handed from `resolve` to `reconcile`.
    type Object: Send + 'static;

    /// Looks up the current object for `identity`.
    ///
    /// Returns `Ok(None)` if it no longer exists; that is not an error.
    async fn resolve(&self, identity: &Identity) -> Result<Option<Self::Object>, SyncError>;

    /// Performs the reconciliation side effect for one resolved object.
    async fn reconcile(&self, object: Self::Object) -> Result<(), SyncError>;
}

#[async_trait]
impl<S: Syncer + ?Sized> Syncer for Arc<S> {
    type Object = S::Object;

    async fn resolve(&self, identity: &Identity) -> Result<Option<Self::Object>, SyncError> {
        (**self).resolve(identity).await
    }

    async fn reconcile(&self, object: Self::Object) -> Result<(), SyncError> {
        (**self).reconcile(object).await
    }
}

/// Closure-backed [`Syncer`].
///
/// Each call creates a fresh future; share state explicitly through `Arc`
/// captured by the closures.
pub struct SyncFn<O, K, R> {
    resolve: K,
    reconcile: R,
    _object: PhantomData<fn() -> O>,
}

impl<O, K, R> SyncFn<O, K, R> {
    pub fn new(resolve: K, reconcile: R) -> Self {
        Self {
            resolve,
            reconcile,
            _object: PhantomData,
        }
    }

    /// Creates the syncer behind an `Arc`.
    pub fn arc(resolve: K, reconcile: R) -> Arc<Self> {
        Arc::new(Self::new(resolve, reconcile))
    }
}

#[async_trait]
impl<O, K, KFut, R, RFut> Syncer for SyncFn<O, K, R>
where
    O: Send + 'static,
    K: Fn(Identity) -> KFut + Send + Sync + 'static,
    KFut: Future<Output = Result<Option<O>, SyncError>> + Send + 'static,
    R: Fn(O) -> RFut + Send + Sync + 'static,
    RFut: Future<Output = Result<(), SyncError>> + Send + 'static,
{
    type Object = O;

    async fn resolve(&self, identity: &Identity) -> Result<Option<O>, SyncError> {
        (self.resolve)(identity.clone()).await
    }

    async fn reconcile(&self, object: O) -> Result<(), SyncError> {
        (self.reconcile)(object).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_sync_fn_resolves_and_reconciles() {
        let store: Arc<HashMap<Identity, u32>> =
            Arc::new([(Identity::new("ns", "a"), 7)].into_iter().collect());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let syncer = {
            let store = Arc::clone(&store);
            let seen = Arc::clone(&seen);
            SyncFn::<u32, _, _>::new(
                move |id: Identity| {
                    let store = Arc::clone(&store);
                    async move { Ok::<_, SyncError>(store.get(&id).copied()) }
                },
                move |v: u32| {
                    let seen = Arc::clone(&seen);
                    async move {
                        seen.lock().unwrap().push(v);
                        Ok::<_, SyncError>(())
                    }
                },
            )
        };

        assert_eq!(syncer.resolve(&Identity::new("ns", "a")).await, Ok(Some(7)));
        assert_eq!(syncer.resolve(&Identity::new("ns", "zz")).await, Ok(None));
        syncer.reconcile(7).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_arc_forwarding() {
        let syncer = SyncFn::<(), _, _>::arc(
            |_id: Identity| async { Err::<Option<()>, _>(SyncError::fail("down")) },
            |_: ()| async { Ok::<_, SyncError>(()) },
        );
        let err = syncer.resolve(&Identity::singleton()).await.unwrap_err();
        assert_eq!(err.as_label(), "sync_failed");
    }
}
