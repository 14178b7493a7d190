//! # Cache-sync barrier.
//!
//! Blocks startup until every registered [`CacheSynced`] predicate holds,
//! re-polling at a fixed interval. A stop signal observed first aborts the
//! run with [`RuntimeError::CacheSyncAborted`] naming the sources still
//! pending.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::RuntimeError;
use crate::source::CacheSynced;

/// Polls `sources` every `poll` until all report synced or `token` is cancelled.
///
/// Cancellation takes precedence: a token cancelled before the call returns
/// `Err` even if every source has already synced.
pub(crate) async fn wait_for_cache_sync(
    sources: &[Arc<dyn CacheSynced>],
    poll: Duration,
    token: &CancellationToken,
) -> Result<(), RuntimeError> {
    loop {
        let pending = pending(sources);
        if token.is_cancelled() {
            return Err(RuntimeError::CacheSyncAborted { pending });
        }
        if pending.is_empty() {
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                return Err(RuntimeError::CacheSyncAborted { pending });
            }
            _ = tokio::time::sleep(poll) => {}
        }
    }
}

fn pending(sources: &[Arc<dyn CacheSynced>]) -> Vec<String> {
    sources
        .iter()
        .filter(|s| !s.has_synced())
        .map(|s| s.name().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Flag(&'static str, AtomicBool);

    impl CacheSynced for Flag {
        fn has_synced(&self) -> bool {
            self.1.load(Ordering::SeqCst)
        }
        fn name(&self) -> &str {
            self.0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_passes_once_all_synced() {
        let a = Arc::new(Flag("a", AtomicBool::new(true)));
        let b = Arc::new(Flag("b", AtomicBool::new(false)));
        let sources: Vec<Arc<dyn CacheSynced>> = vec![a, b.clone()];
        let token = CancellationToken::new();

        let waiter = {
            let token = token.clone();
            tokio::spawn(async move {
                wait_for_cache_sync(&sources, Duration::from_millis(100), &token).await
            })
        };
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(!waiter.is_finished());

        b.1.store(true, Ordering::SeqCst);
        assert_eq!(waiter.await.expect("join"), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_aborts_with_pending_names() {
        let sources: Vec<Arc<dyn CacheSynced>> = vec![
            Arc::new(Flag("configmaps", AtomicBool::new(false))),
            Arc::new(Flag("secrets", AtomicBool::new(true))),
        ];
        let token = CancellationToken::new();
        let stopper = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            stopper.cancel();
        });

        let err = wait_for_cache_sync(&sources, Duration::from_millis(100), &token)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RuntimeError::CacheSyncAborted {
                pending: vec!["configmaps".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_no_sources_passes_immediately() {
        let token = CancellationToken::new();
        assert_eq!(
            wait_for_cache_sync(&[], Duration::from_millis(100), &token).await,
            Ok(())
        );
    }
}
