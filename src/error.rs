//! Error types used by the syncvisor runtime and syncers.
//!
//! This module defines three error enums:
//!
//! - [`SyncError`]: errors returned by a [`Syncer`](crate::Syncer) for one identity.
//! - [`IngestError`]: notifications that could not be turned into an identity.
//! - [`RuntimeError`]: failures of a controller run itself.
//!
//! All of them provide `as_label` (stable snake_case label for logs/metrics)
//! and `as_message` helpers.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced while reconciling one identity.
///
/// `Fail` and `Panicked` are retried according to the controller's retry
/// policy; `Fatal` drops the identity immediately.
///
/// "Not found" is **not** an error: resolvers return `Ok(None)` for objects
/// that no longer exist.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Reconciliation failed but may succeed if retried.
    #[error("sync failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable error; the identity is dropped without retry.
    #[error("fatal sync error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// The syncer panicked; caught by the worker and retried like `Fail`.
    #[error("syncer panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },
}

impl SyncError {
    /// Shorthand for [`SyncError::Fail`].
    pub fn fail(error: impl ToString) -> Self {
        SyncError::Fail {
            error: error.to_string(),
        }
    }

    /// Shorthand for [`SyncError::Fatal`].
    pub fn fatal(error: impl ToString) -> Self {
        SyncError::Fatal {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use syncvisor::SyncError;
    ///
    /// assert_eq!(SyncError::fail("boom").as_label(), "sync_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SyncError::Fail { .. } => "sync_failed",
            SyncError::Fatal { .. } => "sync_fatal",
            SyncError::Panicked { .. } => "sync_panicked",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            SyncError::Fail { error } => format!("error: {error}"),
            SyncError::Fatal { error } => format!("fatal: {error}"),
            SyncError::Panicked { info } => format!("panic: {info}"),
        }
    }

    /// Indicates whether the retry policy may requeue the identity.
    ///
    /// # Example
    /// ```
    /// use syncvisor::SyncError;
    ///
    /// assert!(SyncError::fail("conflict").is_retryable());
    /// assert!(!SyncError::fatal("invalid manifest").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Fail { .. } | SyncError::Panicked { .. })
    }
}

/// # Errors produced while ingesting watch notifications.
///
/// Ingestion errors never reach the queue: the notification is dropped and
/// the error is reported on the event bus.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// Delete notification carried a tombstone without a usable last-known state.
    #[error("could not get object from tombstone {key:?}")]
    EmptyTombstone {
        /// Store key recorded in the tombstone.
        key: String,
    },
}

impl IngestError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            IngestError::EmptyTombstone { .. } => "ingest_empty_tombstone",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            IngestError::EmptyTombstone { key } => format!("empty tombstone: key={key}"),
        }
    }
}

/// # Errors produced by a controller run.
///
/// These abort a run (or report a slow shutdown); they never terminate the process.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Stop signal fired before every watch source finished its initial sync.
    #[error("stopped before caches synced; pending: {pending:?}")]
    CacheSyncAborted {
        /// Names of the sources that had not synced yet.
        pending: Vec<String>,
    },

    /// `run` was called on a controller that already ran.
    #[error("controller {controller:?} already running")]
    AlreadyRunning {
        /// Controller name.
        controller: String,
    },

    /// Shutdown grace period was exceeded; some runners did not return in time.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of the runners still running.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use syncvisor::RuntimeError;
    ///
    /// let err = RuntimeError::CacheSyncAborted { pending: vec!["configmaps".into()] };
    /// assert_eq!(err.as_label(), "runtime_cache_sync_aborted");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::CacheSyncAborted { .. } => "runtime_cache_sync_aborted",
            RuntimeError::AlreadyRunning { .. } => "runtime_already_running",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::CacheSyncAborted { pending } => {
                format!("timed out waiting for caches to sync; pending={pending:?}")
            }
            RuntimeError::AlreadyRunning { controller } => {
                format!("controller {controller} already running")
            }
            RuntimeError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck runners={stuck:?}")
            }
        }
    }
}
