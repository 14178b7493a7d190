//! # Manager: many runners, one stop signal, bounded shutdown.
//!
//! A process usually hosts several controllers and operators. [`Manager`]
//! starts each [`Runner`] on a child of one stop token and, once the token
//! fires, waits up to its grace period (see [`Manager::from_config`]) for all
//! of them to return.
//!
//! ```text
//! run(token)
//!   ├─► spawn runner[i].run(token.child_token())   (JoinSet)
//!   ├─► select:
//!   │     ├─ every runner returned ─► first error or Ok
//!   │     └─ token cancelled       ─► ShutdownRequested
//!   │                                 └─► join within grace:
//!   │                                       ├─ Ok      ─► AllStoppedWithin
//!   │                                       └─ timeout ─► GraceExceeded{ stuck }, abort rest
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::config::ControllerConfig;
use crate::core::shutdown;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Anything a [`Manager`] can run until stopped.
#[async_trait]
pub trait Runner: Send + Sync + 'static {
    /// Name used in grace reports.
    fn name(&self) -> &str;

    /// Runs until `token` is cancelled.
    async fn run(&self, token: CancellationToken) -> Result<(), RuntimeError>;
}

/// Spawn index of the runner and its result; names may repeat, indexes do not.
type Joined = (usize, Result<(), RuntimeError>);

/// Runs a set of [`Runner`]s under one stop token.
pub struct Manager {
    runners: Vec<Arc<dyn Runner>>,
    grace: Duration,
    bus: Bus,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl Manager {
    /// Creates an empty manager with the given shutdown grace.
    pub fn new(grace: Duration) -> Self {
        Self {
            runners: Vec::new(),
            grace,
            bus: Bus::new(64),
            subscribers: Vec::new(),
        }
    }

    /// Creates an empty manager using `cfg.grace` and `cfg.bus_capacity`.
    pub fn from_config(cfg: &ControllerConfig) -> Self {
        Self {
            bus: Bus::new(cfg.bus_capacity),
            ..Self::new(cfg.grace)
        }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Adds a runner.
    pub fn with_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.runners.push(runner);
        self
    }

    /// Adds sinks for the manager's own events.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers.extend(subscribers);
        self
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Runs until an OS termination signal arrives.
    pub async fn run_until_signal(self) -> Result<(), RuntimeError> {
        let token = CancellationToken::new();
        let stopper = token.clone();
        tokio::spawn(async move {
            match shutdown::wait_for_shutdown_signal().await {
                Ok(()) => stopper.cancel(),
                Err(e) => warn!(error = %e, "cannot listen for shutdown signals"),
            }
        });
        self.run(token).await
    }

    /// Runs every runner until `token` is cancelled or all of them return.
    ///
    /// # Errors
    /// - [`RuntimeError::GraceExceeded`] when runners outlive the grace period
    /// - otherwise the first error returned by a runner
    pub async fn run(self, token: CancellationToken) -> Result<(), RuntimeError> {
        let listener_stop = CancellationToken::new();
        let listener = tokio::spawn(
            SubscriberSet::new(self.subscribers.clone(), self.bus.clone())
                .listen(self.bus.subscribe(), listener_stop.clone()),
        );

        let mut alive = BTreeMap::new();
        let mut set: JoinSet<Joined> = JoinSet::new();
        for (idx, runner) in self.runners.iter().enumerate() {
            let runner = Arc::clone(runner);
            let child = token.child_token();
            alive.insert(idx, runner.name().to_string());
            set.spawn(async move { (idx, runner.run(child).await) });
        }

        let res = self.drive(&mut set, &mut alive, &token).await;

        listener_stop.cancel();
        if let Err(e) = listener.await {
            error!(error = %e, "subscriber listener failed");
        }
        res
    }

    async fn drive(
        &self,
        set: &mut JoinSet<Joined>,
        alive: &mut BTreeMap<usize, String>,
        token: &CancellationToken,
    ) -> Result<(), RuntimeError> {
        let mut first_err = None;

        let stopped = tokio::select! {
            _ = token.cancelled() => true,
            _ = join_all(set, alive, &mut first_err) => false,
        };
        if !stopped {
            return first_err.map_or(Ok(()), Err);
        }

        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        let joined = tokio::time::timeout(self.grace, join_all(set, alive, &mut first_err)).await;
        match joined {
            Ok(()) => {
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                first_err.map_or(Ok(()), Err)
            }
            Err(_) => {
                let stuck: Vec<String> = alive.values().cloned().collect();
                self.bus.publish(
                    Event::new(EventKind::GraceExceeded).with_reason(stuck.join(", ")),
                );
                set.abort_all();
                Err(RuntimeError::GraceExceeded {
                    grace: self.grace,
                    stuck,
                })
            }
        }
    }
}

async fn join_all(
    set: &mut JoinSet<Joined>,
    alive: &mut BTreeMap<usize, String>,
    first_err: &mut Option<RuntimeError>,
) {
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, res)) => {
                alive.remove(&idx);
                if let Err(e) = res {
                    first_err.get_or_insert(e);
                }
            }
            Err(e) => error!(error = %e, "runner task failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sleeper {
        name: &'static str,
        linger: Duration,
    }

    #[async_trait]
    impl Runner for Sleeper {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(&self, token: CancellationToken) -> Result<(), RuntimeError> {
            token.cancelled().await;
            tokio::time::sleep(self.linger).await;
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Runner for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn run(&self, _token: CancellationToken) -> Result<(), RuntimeError> {
            Err(RuntimeError::AlreadyRunning {
                controller: "failing".into(),
            })
        }
    }

    fn sleeper(name: &'static str, linger_ms: u64) -> Arc<dyn Runner> {
        Arc::new(Sleeper {
            name,
            linger: Duration::from_millis(linger_ms),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_stop_within_grace() {
        let manager = Manager::new(Duration::from_secs(1))
            .with_runner(sleeper("a", 10))
            .with_runner(sleeper("b", 500));
        let mut rx = manager.bus().subscribe();
        let token = CancellationToken::new();
        token.cancel();

        assert_eq!(manager.run(token).await, Ok(()));
        assert_eq!(rx.recv().await.expect("ev").kind, EventKind::ShutdownRequested);
        assert_eq!(rx.recv().await.expect("ev").kind, EventKind::AllStoppedWithin);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_exceeded_names_stuck_runners() {
        let manager = Manager::new(Duration::from_secs(1))
            .with_runner(sleeper("quick", 10))
            .with_runner(sleeper("stuck", 60_000));
        let token = CancellationToken::new();
        token.cancel();

        let err = manager.run(token).await.unwrap_err();
        assert_eq!(
            err,
            RuntimeError::GraceExceeded {
                grace: Duration::from_secs(1),
                stuck: vec!["stuck".to_string()],
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_named_runners_tracked_separately() {
        let manager = Manager::new(Duration::from_secs(1))
            .with_runner(sleeper("worker", 10))
            .with_runner(sleeper("worker", 60_000));
        let token = CancellationToken::new();
        token.cancel();

        let err = manager.run(token).await.unwrap_err();
        assert_eq!(
            err,
            RuntimeError::GraceExceeded {
                grace: Duration::from_secs(1),
                stuck: vec!["worker".to_string()],
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_comes_from_config() {
        let cfg = ControllerConfig {
            grace: Duration::from_millis(200),
            ..ControllerConfig::default()
        };
        let manager = Manager::from_config(&cfg).with_runner(sleeper("slow", 1_000));
        assert_eq!(manager.grace(), Duration::from_millis(200));

        let token = CancellationToken::new();
        token.cancel();
        let err = manager.run(token).await.unwrap_err();
        assert_eq!(
            err,
            RuntimeError::GraceExceeded {
                grace: Duration::from_millis(200),
                stuck: vec!["slow".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn test_runner_error_is_returned() {
        let manager = Manager::new(Duration::from_secs(1)).with_runner(Arc::new(Failing));
        let err = manager.run(CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.as_label(), "runtime_already_running");
    }
}
