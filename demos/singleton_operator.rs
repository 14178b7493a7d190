//! # Example: singleton_operator
//!
//! An operator that keeps one global "trust bundle" equal to the union of all
//! CA secrets. Any secret change re-runs the same reconciliation; a burst of
//! changes collapses into one or two runs.
//!
//! Shows how to:
//! - Implement [`OperatorSyncer`] (no identity: the state is global).
//! - Watch several objects through an [`OperatorFilter`].
//! - Host the operator in a [`Manager`] with a shutdown grace.
//!
//! ## Run
//! ```bash
//! RUST_LOG=syncvisor=info cargo run --example singleton_operator
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use syncvisor::{
    ControllerConfig, EventKind, LogWriter, Manager, MemorySource, Operator, OperatorFilter,
    OperatorSyncer, Resource, Runner, Subscribe, SyncError,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug)]
struct Secret {
    namespace: String,
    name: String,
    ca: Option<String>,
}

impl Resource for Secret {
    fn namespace(&self) -> &str {
        &self.namespace
    }
    fn name(&self) -> &str {
        &self.name
    }
}

/// Only secrets carrying a CA matter; deletions always do.
struct CaSecrets;

impl OperatorFilter<Secret> for CaSecrets {
    fn add(&self, s: &Secret) -> bool {
        s.ca.is_some()
    }

    fn update(&self, old: &Secret, new: &Secret) -> bool {
        old.ca != new.ca
    }
}

/// Publishes the union of CA secrets; `published` is shared with `main`.
struct TrustBundle {
    secrets: MemorySource<Secret>,
    published: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl OperatorSyncer for TrustBundle {
    type Object = Vec<String>;

    async fn resolve(&self) -> Result<Option<Vec<String>>, SyncError> {
        let cas = self
            .secrets
            .list()
            .into_iter()
            .filter_map(|s| s.ca)
            .collect();
        Ok(Some(cas))
    }

    async fn reconcile(&self, cas: Vec<String>) -> Result<(), SyncError> {
        let mut published = self
            .published
            .lock()
            .map_err(|_| SyncError::fatal("bundle lock poisoned"))?;
        if *published != cas {
            println!("[operator] publishing trust bundle with {} CAs", cas.len());
            *published = cas;
        }
        Ok(())
    }
}

/// Counts reconciliations of the singleton stream.
#[derive(Default)]
struct SyncCounter(std::sync::atomic::AtomicU32);

#[async_trait]
impl Subscribe for SyncCounter {
    async fn on_event(&self, ev: &syncvisor::Event) {
        if ev.kind == EventKind::SyncSucceeded {
            let n = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            println!("[counter] reconciliation #{n} for {:?}", ev.identity);
        }
    }

    fn name(&self) -> &'static str {
        "sync-counter"
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env).init();

    let secrets = MemorySource::<Secret>::new("secrets");
    let published = Arc::new(Mutex::new(Vec::new()));
    let bundle = TrustBundle {
        secrets: secrets.clone(),
        published: Arc::clone(&published),
    };

    let subs: Vec<Arc<dyn Subscribe>> =
        vec![Arc::new(LogWriter::new()), Arc::new(SyncCounter::default())];
    let operator = Operator::builder("trust-bundle", bundle)
        .with_watch(secrets.clone(), CaSecrets)
        .with_subscribers(subs)
        .build();
    let operator: Arc<dyn Runner> = Arc::new(operator);

    let token = CancellationToken::new();
    let manager_subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let cfg = ControllerConfig {
        grace: Duration::from_secs(5),
        ..ControllerConfig::default()
    };
    let manager = Manager::from_config(&cfg)
        .with_runner(operator)
        .with_subscribers(manager_subs);
    let run = tokio::spawn(manager.run(token.clone()));

    secrets.mark_synced();
    for (i, ns) in ["ingress", "monitoring", "registry"].iter().enumerate() {
        secrets.apply(Secret {
            namespace: ns.to_string(),
            name: "ca".into(),
            ca: Some(format!("CA-{i}")),
        });
    }
    secrets.apply(Secret {
        namespace: "default".into(),
        name: "token".into(),
        ca: None,
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    token.cancel();
    run.await??;

    let published = published
        .lock()
        .map_err(|_| anyhow::anyhow!("bundle lock poisoned"))?;
    println!("[final] bundle: {published:?}");
    Ok(())
}
