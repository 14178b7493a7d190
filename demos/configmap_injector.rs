//! # Example: configmap_injector
//!
//! A CA-bundle injector: every config map annotated with
//! `inject-cabundle=true` gets the current CA bundle written into its data.
//!
//! Shows how to:
//! - Feed a [`MemorySource`] through a [`FilterFn`] into a [`Controller`].
//! - Resolve identities against the source's store in the [`Syncer`].
//! - Retry transient conflicts with a bounded budget.
//! - Render engine events through [`LogWriter`] and `tracing-subscriber`.
//!
//! ## Flow
//! ```text
//! configmaps ──► FilterFn(annotation == "true") ──► queue ──► 2 workers
//!                                                               └─► CaInjector::resolve / reconcile
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example configmap_injector
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use syncvisor::{
    Controller, ControllerConfig, FilterFn, Identity, LogWriter, MemorySource, Resource,
    Subscribe, SyncError, Syncer,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const ANNOTATION: &str = "inject-cabundle";
const CA_KEY: &str = "ca-bundle.crt";
const CA_BUNDLE: &str = "-----BEGIN CERTIFICATE-----\nMIIB...\n-----END CERTIFICATE-----\n";

#[derive(Clone, Debug, PartialEq)]
struct ConfigMap {
    namespace: String,
    name: String,
    annotations: BTreeMap<String, String>,
    data: BTreeMap<String, String>,
}

impl ConfigMap {
    fn new(namespace: &str, name: &str, inject: Option<&str>) -> Self {
        let annotations = inject
            .map(|v| BTreeMap::from([(ANNOTATION.to_string(), v.to_string())]))
            .unwrap_or_default();
        Self {
            namespace: namespace.into(),
            name: name.into(),
            annotations,
            data: BTreeMap::new(),
        }
    }

    fn wants_injection(&self) -> bool {
        self.annotations.get(ANNOTATION).map(String::as_str) == Some("true")
    }
}

impl Resource for ConfigMap {
    fn namespace(&self) -> &str {
        &self.namespace
    }
    fn name(&self) -> &str {
        &self.name
    }
}

/// Writes the CA bundle; the first write to every object hits a conflict.
struct CaInjector {
    store: MemorySource<ConfigMap>,
    conflicts: AtomicU32,
}

#[async_trait]
impl Syncer for CaInjector {
    type Object = ConfigMap;

    async fn resolve(&self, identity: &Identity) -> Result<Option<ConfigMap>, SyncError> {
        Ok(self.store.get(identity))
    }

    async fn reconcile(&self, mut cm: ConfigMap) -> Result<(), SyncError> {
        if !cm.wants_injection() || cm.data.get(CA_KEY).map(String::as_str) == Some(CA_BUNDLE) {
            return Ok(());
        }
        if self.conflicts.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
            return Err(SyncError::fail(format!(
                "conflict updating {}/{}",
                cm.namespace, cm.name
            )));
        }

        cm.data.insert(CA_KEY.into(), CA_BUNDLE.into());
        println!("[injector] injected CA bundle into {}/{}", cm.namespace, cm.name);
        self.store.apply(cm);
        Ok(())
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env).init();

    let configmaps = MemorySource::<ConfigMap>::new("configmaps");
    let syncer = CaInjector {
        store: configmaps.clone(),
        conflicts: AtomicU32::new(0),
    };

    let filter = FilterFn::<ConfigMap>::new()
        .on_add(ConfigMap::wants_injection)
        // our own writes leave the bundle in place and are skipped
        .on_update(|_old, new| {
            new.wants_injection() && new.data.get(CA_KEY).map(String::as_str) != Some(CA_BUNDLE)
        })
        .on_delete(|_| false);

    let cfg = ControllerConfig {
        workers: 2,
        max_retries: 3,
        ..ControllerConfig::default()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let controller = Arc::new(
        Controller::builder("configmap-cabundle-injector", syncer)
            .with_config(cfg)
            .with_watch(configmaps.clone(), filter)
            .with_subscribers(subs)
            .build(),
    );

    // initial snapshot
    configmaps.apply(ConfigMap::new("openshift-config", "trusted-ca", Some("true")));
    configmaps.apply(ConfigMap::new("default", "app-settings", None));
    configmaps.apply(ConfigMap::new("monitoring", "prometheus-ca", Some("true")));
    configmaps.mark_synced();

    let token = CancellationToken::new();
    let run = {
        let controller = Arc::clone(&controller);
        let token = token.clone();
        tokio::spawn(async move { controller.run(token).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    configmaps.apply(ConfigMap::new("default", "app-settings", Some("true")));

    tokio::time::sleep(Duration::from_millis(300)).await;
    token.cancel();
    run.await??;

    for cm in configmaps.list() {
        println!(
            "[final] {}/{} injected={}",
            cm.namespace,
            cm.name,
            cm.data.contains_key(CA_KEY)
        );
    }
    Ok(())
}
