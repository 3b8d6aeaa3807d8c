pub mod error;
pub mod k8s;

use crate::error::Result;
use crate::k8s::owner::{KubeOwnerResolver, OwnerResolver};
use crate::k8s::peers::{KubeCollection, SyncConfig, Synchronizer};
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Synchronizer over the pods sharing an owner with the local pod
pub type PeerSynchronizer = Synchronizer<Pod, KubeCollection<Pod>>;

/// Process settings, built once from the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerwatchConfig {
    pub namespace: String,
    pub pod_name: String,
    pub kubeconfig: Option<PathBuf>,
    /// `Duration::ZERO` disables forced resync
    pub resync_interval: Duration,
}

impl PeerwatchConfig {
    #[must_use]
    pub fn new(namespace: impl Into<String>, pod_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pod_name: pod_name.into(),
            kubeconfig: None,
            resync_interval: SyncConfig::default().resync_interval,
        }
    }

    #[must_use]
    pub fn kubeconfig(mut self, path: Option<PathBuf>) -> Self {
        self.kubeconfig = path;
        self
    }

    #[must_use]
    pub const fn resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }

    #[must_use]
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::default().resync_interval(self.resync_interval)
    }
}

/// Look up the local pod, resolve its owner and build a synchronizer over
/// every pod that owner selects.
///
/// # Errors
///
/// Will return `Err` if the pod can not be read or its owner does not
/// resolve to a usable selector
pub async fn peer_synchronizer(client: Client, config: &PeerwatchConfig) -> Result<PeerSynchronizer> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), &config.namespace);
    let pod = pods.get(&config.pod_name).await?;

    let resolver = KubeOwnerResolver::new(client, config.namespace.clone());
    let selector = resolver.resolve(&pod).await?;
    info!("🔍 Watching peers of {}/{} with {}", config.namespace, config.pod_name, selector);

    let remote = KubeCollection::new(pods);
    Ok(Synchronizer::new(Arc::new(remote), selector, config.sync_config()))
}
