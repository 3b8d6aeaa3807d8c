use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, Client};
use peerwatch::k8s::peers::{KubeCollection, SyncConfig, SyncState, Synchronizer};
use peerwatch::k8s::selector::Selector;
use peerwatch::k8s::{self, USER_AGENT};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

fn init_rustls() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

async fn cluster() -> Option<Client> {
    init_rustls();
    let client = k8s::client::new(None, Some(USER_AGENT)).await.ok()?;
    client.apiserver_version().await.ok()?;
    Some(client)
}

async fn pod_names(pods: &Api<Pod>) -> BTreeSet<String> {
    pods.list(&ListParams::default())
        .await
        .unwrap()
        .items
        .into_iter()
        .filter_map(|p| p.metadata.name)
        .collect()
}

#[tokio::test]
async fn test_mirror_matches_direct_list() {
    // Skip test if no K8s cluster available
    let Some(client) = cluster().await else {
        eprintln!("Skipping peer watch integration test - no cluster available");
        return;
    };

    let pods: Api<Pod> = Api::namespaced(client, "kube-system");
    let before = pod_names(&pods).await;

    let sync = Synchronizer::new(
        Arc::new(KubeCollection::new(pods.clone())),
        Selector::default(),
        SyncConfig::default().resync_interval(Duration::ZERO),
    );
    let reader = sync.reader();
    let stats = sync.stats();
    let token = CancellationToken::new();
    let (tx, _rx) = mpsc::unbounded_channel();
    let handle = sync.spawn(tx, token.clone());

    let listed = timeout(Duration::from_secs(10), async {
        while stats.snapshot().lists == 0 {
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(listed.is_ok(), "first list did not complete");
    let mirrored: BTreeSet<String> = reader.keys().into_iter().map(|k| k.name).collect();

    // pods present in both direct lists existed the whole time the mirror was read
    let after = pod_names(&pods).await;
    let stable: BTreeSet<&String> = before.intersection(&after).collect();
    for name in &stable {
        assert!(mirrored.contains(*name), "{name} missing from mirror {mirrored:?}");
    }

    token.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(stats.snapshot().state, SyncState::Stopped);
}
