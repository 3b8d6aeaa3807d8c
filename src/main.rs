use anyhow::Result;
use clap::Parser;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use peerwatch::k8s::peers::{EventSink, StoreReader};
use peerwatch::k8s::{self, USER_AGENT};
use peerwatch::{PeerwatchConfig, peer_synchronizer};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a kubeconfig file, used when not running inside a cluster
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Namespace of the local pod
    #[arg(short, long, default_value = "default")]
    namespace: String,

    /// Name of the local pod, defaults to the host name
    #[arg(long, env = "HOSTNAME")]
    name: Option<String>,

    /// Seconds between forced full relists, 0 disables them
    #[arg(long, default_value_t = 60)]
    resync_secs: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl From<&Args> for PeerwatchConfig {
    fn from(args: &Args) -> Self {
        Self::new(args.namespace.clone(), pod_name(args.name.as_deref()))
            .kubeconfig(args.kubeconfig.clone())
            .resync_interval(Duration::from_secs(args.resync_secs))
    }
}

/// Reports peer membership changes to the log
struct LoggingSink {
    peers: StoreReader<Pod>,
}

impl EventSink<Pod> for LoggingSink {
    fn on_add(&mut self, pod: &Pod) {
        info!("➕ add {} ({} peers)", pod.name_any(), self.peers.len());
    }

    fn on_update(&mut self, old: &Pod, new: &Pod) {
        info!(
            "🔄 update {} {} -> {} ({} peers)",
            new.name_any(),
            old.resource_version().unwrap_or_default(),
            new.resource_version().unwrap_or_default(),
            self.peers.len()
        );
    }

    fn on_delete(&mut self, pod: &Pod) {
        info!("➖ delete {} ({} peers)", pod.name_any(), self.peers.len());
    }
}

/// Inside a pod the host name is the pod name
fn pod_name(name: Option<&str>) -> String {
    name.map_or_else(
        || gethostname::gethostname().to_string_lossy().to_string(),
        ToString::to_string,
    )
}

fn init_tracing(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let config = PeerwatchConfig::from(&args);
    let client = k8s::client::new(config.kubeconfig.as_deref(), Some(USER_AGENT)).await?;

    let sync = match peer_synchronizer(client, &config).await {
        Ok(sync) => sync,
        Err(e) => {
            error!("❌ Could not resolve peers of {}/{}: {}", config.namespace, config.pod_name, e);
            return Err(e.into());
        }
    };

    let sink = LoggingSink { peers: sync.reader() };
    let token = CancellationToken::new();
    let mut handle = sync.spawn(sink, token.clone());

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("🛑 Interrupted, shutting down");
            token.cancel();
            handle.await??;
        }
        joined = &mut handle => joined??,
    }

    Ok(())
}
