// Client creation with custom user-agent support for kube 2.x
use crate::error::Result as PwResult;
use hyper::http::{HeaderName, HeaderValue};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;
use tracing::{debug, warn};

/// Environment variable that overrides the user agent sent to the API server
pub const USER_AGENT_ENV: &str = "PEERWATCH_USER_AGENT";

/// Resolve the cluster configuration.
///
/// In-cluster service account credentials win. Outside a cluster the given
/// kubeconfig file is used, and without one the usual inference applies
/// (`KUBECONFIG`, then `~/.kube/config`).
///
/// # Errors
///
/// Will return `Err` if no usable configuration can be found
pub async fn load_config(kubeconfig: Option<&Path>) -> PwResult<Config> {
    match Config::incluster() {
        Ok(config) => {
            debug!("🔧 Using in-cluster configuration");
            Ok(config)
        }
        Err(e) => {
            debug!("🔧 Not running in a cluster ({}), falling back to kubeconfig", e);
            if let Some(path) = kubeconfig {
                let kc = Kubeconfig::read_from(path)?;
                Ok(Config::from_custom_kubeconfig(kc, &KubeConfigOptions::default()).await?)
            } else {
                Ok(Config::infer().await?)
            }
        }
    }
}

/// Add the user-agent header to a config, honoring the environment override
pub fn add_user_agent_header(config: &mut Config, custom_user_agent: Option<&str>) {
    let from_env = std::env::var(USER_AGENT_ENV).ok();
    let Some(user_agent) = from_env.as_deref().or(custom_user_agent) else {
        return;
    };

    match HeaderValue::from_str(user_agent) {
        Ok(header_value) => config
            .headers
            .push((HeaderName::from_static("user-agent"), header_value)),
        // keep the library default rather than failing startup
        Err(e) => warn!("Ignoring invalid user agent {:?}: {}", user_agent, e),
    }
}

/// Create a new k8s client to interact with k8s cluster api
///
/// # Errors
///
/// Will return `Err` if the configuration can not be loaded or the client
/// can not be built from it
pub async fn new(kubeconfig: Option<&Path>, custom_user_agent: Option<&str>) -> PwResult<Client> {
    let mut config = load_config(kubeconfig).await?;
    add_user_agent_header(&mut config, custom_user_agent);
    let client = Client::try_from(config)?;
    Ok(client)
}
