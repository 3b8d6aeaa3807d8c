/**
 * Owner resolution
 *
 * Finds the workload that owns a pod and derives the selector matching all
 * of its sibling pods. Runs once at startup; any failure here is fatal.
 */
use super::selector::{Selector, SelectorError};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Pod, ReplicationController};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use kube::{Api, Client, ResourceExt};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("pod {0} has no owner reference")]
    NoOwner(String),

    #[error("unsupported owner kind {0}")]
    UnsupportedOwnerKind(String),

    #[error("{kind} {name} declares no pod selector")]
    MissingSelector { kind: OwnerKind, name: String },

    #[error("{kind} {name} has an invalid selector: {source}")]
    InvalidSelector {
        kind: OwnerKind,
        name: String,
        #[source]
        source: SelectorError,
    },

    #[error("owner lookup failed: {0}")]
    Api(#[from] kube::Error),
}

/// Workload kinds whose pods can be grouped into peers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerKind {
    ReplicaSet,
    DaemonSet,
    StatefulSet,
    ReplicationController,
    Job,
}

impl TryFrom<&str> for OwnerKind {
    type Error = ResolveError;

    fn try_from(kind: &str) -> Result<Self, Self::Error> {
        match kind {
            "ReplicaSet" => Ok(Self::ReplicaSet),
            "DaemonSet" => Ok(Self::DaemonSet),
            "StatefulSet" => Ok(Self::StatefulSet),
            "ReplicationController" => Ok(Self::ReplicationController),
            "Job" => Ok(Self::Job),
            other => Err(ResolveError::UnsupportedOwnerKind(other.to_string())),
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Pick the owner reference that governs a pod.
///
/// The controller reference wins when there is one, otherwise the first
/// declared owner is used.
///
/// # Errors
///
/// Returns `NoOwner` when the pod declares no owner at all
pub fn owner_reference(pod: &Pod) -> Result<&OwnerReference, ResolveError> {
    let owners = pod.owner_references();
    owners
        .iter()
        .find(|o| o.controller == Some(true))
        .or_else(|| owners.first())
        .ok_or_else(|| ResolveError::NoOwner(pod.name_any()))
}

fn selector_from_label_selector(
    kind: OwnerKind,
    name: &str,
    selector: Option<&LabelSelector>,
) -> Result<Selector, ResolveError> {
    let selector = selector
        .map(Selector::try_from)
        .transpose()
        .map_err(|source| ResolveError::InvalidSelector {
            kind,
            name: name.to_string(),
            source,
        })?
        .unwrap_or_default();
    non_empty(kind, name, selector)
}

fn non_empty(kind: OwnerKind, name: &str, selector: Selector) -> Result<Selector, ResolveError> {
    if selector.is_empty() {
        return Err(ResolveError::MissingSelector {
            kind,
            name: name.to_string(),
        });
    }
    Ok(selector)
}

/// Turns a pod into the selector of its peers
#[async_trait]
pub trait OwnerResolver: Send + Sync {
    async fn resolve(&self, pod: &Pod) -> Result<Selector, ResolveError>;
}

/// Resolves owners by reading the owning workload from the API server
pub struct KubeOwnerResolver {
    client: Client,
    namespace: String,
}

impl KubeOwnerResolver {
    #[must_use]
    pub const fn new(client: Client, namespace: String) -> Self {
        Self { client, namespace }
    }

    fn api<K>(&self, pod: &Pod) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        let namespace = pod.namespace().unwrap_or_else(|| self.namespace.clone());
        Api::namespaced(self.client.clone(), &namespace)
    }
}

#[async_trait]
impl OwnerResolver for KubeOwnerResolver {
    async fn resolve(&self, pod: &Pod) -> Result<Selector, ResolveError> {
        let owner = owner_reference(pod)?;
        let kind = OwnerKind::try_from(owner.kind.as_str())?;
        let name = owner.name.as_str();
        debug!("🔍 Resolving {} {} for pod {}", kind, name, pod.name_any());

        let selector = match kind {
            OwnerKind::ReplicaSet => {
                let rs = self.api::<ReplicaSet>(pod).get(name).await?;
                selector_from_label_selector(kind, name, rs.spec.as_ref().map(|s| &s.selector))?
            }
            OwnerKind::DaemonSet => {
                let ds = self.api::<DaemonSet>(pod).get(name).await?;
                selector_from_label_selector(kind, name, ds.spec.as_ref().map(|s| &s.selector))?
            }
            OwnerKind::StatefulSet => {
                let sts = self.api::<StatefulSet>(pod).get(name).await?;
                selector_from_label_selector(kind, name, sts.spec.as_ref().map(|s| &s.selector))?
            }
            OwnerKind::Job => {
                let job = self.api::<Job>(pod).get(name).await?;
                selector_from_label_selector(
                    kind,
                    name,
                    job.spec.as_ref().and_then(|s| s.selector.as_ref()),
                )?
            }
            OwnerKind::ReplicationController => {
                let rc = self.api::<ReplicationController>(pod).get(name).await?;
                let labels = rc.spec.and_then(|s| s.selector).unwrap_or_default();
                non_empty(kind, name, Selector::from(labels))?
            }
        };

        info!("🎯 Peers of {} are selected by {} {}: {}", pod.name_any(), kind, name, selector);
        Ok(selector)
    }
}
