/**
 * Remote collection client
 *
 * The synchronizer only needs two primitives from the API server: a full
 * List and a Watch resuming from a version token. `KubeCollection` provides
 * both on top of a `kube::Api`.
 */
use super::event::RemoteEvent;
use crate::k8s::selector::Selector;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use kube::api::{ListParams, WatchEvent, WatchParams};
use kube::error::ErrorResponse;
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use thiserror::Error;

use super::config::WATCH_TIMEOUT_SECONDS;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// The server no longer holds history back to the requested version
    #[error("watch cursor expired: {0}")]
    Expired(String),

    #[error(transparent)]
    Kube(kube::Error),

    #[error("watch stream error {code} {reason}: {message}")]
    Stream {
        code: u16,
        reason: String,
        message: String,
    },
}

impl RemoteError {
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        matches!(self, Self::Expired(_))
    }
}

const fn is_gone(response: &ErrorResponse) -> bool {
    response.code == 410
}

impl From<kube::Error> for RemoteError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(ref response) if is_gone(response) => {
                Self::Expired(response.message.clone())
            }
            other => Self::Kube(other),
        }
    }
}

impl From<ErrorResponse> for RemoteError {
    fn from(response: ErrorResponse) -> Self {
        if is_gone(&response) {
            Self::Expired(response.message)
        } else {
            Self::Stream {
                code: response.code,
                reason: response.reason,
                message: response.message,
            }
        }
    }
}

/// Result of a full List
#[derive(Debug, Clone)]
pub struct ListPage<K> {
    pub items: Vec<K>,
    pub version: Option<String>,
}

pub type EventStream<K> = BoxStream<'static, Result<RemoteEvent<K>, RemoteError>>;

#[async_trait]
pub trait RemoteCollection<K>: Send + Sync {
    async fn list(&self, selector: &Selector) -> Result<ListPage<K>, RemoteError>;

    /// Stream changes after `since`; the stream may end at any time
    async fn watch(&self, selector: &Selector, since: &str) -> Result<EventStream<K>, RemoteError>;
}

/// List/Watch against the Kubernetes API
pub struct KubeCollection<K> {
    api: Api<K>,
    watch_timeout_secs: u32,
}

impl<K> KubeCollection<K> {
    #[must_use]
    pub const fn new(api: Api<K>) -> Self {
        Self {
            api,
            watch_timeout_secs: WATCH_TIMEOUT_SECONDS,
        }
    }

    #[must_use]
    pub const fn watch_timeout(mut self, secs: u32) -> Self {
        self.watch_timeout_secs = secs;
        self
    }
}

#[async_trait]
impl<K> RemoteCollection<K> for KubeCollection<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    async fn list(&self, selector: &Selector) -> Result<ListPage<K>, RemoteError> {
        let lp = ListParams::default().labels(&selector.to_string());
        let list = self.api.list(&lp).await?;
        Ok(ListPage {
            items: list.items,
            version: list.metadata.resource_version,
        })
    }

    async fn watch(&self, selector: &Selector, since: &str) -> Result<EventStream<K>, RemoteError> {
        let wp = WatchParams::default()
            .labels(&selector.to_string())
            .timeout(self.watch_timeout_secs);
        let stream = self.api.watch(&wp, since).await?;

        Ok(stream
            .map(|item| match item {
                Ok(WatchEvent::Added(obj)) => Ok(RemoteEvent::Added(obj)),
                Ok(WatchEvent::Modified(obj)) => Ok(RemoteEvent::Modified(obj)),
                Ok(WatchEvent::Deleted(obj)) => Ok(RemoteEvent::Deleted(obj)),
                Ok(WatchEvent::Bookmark(bm)) => Ok(RemoteEvent::Bookmark(bm.metadata.resource_version)),
                Ok(WatchEvent::Error(response)) => Err(RemoteError::from(response)),
                Err(e) => Err(RemoteError::from(e)),
            })
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::peers::entity::Entity;
    use crate::k8s::peers::fake::pod;
    use hyper::http::{Request, Response};
    use k8s_openapi::api::core::v1::Pod;
    use k8s_openapi::serde_json::{self, json};
    use kube::client::Body;
    use kube::Client;
    use std::collections::BTreeMap;

    fn selector() -> Selector {
        Selector::from(BTreeMap::from([("app".to_string(), "peer".to_string())]))
    }

    fn collection() -> (
        KubeCollection<Pod>,
        tower_test::mock::Handle<Request<Body>, Response<Body>>,
    ) {
        let (service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(service, "default");
        (KubeCollection::new(Api::namespaced(client, "default")), handle)
    }

    fn gone() -> ErrorResponse {
        ErrorResponse {
            status: "Failure".to_string(),
            message: "too old resource version: 1 (5)".to_string(),
            reason: "Expired".to_string(),
            code: 410,
        }
    }

    #[test]
    fn test_gone_is_expired() {
        assert!(RemoteError::from(gone()).is_expired());
        assert!(RemoteError::from(kube::Error::Api(gone())).is_expired());

        let unavailable = ErrorResponse {
            status: "Failure".to_string(),
            message: "etcd unavailable".to_string(),
            reason: "ServiceUnavailable".to_string(),
            code: 503,
        };
        assert!(matches!(
            RemoteError::from(unavailable),
            RemoteError::Stream { code: 503, .. }
        ));
    }

    #[tokio::test]
    async fn test_list_sends_selector_and_returns_version() {
        let (collection, mut handle) = collection();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.uri().path(), "/api/v1/namespaces/default/pods");
            let query = request.uri().query().unwrap_or_default().to_string();
            assert!(query.contains("labelSelector=app%3Dpeer"), "{query}");

            let body = json!({
                "apiVersion": "v1",
                "kind": "PodList",
                "metadata": { "resourceVersion": "10" },
                "items": [serde_json::to_value(pod("a", "7")).unwrap()],
            });
            send.send_response(
                Response::builder()
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            );
        });

        let page = collection.list(&selector()).await.unwrap();
        assert_eq!(page.version.as_deref(), Some("10"));
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].version(), Some("7"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_watch_maps_events_and_expiry() {
        let (collection, mut handle) = collection();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            let query = request.uri().query().unwrap_or_default().to_string();
            assert!(query.contains("watch=true"), "{query}");
            assert!(query.contains("resourceVersion=10"), "{query}");
            assert!(query.contains("timeoutSeconds=294"), "{query}");

            let added = json!({ "type": "ADDED", "object": serde_json::to_value(pod("b", "11")).unwrap() });
            let gone = json!({
                "type": "ERROR",
                "object": {
                    "apiVersion": "v1",
                    "kind": "Status",
                    "metadata": {},
                    "status": "Failure",
                    "message": "too old resource version: 10 (12)",
                    "reason": "Expired",
                    "code": 410
                }
            });
            let body = format!("{added}\n{gone}\n");
            send.send_response(Response::builder().body(Body::from(body.into_bytes())).unwrap());
        });

        let stream = collection.watch(&selector(), "10").await.unwrap();
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], Ok(RemoteEvent::Added(p)) if p.version() == Some("11")));
        assert!(matches!(&items[1], Err(e) if e.is_expired()));
        server.await.unwrap();
    }
}
