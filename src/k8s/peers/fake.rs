//! Scripted in-memory remote used by the synchronizer tests
use super::event::RemoteEvent;
use super::remote::{EventStream, ListPage, RemoteCollection, RemoteError};
use crate::k8s::selector::Selector;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

pub(crate) fn peer_labels() -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), "peer".to_string())])
}

pub(crate) fn selector() -> Selector {
    Selector::from(peer_labels())
}

/// A peer pod in `default` carrying the peer labels
pub(crate) fn pod(name: &str, version: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            labels: Some(peer_labels()),
            resource_version: Some(version.to_string()),
            ..ObjectMeta::default()
        },
        ..Pod::default()
    }
}

pub(crate) fn unavailable() -> RemoteError {
    RemoteError::Stream {
        code: 503,
        reason: "ServiceUnavailable".to_string(),
        message: "apiserver unavailable".to_string(),
    }
}

pub(crate) fn expired() -> RemoteError {
    RemoteError::Expired("too old resource version".to_string())
}

pub(crate) fn page(items: Vec<Pod>, version: &str) -> Result<ListPage<Pod>, RemoteError> {
    Ok(ListPage {
        items,
        version: Some(version.to_string()),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    List,
    Watch(String),
}

/// One scripted watch session
pub(crate) struct WatchScript {
    events: Vec<Result<RemoteEvent<Pod>, RemoteError>>,
    hang: bool,
}

impl WatchScript {
    /// Deliver the events, then end the stream
    pub(crate) const fn ends(events: Vec<Result<RemoteEvent<Pod>, RemoteError>>) -> Self {
        Self { events, hang: false }
    }

    /// Deliver the events, then stay open forever
    pub(crate) const fn hangs(events: Vec<Result<RemoteEvent<Pod>, RemoteError>>) -> Self {
        Self { events, hang: true }
    }
}

/// Remote that replays queued responses in order.
///
/// Once a queue runs dry, List never returns and Watch yields a stream
/// that stays open without events.
#[derive(Default)]
pub(crate) struct ScriptedRemote {
    lists: Mutex<VecDeque<Result<ListPage<Pod>, RemoteError>>>,
    watches: Mutex<VecDeque<Result<WatchScript, RemoteError>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn list(self, response: Result<ListPage<Pod>, RemoteError>) -> Self {
        self.lists.lock().unwrap().push_back(response);
        self
    }

    pub(crate) fn watch(self, script: WatchScript) -> Self {
        self.watches.lock().unwrap().push_back(Ok(script));
        self
    }

    pub(crate) fn watch_fails(self, error: RemoteError) -> Self {
        self.watches.lock().unwrap().push_back(Err(error));
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteCollection<Pod> for ScriptedRemote {
    async fn list(&self, _selector: &Selector) -> Result<ListPage<Pod>, RemoteError> {
        self.calls.lock().unwrap().push(Call::List);
        let next = self.lists.lock().unwrap().pop_front();
        match next {
            Some(response) => response,
            None => futures::future::pending().await,
        }
    }

    async fn watch(&self, _selector: &Selector, since: &str) -> Result<EventStream<Pod>, RemoteError> {
        self.calls.lock().unwrap().push(Call::Watch(since.to_string()));
        let next = self.watches.lock().unwrap().pop_front();
        let script = next.unwrap_or_else(|| Ok(WatchScript::hangs(Vec::new())))?;

        let events = stream::iter(script.events);
        if script.hang {
            Ok(events.chain(stream::pending()).boxed())
        } else {
            Ok(events.boxed())
        }
    }
}
