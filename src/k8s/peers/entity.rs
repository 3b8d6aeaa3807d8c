use kube::Resource;
use std::collections::BTreeMap;
use std::fmt;

/// Unique identity of a tracked object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl EntityKey {
    #[must_use]
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        Self {
            namespace: namespace.map(ToString::to_string),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// An object the synchronizer can mirror
pub trait Entity: Clone + PartialEq + Send + Sync + 'static {
    fn key(&self) -> EntityKey;

    /// Opaque token of the last remote modification, if the server sent one
    fn version(&self) -> Option<&str>;

    fn labels(&self) -> &BTreeMap<String, String>;

    /// Equality that ignores bookkeeping the server rewrites on every write
    fn same_content(&self, other: &Self) -> bool;
}

impl<K> Entity for K
where
    K: Resource + Clone + PartialEq + Send + Sync + 'static,
{
    fn key(&self) -> EntityKey {
        let meta = self.meta();
        EntityKey {
            namespace: meta.namespace.clone(),
            name: meta
                .name
                .clone()
                .or_else(|| meta.generate_name.clone())
                .unwrap_or_default(),
        }
    }

    fn version(&self) -> Option<&str> {
        self.meta().resource_version.as_deref()
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        static EMPTY: BTreeMap<String, String> = BTreeMap::new();
        self.meta().labels.as_ref().unwrap_or(&EMPTY)
    }

    fn same_content(&self, other: &Self) -> bool {
        let strip = |entity: &Self| {
            let mut entity = entity.clone();
            let meta = entity.meta_mut();
            meta.resource_version = None;
            meta.managed_fields = None;
            entity
        };
        strip(self) == strip(other)
    }
}
