use super::entity::{Entity, EntityKey};
use std::sync::Arc;

/// A raw item from a watch stream
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent<K> {
    Added(K),
    Modified(K),
    Deleted(K),
    /// Progress marker carrying only a version token
    Bookmark(String),
}

impl<K: Entity> RemoteEvent<K> {
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Added(e) | Self::Modified(e) | Self::Deleted(e) => e.version(),
            Self::Bookmark(v) => Some(v),
        }
    }
}

/// A change applied to the mirror and delivered to the sink
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<K> {
    Added(Arc<K>),
    Modified { old: Arc<K>, new: Arc<K> },
    Deleted(Arc<K>),
}

impl<K: Entity> ChangeEvent<K> {
    #[must_use]
    pub fn key(&self) -> EntityKey {
        match self {
            Self::Added(e) | Self::Deleted(e) | Self::Modified { new: e, .. } => e.key(),
        }
    }

    /// The version token this change carries
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Added(e) | Self::Deleted(e) | Self::Modified { new: e, .. } => e.version(),
        }
    }

    #[must_use]
    pub const fn callback_name(&self) -> &'static str {
        match self {
            Self::Added(_) => "on_add",
            Self::Modified { .. } => "on_update",
            Self::Deleted(_) => "on_delete",
        }
    }
}
